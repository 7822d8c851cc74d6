//! Messages exchanged between a bridge and its worker.
//!
//! Arguments and results travel as `serde_json::Value`, so anything that
//! crosses the boundary must be serializable. Requests and responses are
//! matched by `id`, never by arrival order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Correlation id assigned by the bridge.
pub type RequestId = u64;

/// A call descriptor: operation name plus serialized arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub params: Value,
}

/// The answer to exactly one `Request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    pub outcome: Result<Value, RemoteError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The endpoint has no operation with that name
    UnknownMethod,
    /// The arguments did not decode into what the operation expects
    BadRequest,
    /// The operation itself failed (init, pool setup, prove, panic)
    Computation,
}

/// An error raised inside the worker and carried back as data.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn unknown_method(method: &str) -> Self {
        RemoteError {
            kind: RemoteErrorKind::UnknownMethod,
            message: format!("unknown method '{method}'"),
        }
    }

    pub fn bad_request(method: &str, err: impl std::fmt::Display) -> Self {
        RemoteError {
            kind: RemoteErrorKind::BadRequest,
            message: format!("invalid arguments for '{method}': {err}"),
        }
    }

    pub fn computation(message: impl Into<String>) -> Self {
        RemoteError { kind: RemoteErrorKind::Computation, message: message.into() }
    }
}

/// What a worker's message loop receives.
#[derive(Debug)]
pub(crate) enum Inbound {
    Call(Request),
    Terminate,
}
