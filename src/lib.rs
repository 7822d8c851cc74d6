pub mod backend;
pub mod config;
pub mod core;
pub mod engine;
pub mod info_cmd;
pub mod prove_cmd;

use thiserror::Error;

use crate::core::ValidationError;
use crate::engine::{BridgeError, InvokeError};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
