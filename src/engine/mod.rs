//! Engine module: runs proof computations off the caller's context.
//!
//! # Architecture
//!
//! - **Worker** (`worker`): a named background thread running an endpoint's
//!   message loop. Nothing is shared with it except its channels.
//!
//! - **Endpoint** (`endpoint`): the operations a worker serves.
//!   `ProverEndpoint` configures a rayon pool and drives a `ProofModule`.
//!
//! - **Bridge** (`bridge`): turns endpoint operations into awaitable calls,
//!   matching responses to callers by correlation id.
//!
//! - **Controller** (`controller`): owns the lifecycle of the single proof in
//!   flight (validation, admission, timing, result, status narration).
//!
//! # Boundaries
//!
//! - The controller only talks to a `ProofClient`; it never sees the bridge.
//! - The bridge never interprets arguments or results; they are JSON values.
//! - The endpoint never touches controller state.

pub mod bridge;
pub mod controller;
pub mod endpoint;
pub mod protocol;
pub mod worker;

// Re-export key types for convenience
pub use bridge::{Bridge, BridgeError};
pub use controller::{
    ClientError, ControllerConfig, InvokeError, ProofClient, ProofController, WorkerClient,
};
pub use endpoint::{Endpoint, ProverEndpoint, RUN_PROOF, install_panic_hook};
pub use protocol::{RemoteError, RemoteErrorKind, Request, RequestId, Response};
pub use worker::Worker;
