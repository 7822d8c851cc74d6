//! Entry points of an opaque proof computation module.

use crate::WorkerResult;
use crate::core::OperationResult;

/// A proof computation module driven by the worker endpoint.
///
/// The endpoint owns the thread pool: it calls `init`, builds a pool of the
/// requested size, and runs `prove` inside it, so rayon parallelism in
/// `prove` uses exactly the configured number of threads.
pub trait ProofModule: Send + Sync + 'static {
    /// Returns the module name (e.g., "sha256-merkle", "mock").
    fn name(&self) -> &str;

    /// Load or initialize the module.
    ///
    /// Must be idempotent: calling it again after a successful init is a
    /// no-op that returns `Ok`.
    fn init(&mut self) -> WorkerResult<()>;

    /// Generate a proof and return it as an opaque value.
    fn prove(&self) -> WorkerResult<OperationResult>;
}
