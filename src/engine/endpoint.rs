//! Worker-side endpoint: the operations a background worker can perform.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;
use std::time::Instant;

use serde_json::Value;

use crate::backend::ProofModule;
use crate::core::{OperationRequest, OperationResult};

use super::protocol::RemoteError;

/// Method name of the proof operation.
pub const RUN_PROOF: &str = "run_proof";

/// Something a worker's message loop can dispatch calls to.
///
/// `dispatch` runs on the worker thread. A panic escaping it kills the
/// worker, and every call still pending on the bridge is rejected.
pub trait Endpoint: Send + 'static {
    fn dispatch(&mut self, method: &str, params: Value) -> Result<Value, RemoteError>;
}

static PANIC_HOOK: Once = Once::new();

/// Route panic reports through `tracing` before the previous hook runs.
/// Installs at most once per process.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let thread = std::thread::current();
            tracing::error!(thread = thread.name().unwrap_or("<unnamed>"), "panic: {info}");
            previous(info);
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Serves `run_proof` by driving a `ProofModule` on a freshly sized pool.
pub struct ProverEndpoint<M> {
    module: M,
}

impl<M: ProofModule> ProverEndpoint<M> {
    pub fn new(module: M) -> Self {
        ProverEndpoint { module }
    }

    /// Initialize the module, configure a pool of exactly
    /// `thread_pool_size` threads, and run the proof inside it.
    pub fn run_proof(&mut self, request: OperationRequest) -> Result<OperationResult, RemoteError> {
        let workers = request.thread_pool_size.get();
        let name = self.module.name().to_string();
        let start = Instant::now();

        self.module
            .init()
            .map_err(|e| RemoteError::computation(format!("{name} init failed: {e}")))?;

        let pool_name = name.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |i| format!("{pool_name}-pool-{i}"))
            .build()
            .map_err(|e| {
                RemoteError::computation(format!("thread pool of {workers} failed to start: {e}"))
            })?;

        install_panic_hook();

        tracing::info!(module = %name, workers, "proving");
        let module = &self.module;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| pool.install(|| module.prove())));
        match outcome {
            Ok(Ok(result)) => {
                tracing::info!(module = %name, workers, elapsed_ms = start.elapsed().as_millis() as u64, "proof done");
                Ok(result)
            }
            Ok(Err(e)) => Err(RemoteError::computation(format!("{name} prove failed: {e}"))),
            Err(payload) => Err(RemoteError::computation(format!(
                "{name} panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }
}

impl<M: ProofModule> Endpoint for ProverEndpoint<M> {
    fn dispatch(&mut self, method: &str, params: Value) -> Result<Value, RemoteError> {
        match method {
            RUN_PROOF => {
                let request: OperationRequest = serde_json::from_value(params)
                    .map_err(|e| RemoteError::bad_request(method, e))?;
                self.run_proof(request)
            }
            other => Err(RemoteError::unknown_method(other)),
        }
    }
}
