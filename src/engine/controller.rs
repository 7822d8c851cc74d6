//! Operation controller: owns the lifecycle of the single in-flight proof.
//!
//! ```text
//!   Idle ──invoke──▶ Proving ──ok──▶ Completed ─┐
//!                       │                       │ invoke
//!                       └──err/timeout──▶ Failed ┘──────▶ Proving
//! ```
//!
//! Invocations are admitted only when no proof is running, then validated
//! before any call is made. State lives behind a mutex that is never held
//! across the client call, so snapshots stay readable while proving. An
//! invocation dropped mid-call still leaves `Proving`, as `Failed { Cancelled }`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::WorkerResult;
use crate::backend::ProofModule;
use crate::core::{
    ControllerSnapshot, FailureReason, OperationRequest, OperationResult, OperationStatus,
    ThreadPoolInput, ThreadPoolSize, ValidationError, hardware_concurrency, round_secs,
};

use super::bridge::{Bridge, BridgeError};
use super::endpoint::{ProverEndpoint, RUN_PROOF};
use super::protocol::RemoteErrorKind;
use super::worker::Worker;

/// Failure of a single proof call, as seen by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Computation(String),
}

impl From<BridgeError> for ClientError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Remote(remote) if remote.kind == RemoteErrorKind::Computation => {
                ClientError::Computation(remote.message)
            }
            other => ClientError::Transport(other.to_string()),
        }
    }
}

impl From<ClientError> for FailureReason {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Transport(msg) => FailureReason::Transport(msg),
            ClientError::Computation(msg) => FailureReason::Computation(msg),
        }
    }
}

/// The one call the controller makes per invocation.
#[async_trait]
pub trait ProofClient: Send + Sync {
    async fn run_proof(&self, request: OperationRequest) -> Result<OperationResult, ClientError>;
}

/// `ProofClient` backed by a dedicated worker thread and its bridge.
pub struct WorkerClient {
    bridge: Bridge,
    worker: Worker,
}

impl WorkerClient {
    /// Spawn a worker serving `module` and connect a bridge to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<M: ProofModule>(name: impl Into<String>, module: M) -> WorkerResult<Self> {
        let mut worker = Worker::spawn(name, ProverEndpoint::new(module))?;
        let bridge = Bridge::connect(&mut worker)?;
        Ok(WorkerClient { bridge, worker })
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Terminate the worker and wait for its thread to exit.
    pub async fn shutdown(self) -> WorkerResult<()> {
        let WorkerClient { bridge, worker } = self;
        drop(bridge);
        tokio::task::spawn_blocking(move || worker.join())
            .await
            .map_err(anyhow::Error::from)?
    }
}

#[async_trait]
impl ProofClient for WorkerClient {
    async fn run_proof(&self, request: OperationRequest) -> Result<OperationResult, ClientError> {
        Ok(self.bridge.call(RUN_PROOF, &request).await?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
    /// Give up waiting after this long; the worker may keep computing.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvokeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("a proof is already being generated")]
    Busy,
    #[error("proof generation failed ({}): {0}", .0.category())]
    Failed(FailureReason),
    #[error("operation {0} was superseded before its result arrived")]
    Superseded(u64),
}

struct ControllerState {
    input: ThreadPoolInput,
    status: OperationStatus,
    notice: Option<ValidationError>,
    result: Option<OperationResult>,
    last_operation: u64,
}

type SharedState = Mutex<ControllerState>;

fn lock(state: &SharedState) -> MutexGuard<'_, ControllerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks its operation `Failed { Cancelled }` if dropped before being settled.
struct InFlight<'a> {
    state: &'a SharedState,
    operation: u64,
    started_at: Instant,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(
        mut self,
        outcome: Result<OperationResult, FailureReason>,
    ) -> Result<OperationResult, InvokeError> {
        self.settled = true;
        let elapsed = self.started_at.elapsed();
        settle(&mut lock(self.state), self.operation, elapsed, outcome)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = lock(self.state);
        if state.status.is_proving() && state.status.operation() == Some(self.operation) {
            tracing::warn!(operation = self.operation, "invocation dropped while proving");
            state.status = OperationStatus::Failed {
                operation: self.operation,
                reason: FailureReason::Cancelled,
            };
        }
    }
}

fn settle(
    state: &mut ControllerState,
    operation: u64,
    elapsed: Duration,
    outcome: Result<OperationResult, FailureReason>,
) -> Result<OperationResult, InvokeError> {
    let current = matches!(
        state.status,
        OperationStatus::Proving { operation: running, .. } if running == operation
    );
    if !current {
        tracing::warn!(operation, "discarding result of superseded operation");
        return Err(InvokeError::Superseded(operation));
    }

    match outcome {
        Ok(result) => {
            let elapsed_secs = round_secs(elapsed);
            tracing::info!(operation, elapsed_secs, "proof completed");
            state.status = OperationStatus::Completed { operation, elapsed_secs };
            state.result = Some(result.clone());
            Ok(result)
        }
        Err(reason) => {
            tracing::error!(operation, category = reason.category(), "proof failed: {reason}");
            state.status = OperationStatus::Failed { operation, reason: reason.clone() };
            Err(InvokeError::Failed(reason))
        }
    }
}

pub struct ProofController<C> {
    client: C,
    config: ControllerConfig,
    state: SharedState,
}

impl<C: ProofClient> ProofController<C> {
    pub fn new(client: C, initial: ThreadPoolSize, config: ControllerConfig) -> Self {
        ProofController {
            client,
            config,
            state: Mutex::new(ControllerState {
                input: ThreadPoolInput::new(initial),
                status: OperationStatus::Idle,
                notice: None,
                result: None,
                last_operation: 0,
            }),
        }
    }

    /// Controller whose thread pool text starts at the host's concurrency.
    pub fn with_detected_concurrency(client: C, config: ControllerConfig) -> Self {
        Self::new(client, hardware_concurrency(), config)
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn into_client(self) -> C {
        self.client
    }

    /// Edit the thread pool text; non-digit edits are ignored.
    pub async fn set_thread_pool_text(&self, text: &str) -> bool {
        lock(&self.state).input.set(text)
    }

    pub async fn status(&self) -> OperationStatus {
        lock(&self.state).status.clone()
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        let state = lock(&self.state);
        let status_text = match &state.notice {
            Some(notice) => notice.narration(),
            None => state.status.to_string(),
        };
        ControllerSnapshot {
            thread_pool_text: state.input.text().to_string(),
            status: state.status.clone(),
            status_text,
            result: state.result.clone(),
        }
    }

    /// Run one proof with the current thread pool text.
    pub async fn invoke_current(&self) -> Result<OperationResult, InvokeError> {
        let text = lock(&self.state).input.text().to_string();
        self.invoke(&text).await
    }

    /// Validate `text`, run one proof, and settle into `Completed` or `Failed`.
    ///
    /// Dropping the returned future while proving settles into
    /// `Failed { Cancelled }`.
    pub async fn invoke(&self, text: &str) -> Result<OperationResult, InvokeError> {
        let (in_flight, request) = self.admit(text)?;

        let call = self.client.run_proof(request);
        let outcome = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome.map_err(FailureReason::from),
                Err(_) => Err(FailureReason::TimedOut(limit)),
            },
            None => call.await.map_err(FailureReason::from),
        };

        in_flight.settle(outcome)
    }

    fn admit(&self, text: &str) -> Result<(InFlight<'_>, OperationRequest), InvokeError> {
        let mut state = lock(&self.state);
        if state.status.is_proving() {
            tracing::warn!("invocation rejected: proof already running");
            return Err(InvokeError::Busy);
        }
        let thread_pool_size = match text.parse::<ThreadPoolSize>() {
            Ok(size) => size,
            Err(err) => {
                tracing::warn!(input = text, "invocation rejected: {err}");
                state.notice = Some(err.clone());
                return Err(err.into());
            }
        };

        state.last_operation += 1;
        let operation = state.last_operation;
        let started_at = Instant::now();
        state.notice = None;
        state.status = OperationStatus::Proving { operation, started_at };
        tracing::info!(operation, workers = thread_pool_size.get(), "proof started");

        let in_flight = InFlight { state: &self.state, operation, started_at, settled: false };
        Ok((in_flight, OperationRequest { thread_pool_size }))
    }
}

impl<C: ProofClient + 'static> ProofController<C> {
    /// Fire-and-forget `invoke`; observe progress through `snapshot`.
    pub fn spawn_invoke(
        self: &Arc<Self>,
        text: impl Into<String>,
    ) -> JoinHandle<Result<OperationResult, InvokeError>> {
        let controller = Arc::clone(self);
        let text = text.into();
        tokio::spawn(async move { controller.invoke(&text).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::protocol::RemoteError;
    use serde_json::json;

    struct Fixed(Result<OperationResult, ClientError>);

    #[async_trait]
    impl ProofClient for Fixed {
        async fn run_proof(&self, _request: OperationRequest) -> Result<OperationResult, ClientError> {
            self.0.clone()
        }
    }

    fn controller(outcome: Result<OperationResult, ClientError>) -> ProofController<Fixed> {
        ProofController::new(Fixed(outcome), ThreadPoolSize::new(4).unwrap(), ControllerConfig::default())
    }

    #[test]
    fn test_bridge_error_mapping() {
        let remote = BridgeError::Remote(RemoteError::computation("pool init failed"));
        assert_eq!(ClientError::from(remote), ClientError::Computation("pool init failed".into()));

        let gone = BridgeError::Disconnected("w".into());
        assert!(matches!(ClientError::from(gone), ClientError::Transport(_)));

        let unknown = BridgeError::Remote(RemoteError::unknown_method("verify"));
        assert!(matches!(ClientError::from(unknown), ClientError::Transport(_)));
    }

    #[tokio::test]
    async fn test_starts_idle_with_initial_size() {
        let c = controller(Ok(json!(1)));
        let snap = c.snapshot().await;
        assert_eq!(snap.status, OperationStatus::Idle);
        assert_eq!(snap.thread_pool_text, "4");
        assert_eq!(snap.status_text, "");
        assert!(snap.result.is_none());
    }

    #[tokio::test]
    async fn test_invoke_current_uses_edited_text() {
        let c = controller(Ok(json!(1)));
        assert!(c.set_thread_pool_text("2").await);
        assert!(!c.set_thread_pool_text("two").await);
        c.invoke_current().await.unwrap();
        assert!(matches!(c.status().await, OperationStatus::Completed { operation: 1, .. }));
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_result() {
        let ok = controller(Ok(json!({ "proof": "first" })));
        ok.invoke("1").await.unwrap();
        let mut state = lock(&ok.state);
        state.status = OperationStatus::Proving { operation: 2, started_at: Instant::now() };
        state.last_operation = 2;

        let err = settle(&mut state, 2, Duration::ZERO, Err(FailureReason::Transport("gone".into())))
            .unwrap_err();
        drop(state);
        assert!(matches!(err, InvokeError::Failed(FailureReason::Transport(_))));
        assert_eq!(ok.snapshot().await.result, Some(json!({ "proof": "first" })));
    }

    #[tokio::test]
    async fn test_stale_outcome_is_discarded() {
        let c = controller(Ok(json!(1)));
        c.invoke("1").await.unwrap();
        let err = settle(&mut lock(&c.state), 1, Duration::ZERO, Ok(json!("late"))).unwrap_err();
        assert_eq!(err, InvokeError::Superseded(1));
        assert_eq!(c.snapshot().await.result, Some(json!(1)));
    }

    #[test]
    fn test_unsettled_operation_fails_as_cancelled() {
        let c = controller(Ok(json!(1)));
        let (in_flight, request) = c.admit("3").unwrap();
        assert_eq!(request.thread_pool_size.get(), 3);
        assert!(lock(&c.state).status.is_proving());

        drop(in_flight);
        let status = lock(&c.state).status.clone();
        assert_eq!(
            status,
            OperationStatus::Failed { operation: 1, reason: FailureReason::Cancelled }
        );
        assert_eq!(
            status.to_string(),
            "Proof generation failed (cancelled): invocation dropped before a result arrived. Press Prove to retry."
        );
    }

    #[test]
    fn test_drop_after_status_moved_on_is_noop() {
        let c = controller(Ok(json!(1)));
        let (in_flight, _) = c.admit("1").unwrap();
        lock(&c.state).status = OperationStatus::Completed { operation: 1, elapsed_secs: 0.0 };
        drop(in_flight);
        assert!(matches!(lock(&c.state).status, OperationStatus::Completed { operation: 1, .. }));
    }

    struct Never;

    #[async_trait]
    impl ProofClient for Never {
        async fn run_proof(&self, _request: OperationRequest) -> Result<OperationResult, ClientError> {
            std::future::pending::<Result<OperationResult, ClientError>>().await
        }
    }

    #[tokio::test]
    async fn test_outer_timeout_does_not_leave_proving() {
        let c = ProofController::new(Never, ThreadPoolSize::MIN, ControllerConfig::default());
        let outer = tokio::time::timeout(Duration::from_millis(20), c.invoke("2")).await;
        assert!(outer.is_err());

        let snap = c.snapshot().await;
        assert!(matches!(snap.status, OperationStatus::Failed { reason: FailureReason::Cancelled, .. }));
        assert!(snap.status_text.starts_with("Proof generation failed (cancelled)"));
    }
}
