//! Integration tests for the proof controller.
//!
//! These drive `ProofController` through the public API with an in-process
//! `ProofClient`, so no worker thread is involved.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use prove_worker::core::{
    FailureReason, OperationRequest, OperationResult, OperationStatus, ThreadPoolSize,
    ValidationError,
};
use prove_worker::engine::{ClientError, ControllerConfig, InvokeError, ProofClient, ProofController};

/// Client that answers after a delay, with either a fixed proof or a failure.
struct ScriptedClient {
    delay: Duration,
    fail_with: Option<ClientError>,
    calls: AtomicUsize,
    sizes: std::sync::Mutex<Vec<usize>>,
}

impl ScriptedClient {
    fn succeeding(delay: Duration) -> Self {
        ScriptedClient {
            delay,
            fail_with: None,
            calls: AtomicUsize::new(0),
            sizes: Default::default(),
        }
    }

    fn failing(error: ClientError) -> Self {
        ScriptedClient { fail_with: Some(error), ..Self::succeeding(Duration::ZERO) }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProofClient for ScriptedClient {
    async fn run_proof(&self, request: OperationRequest) -> Result<OperationResult, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sizes.lock().unwrap().push(request.thread_pool_size.get());
        tokio::time::sleep(self.delay).await;
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(json!({ "proof": "abc" })),
        }
    }
}

fn controller(client: ScriptedClient) -> ProofController<ScriptedClient> {
    ProofController::new(client, ThreadPoolSize::new(4).unwrap(), ControllerConfig::default())
}

#[tokio::test]
async fn test_success_records_result_and_elapsed() {
    let c = controller(ScriptedClient::succeeding(Duration::from_millis(50)));

    let result = c.invoke("4").await.unwrap();
    assert_eq!(result, json!({ "proof": "abc" }));

    let snap = c.snapshot().await;
    assert_eq!(snap.result, Some(json!({ "proof": "abc" })));
    match snap.status {
        OperationStatus::Completed { operation, elapsed_secs } => {
            assert_eq!(operation, 1);
            assert!(elapsed_secs >= 0.0);
        }
        other => panic!("expected Completed, got {other:?}"),
    }
    assert!(snap.status_text.starts_with("Proof successfully generated. \nTime to prove (s): "));
    assert_eq!(c.client().calls(), 1);
}

#[tokio::test]
async fn test_empty_input_makes_no_call() {
    let c = controller(ScriptedClient::succeeding(Duration::ZERO));
    assert!(c.set_thread_pool_text("").await);

    let err = c.invoke_current().await.unwrap_err();
    assert_eq!(err, InvokeError::Validation(ValidationError::Empty));

    let snap = c.snapshot().await;
    assert_eq!(snap.status, OperationStatus::Idle);
    assert_eq!(snap.status_text, "Invalid thread pool size \"\": enter a whole number of at least 1.");
    assert!(snap.result.is_none());
    assert_eq!(c.client().calls(), 0);
}

#[tokio::test]
async fn test_invalid_inputs_are_rejected() {
    let c = controller(ScriptedClient::succeeding(Duration::ZERO));
    let cases = [
        ("0", ValidationError::Zero("0".into())),
        ("abc", ValidationError::NotDigits("abc".into())),
        ("-2", ValidationError::NotDigits("-2".into())),
        ("2.5", ValidationError::NotDigits("2.5".into())),
        (
            "99999999999999999999999999",
            ValidationError::Overflow("99999999999999999999999999".into()),
        ),
    ];
    for (text, expected) in cases {
        let err = c.invoke(text).await.unwrap_err();
        assert_eq!(err, InvokeError::Validation(expected), "input {text:?}");
    }
    assert_eq!(c.client().calls(), 0);
    assert_eq!(c.status().await, OperationStatus::Idle);
}

#[tokio::test]
async fn test_validation_error_keeps_previous_outcome() {
    let c = controller(ScriptedClient::succeeding(Duration::ZERO));
    c.invoke("2").await.unwrap();

    c.invoke("0").await.unwrap_err();
    let snap = c.snapshot().await;
    assert!(matches!(snap.status, OperationStatus::Completed { operation: 1, .. }));
    assert_eq!(snap.result, Some(json!({ "proof": "abc" })));
    assert!(snap.status_text.starts_with("Invalid thread pool size \"0\""));

    // A successful invocation clears the notice.
    c.invoke("2").await.unwrap();
    let snap = c.snapshot().await;
    assert!(snap.status_text.starts_with("Proof successfully generated."));
}

#[tokio::test]
async fn test_each_invocation_makes_exactly_one_call() {
    let c = controller(ScriptedClient::succeeding(Duration::ZERO));
    for text in ["1", "8", "3"] {
        c.invoke(text).await.unwrap();
    }
    assert_eq!(c.client().calls(), 3);
    assert_eq!(*c.client().sizes.lock().unwrap(), vec![1, 8, 3]);
    assert!(matches!(c.status().await, OperationStatus::Completed { operation: 3, .. }));
}

#[tokio::test]
async fn test_second_invocation_while_proving_is_busy() {
    let c = Arc::new(controller(ScriptedClient::succeeding(Duration::from_millis(200))));
    let first = c.spawn_invoke("2");

    while !c.status().await.is_proving() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let snap = c.snapshot().await;
    assert_eq!(snap.status_text, "Generating proof...");

    assert_eq!(c.invoke("4").await.unwrap_err(), InvokeError::Busy);
    // Busy wins over validation while a proof runs.
    assert_eq!(c.invoke("").await.unwrap_err(), InvokeError::Busy);

    first.await.unwrap().unwrap();
    assert_eq!(c.client().calls(), 1);
    assert!(matches!(c.status().await, OperationStatus::Completed { operation: 1, .. }));
}

#[tokio::test]
async fn test_computation_failure_is_narrated() {
    let c = controller(ScriptedClient::failing(ClientError::Computation("pool init failed".into())));

    let err = c.invoke("2").await.unwrap_err();
    assert_eq!(err, InvokeError::Failed(FailureReason::Computation("pool init failed".into())));

    let snap = c.snapshot().await;
    assert!(matches!(snap.status, OperationStatus::Failed { operation: 1, .. }));
    assert_eq!(
        snap.status_text,
        "Proof generation failed (computation error): pool init failed. Press Prove to retry."
    );
    assert!(snap.result.is_none());
}

#[tokio::test]
async fn test_transport_failure_is_distinguished() {
    let c = controller(ScriptedClient::failing(ClientError::Transport("worker gone".into())));
    let err = c.invoke("4").await.unwrap_err();
    assert_eq!(err, InvokeError::Failed(FailureReason::Transport("worker gone".into())));
    assert!(c.snapshot().await.status_text.contains("(worker error)"));
}

#[tokio::test]
async fn test_timeout_fails_the_operation() {
    let client = ScriptedClient::succeeding(Duration::from_millis(500));
    let config = ControllerConfig { timeout: Some(Duration::from_millis(20)) };
    let c = ProofController::new(client, ThreadPoolSize::MIN, config);

    let err = c.invoke("1").await.unwrap_err();
    assert_eq!(err, InvokeError::Failed(FailureReason::TimedOut(Duration::from_millis(20))));

    let snap = c.snapshot().await;
    assert!(matches!(snap.status, OperationStatus::Failed { .. }));
    assert!(snap.status_text.starts_with("Proof generation failed (timeout)"));

    // Not stuck in Proving: the next invocation is admitted.
    assert!(matches!(
        c.invoke("1").await.unwrap_err(),
        InvokeError::Failed(FailureReason::TimedOut(_))
    ));
    assert_eq!(c.client().calls(), 2);
}

#[tokio::test]
async fn test_retry_after_failure_starts_new_operation() {
    let c = controller(ScriptedClient::failing(ClientError::Computation("boom".into())));
    c.invoke("1").await.unwrap_err();
    c.invoke("1").await.unwrap_err();
    assert_eq!(c.status().await.operation(), Some(2));
}

#[tokio::test]
async fn test_aborted_invocation_does_not_block_the_next() {
    let c = Arc::new(controller(ScriptedClient::succeeding(Duration::from_millis(200))));
    let first = c.spawn_invoke("2");

    while !c.status().await.is_proving() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());

    let snap = c.snapshot().await;
    assert_eq!(
        snap.status,
        OperationStatus::Failed { operation: 1, reason: FailureReason::Cancelled }
    );
    assert_ne!(snap.status_text, "Generating proof...");

    let result = c.invoke("2").await.unwrap();
    assert_eq!(result, json!({ "proof": "abc" }));
    assert!(matches!(c.status().await, OperationStatus::Completed { operation: 2, .. }));
    assert_eq!(c.client().calls(), 2);
}
