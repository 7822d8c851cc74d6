//! Mock computation module for testing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::core::OperationResult;
use crate::{WorkerError, WorkerResult};

use super::traits::ProofModule;

/// Configuration for mock module responses.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Name to report
    pub name: String,
    /// Value `prove` returns
    pub prove_output: Option<OperationResult>,
    /// How long `prove` blocks before answering
    pub prove_delay: Duration,
    /// Whether init should fail
    pub init_fails: bool,
    /// Error message `prove` fails with
    pub prove_error: Option<String>,
    /// Panic message `prove` panics with
    pub prove_panic: Option<String>,
}

impl MockConfig {
    /// Create a new mock config with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        MockConfig {
            name: name.into(),
            prove_output: Some(json!({ "proof": "abc" })),
            prove_delay: Duration::ZERO,
            init_fails: false,
            prove_error: None,
            prove_panic: None,
        }
    }

    /// Set the prove output.
    pub fn with_prove_output(mut self, output: OperationResult) -> Self {
        self.prove_output = Some(output);
        self
    }

    /// Block inside `prove` for `delay`.
    pub fn with_prove_delay(mut self, delay: Duration) -> Self {
        self.prove_delay = delay;
        self
    }

    /// Make init fail.
    pub fn init_fails(mut self) -> Self {
        self.init_fails = true;
        self
    }

    /// Make prove fail with `message`.
    pub fn prove_fails(mut self, message: impl Into<String>) -> Self {
        self.prove_error = Some(message.into());
        self
    }

    /// Make prove panic with `message`.
    pub fn prove_panics(mut self, message: impl Into<String>) -> Self {
        self.prove_panic = Some(message.into());
        self
    }
}

/// What the mock saw while running.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockCalls {
    /// Number of `init` calls
    pub init_calls: usize,
    /// Number of `init` calls that actually initialized
    pub initializations: usize,
    /// Rayon pool size observed by each `prove` call
    pub prove_pool_sizes: Vec<usize>,
}

/// Mock module for unit testing.
///
/// Returns configurable fake results and records the pool size each `prove`
/// call ran on, without doing any real proving.
pub struct MockModule {
    config: MockConfig,
    initialized: bool,
    calls: Arc<Mutex<MockCalls>>,
}

impl MockModule {
    /// Create a new mock module with the given configuration.
    pub fn new(config: MockConfig) -> Self {
        MockModule { config, initialized: false, calls: Arc::default() }
    }

    /// Create a mock module with default configuration.
    pub fn default_mock() -> Self {
        Self::new(MockConfig::new("mock"))
    }

    /// Shared record of calls, readable after the module moved into a worker.
    pub fn calls(&self) -> Arc<Mutex<MockCalls>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, f: impl FnOnce(&mut MockCalls)) {
        if let Ok(mut calls) = self.calls.lock() {
            f(&mut calls);
        }
    }
}

impl ProofModule for MockModule {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn init(&mut self) -> WorkerResult<()> {
        let first = !self.initialized;
        self.record(|c| {
            c.init_calls += 1;
            if first {
                c.initializations += 1;
            }
        });
        if self.config.init_fails {
            return Err(WorkerError::Message("mock init failed".into()));
        }
        self.initialized = true;
        Ok(())
    }

    fn prove(&self) -> WorkerResult<OperationResult> {
        let threads = rayon::current_num_threads();
        self.record(|c| c.prove_pool_sizes.push(threads));
        if !self.config.prove_delay.is_zero() {
            std::thread::sleep(self.config.prove_delay);
        }
        if let Some(msg) = &self.config.prove_panic {
            panic!("{msg}");
        }
        if let Some(msg) = &self.config.prove_error {
            return Err(WorkerError::Message(msg.clone()));
        }
        self.config
            .prove_output
            .clone()
            .ok_or_else(|| WorkerError::Message("no prove output configured".into()))
    }
}
