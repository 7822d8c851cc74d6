//! Boundary types shared by the controller, the bridge and the worker endpoint.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected thread pool text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("thread pool size is empty")]
    Empty,
    #[error("thread pool size \"{0}\" is not a whole number")]
    NotDigits(String),
    #[error("thread pool size \"{0}\" is too large")]
    Overflow(String),
    #[error("thread pool size \"{0}\" must be at least 1")]
    Zero(String),
}

impl ValidationError {
    /// Text shown to the user when an invocation is refused.
    pub fn narration(&self) -> String {
        let text = match self {
            ValidationError::Empty => "",
            ValidationError::NotDigits(s) | ValidationError::Overflow(s) | ValidationError::Zero(s) => {
                s.as_str()
            }
        };
        format!("Invalid thread pool size \"{text}\": enter a whole number of at least 1.")
    }
}

/// Number of workers the computation module's pool is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadPoolSize(NonZeroUsize);

impl ThreadPoolSize {
    pub const MIN: ThreadPoolSize = ThreadPoolSize(NonZeroUsize::MIN);

    pub fn new(workers: usize) -> Option<Self> {
        NonZeroUsize::new(workers).map(ThreadPoolSize)
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl FromStr for ThreadPoolSize {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Empty);
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::NotDigits(s.to_string()));
        }
        let value: usize = s
            .parse()
            .map_err(|_| ValidationError::Overflow(s.to_string()))?;
        ThreadPoolSize::new(value).ok_or_else(|| ValidationError::Zero(s.to_string()))
    }
}

impl fmt::Display for ThreadPoolSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Editable thread pool text, as typed by the user.
///
/// Only empty or all-digit text is accepted. Empty text is a legal
/// mid-edit state and is refused later, at invocation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPoolInput {
    text: String,
}

impl ThreadPoolInput {
    pub fn new(initial: ThreadPoolSize) -> Self {
        ThreadPoolInput { text: initial.to_string() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the text if it passes the digits-only filter. Returns whether
    /// the edit was applied.
    pub fn set(&mut self, text: &str) -> bool {
        if text.bytes().all(|b| b.is_ascii_digit()) {
            self.text = text.to_string();
            true
        } else {
            false
        }
    }
}

/// Parameters of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub thread_pool_size: ThreadPoolSize,
}

/// Opaque payload returned by the computation module.
pub type OperationResult = serde_json::Value;

/// Why an operation ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The background context went away or the message could not be delivered.
    Transport(String),
    /// The computation module reported an error or panicked.
    Computation(String),
    /// No response arrived within the configured timeout.
    TimedOut(Duration),
    /// The invocation was dropped before its result arrived.
    Cancelled,
}

impl FailureReason {
    pub fn category(&self) -> &'static str {
        match self {
            FailureReason::Transport(_) => "worker error",
            FailureReason::Computation(_) => "computation error",
            FailureReason::TimedOut(_) => "timeout",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Transport(msg) | FailureReason::Computation(msg) => f.write_str(msg),
            FailureReason::TimedOut(after) => {
                write!(f, "no result after {:.1}s", after.as_secs_f64())
            }
            FailureReason::Cancelled => f.write_str("invocation dropped before a result arrived"),
        }
    }
}

/// Lifecycle phase of the controller's single operation slot.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    Idle,
    Proving { operation: u64, started_at: Instant },
    Completed { operation: u64, elapsed_secs: f64 },
    Failed { operation: u64, reason: FailureReason },
}

impl OperationStatus {
    pub fn is_proving(&self) -> bool {
        matches!(self, OperationStatus::Proving { .. })
    }

    /// Id of the operation this status belongs to; `None` while idle.
    pub fn operation(&self) -> Option<u64> {
        match self {
            OperationStatus::Idle => None,
            OperationStatus::Proving { operation, .. }
            | OperationStatus::Completed { operation, .. }
            | OperationStatus::Failed { operation, .. } => Some(*operation),
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Idle => Ok(()),
            OperationStatus::Proving { .. } => f.write_str("Generating proof..."),
            OperationStatus::Completed { elapsed_secs, .. } => write!(
                f,
                "Proof successfully generated. \nTime to prove (s): {elapsed_secs:.1}"
            ),
            OperationStatus::Failed { reason, .. } => write!(
                f,
                "Proof generation failed ({}): {reason}. Press Prove to retry.",
                reason.category()
            ),
        }
    }
}

/// Read-only view of the controller for presentation code.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    pub thread_pool_text: String,
    pub status: OperationStatus,
    pub status_text: String,
    pub result: Option<OperationResult>,
}

/// Round seconds to one decimal place, halves rounding up.
pub fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 10.0).round() / 10.0
}
