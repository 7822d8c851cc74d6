//! Core types for prove-worker.
//!
//! This module contains the boundary types exchanged between the controller,
//! the bridge and the worker endpoint, plus host detection.

pub mod env;
pub mod schema;

// Re-export key types for convenience
pub use env::{EnvironmentInfo, hardware_concurrency};
pub use schema::{
    ControllerSnapshot, FailureReason, OperationRequest, OperationResult, OperationStatus,
    ThreadPoolInput, ThreadPoolSize, ValidationError, round_secs,
};
