//! Computation modules the worker endpoint can drive.
//!
//! The endpoint only sees the `ProofModule` entry points; what a module
//! computes is opaque to the rest of the crate.

pub mod merkle;
pub mod mock;
pub mod traits;

// Re-export key types
pub use merkle::{CircuitParams, MerkleModule};
pub use mock::{MockCalls, MockConfig, MockModule};
pub use traits::ProofModule;
