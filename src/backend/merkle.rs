//! Built-in computation module: a parallel SHA-256 Merkle commitment.
//!
//! Each of the `2^degree` leaves is a hash chain of `rounds` SHA-256
//! applications over `seed || index`; the leaves are then folded pairwise
//! into a single root. Both phases run on the current rayon pool.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::OperationResult;
use crate::{WorkerError, WorkerResult};

use super::traits::ProofModule;

/// Largest accepted `degree`.
pub const MAX_DEGREE: u32 = 24;

/// Circuit parameters for the Merkle module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitParams {
    pub degree: u32,
    pub rounds: u32,
    pub seed: String,
}

impl Default for CircuitParams {
    fn default() -> Self {
        CircuitParams { degree: 12, rounds: 4, seed: "prove-worker".to_string() }
    }
}

impl CircuitParams {
    pub fn validate(&self) -> WorkerResult<()> {
        if self.degree == 0 || self.degree > MAX_DEGREE {
            return Err(WorkerError::Message(format!(
                "circuit degree must be between 1 and {MAX_DEGREE}, got {}",
                self.degree
            )));
        }
        if self.rounds == 0 {
            return Err(WorkerError::Message("circuit rounds must be at least 1".into()));
        }
        Ok(())
    }

    pub fn leaves(&self) -> usize {
        1usize << self.degree
    }
}

pub struct MerkleModule {
    params: CircuitParams,
    initialized: bool,
}

impl MerkleModule {
    pub fn new(params: CircuitParams) -> Self {
        MerkleModule { params, initialized: false }
    }
}

fn leaf_hash(seed: &str, index: usize, rounds: u32) -> String {
    let mut acc = sha256::digest(format!("{seed}:{index}"));
    for _ in 1..rounds {
        acc = sha256::digest(acc);
    }
    acc
}

fn fold_level(level: &[String]) -> Vec<String> {
    level
        .par_chunks(2)
        .map(|pair| {
            if pair.len() == 2 {
                sha256::digest(pair.concat())
            } else {
                pair.concat()
            }
        })
        .collect()
}

impl ProofModule for MerkleModule {
    fn name(&self) -> &str {
        "sha256-merkle"
    }

    fn init(&mut self) -> WorkerResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.params.validate()?;
        tracing::debug!(
            degree = self.params.degree,
            rounds = self.params.rounds,
            "merkle module initialized"
        );
        self.initialized = true;
        Ok(())
    }

    fn prove(&self) -> WorkerResult<OperationResult> {
        if !self.initialized {
            return Err(WorkerError::Message("merkle module used before init".into()));
        }
        let params = &self.params;
        let mut level: Vec<String> = (0..params.leaves())
            .into_par_iter()
            .map(|i| leaf_hash(&params.seed, i, params.rounds))
            .collect();
        while level.len() > 1 {
            level = fold_level(&level);
        }
        let root = level
            .pop()
            .ok_or_else(|| WorkerError::Message("empty merkle tree".into()))?;

        Ok(json!({
            "scheme": self.name(),
            "degree": params.degree,
            "leaves": params.leaves(),
            "rounds": params.rounds,
            "root": root,
            "threads": rayon::current_num_threads(),
        }))
    }
}
