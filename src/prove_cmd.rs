use std::path::PathBuf;

use anyhow::Context;

use crate::backend::{MerkleModule, ProofModule};
use crate::config::{Config, load_config};
use crate::core::{ControllerSnapshot, FailureReason, hardware_concurrency};
use crate::engine::{ControllerConfig, InvokeError, ProofController, WorkerClient};
use crate::{WorkerError, WorkerResult};

/// Options of `prove-worker prove`.
#[derive(Debug, Clone, Default)]
pub struct ProveOptions {
    /// One invocation per entry, in order; empty means one run at hardware concurrency
    pub threads: Vec<String>,
    pub config: Option<PathBuf>,
    pub degree: Option<u32>,
    pub rounds: Option<u32>,
    /// Overrides `worker.timeout_secs`; 0 disables the timeout
    pub timeout_secs: Option<u64>,
}

impl ProveOptions {
    fn resolve_config(&self) -> WorkerResult<Config> {
        let mut cfg = match &self.config {
            Some(path) => load_config(path)?,
            None => Config::default(),
        };
        if let Some(degree) = self.degree {
            cfg.circuit.degree = degree;
        }
        if let Some(rounds) = self.rounds {
            cfg.circuit.rounds = rounds;
        }
        if let Some(secs) = self.timeout_secs {
            cfg.worker.timeout_secs = secs;
        }
        cfg.circuit.validate()?;
        Ok(cfg)
    }
}

/// Outcome of one invocation in a `prove` run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub threads: String,
    pub snapshot: ControllerSnapshot,
    pub error: Option<InvokeError>,
}

pub fn run(options: ProveOptions) -> WorkerResult<()> {
    let cfg = options.resolve_config()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let module = MerkleModule::new(cfg.circuit.clone());
    let reports = runtime.block_on(run_sequence(module, &cfg, &options.threads))?;

    if let Some(result) = reports.last().and_then(|r| r.snapshot.result.as_ref()) {
        let pretty = serde_json::to_string_pretty(result).context("failed to render result")?;
        println!("{pretty}");
    }
    let failed = reports.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        return Err(WorkerError::Message(format!("{failed} of {} runs failed", reports.len())));
    }
    Ok(())
}

/// Run one invocation per entry of `threads` on a single worker, printing
/// the status narration after each.
///
/// If any run timed out the worker is detached rather than joined, so the
/// call returns without waiting for the abandoned computation.
pub async fn run_sequence<M: ProofModule>(
    module: M,
    cfg: &Config,
    threads: &[String],
) -> WorkerResult<Vec<RunReport>> {
    let client = WorkerClient::spawn(cfg.worker.name.clone(), module)?;
    let controller = ProofController::with_detected_concurrency(
        client,
        ControllerConfig { timeout: cfg.timeout() },
    );

    let texts = if threads.is_empty() {
        vec![hardware_concurrency().to_string()]
    } else {
        threads.to_vec()
    };

    let mut reports = Vec::with_capacity(texts.len());
    for text in texts {
        controller.set_thread_pool_text(&text).await;
        let error = controller.invoke(&text).await.err();
        let snapshot = controller.snapshot().await;
        println!("[threads={text}] {}", snapshot.status_text);
        reports.push(RunReport { threads: text, snapshot, error });
    }

    let timed_out = reports
        .iter()
        .any(|r| matches!(r.error, Some(InvokeError::Failed(FailureReason::TimedOut(_)))));
    let client = controller.into_client();
    if timed_out {
        // The worker exits after its current computation finishes.
        tracing::warn!(worker = %cfg.worker.name, "not waiting for timed-out worker");
        drop(client);
    } else {
        client.shutdown().await?;
    }
    Ok(reports)
}
