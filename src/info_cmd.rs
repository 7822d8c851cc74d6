use anyhow::Context;

use crate::WorkerResult;
use crate::core::EnvironmentInfo;

/// Print detected host information, including the default thread pool size.
pub fn run() -> WorkerResult<()> {
    let env = EnvironmentInfo::detect();
    let pretty = serde_json::to_string_pretty(&env).context("failed to render system info")?;
    println!("{pretty}");
    Ok(())
}
