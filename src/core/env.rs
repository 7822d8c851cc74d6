//! Host detection: hardware concurrency and a summary of the machine.

use serde::{Deserialize, Serialize};
use sysinfo::{CpuRefreshKind, RefreshKind, System};

use super::schema::ThreadPoolSize;

/// Host information printed by `prove-worker info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_model: Option<String>,

    pub cpu_cores_logical: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_cores_physical: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_ram_bytes: Option<u64>,

    pub os: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Thread pool size a fresh controller starts with
    pub default_thread_pool_size: ThreadPoolSize,
}

impl EnvironmentInfo {
    /// Detect environment information from the current system
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let cpu_model = sys.cpus().first().map(|c| c.brand().to_string());
        let cpu_cores_logical = sys.cpus().len();
        let cpu_cores_physical = sys.physical_core_count();
        let total_ram_bytes = Some(sys.total_memory());
        let os = System::name().unwrap_or_else(|| std::env::consts::OS.to_string());
        let hostname = System::host_name();

        EnvironmentInfo {
            cpu_model,
            cpu_cores_logical,
            cpu_cores_physical,
            total_ram_bytes,
            os,
            hostname,
            default_thread_pool_size: concurrency_or_one(cpu_cores_logical),
        }
    }
}

/// Logical CPUs reported by the host, never less than one.
pub fn hardware_concurrency() -> ThreadPoolSize {
    let sys = System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::everything()));
    let detected = sys.cpus().len();
    tracing::debug!(detected, "detected hardware concurrency");
    concurrency_or_one(detected)
}

fn concurrency_or_one(cpus: usize) -> ThreadPoolSize {
    ThreadPoolSize::new(cpus).unwrap_or(ThreadPoolSize::MIN)
}
