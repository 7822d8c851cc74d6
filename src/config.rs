use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::backend::CircuitParams;
use crate::{WorkerError, WorkerResult};

pub const DEFAULT_WORKER_NAME: &str = "prove-worker";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerSection {
    pub name: String,
    /// Seconds to wait for a proof; 0 waits forever
    pub timeout_secs: u64,
}

impl Default for WorkerSection {
    fn default() -> Self {
        WorkerSection { name: DEFAULT_WORKER_NAME.to_string(), timeout_secs: 0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub worker: WorkerSection,
    pub circuit: CircuitParams,
}

impl Config {
    pub fn timeout(&self) -> Option<Duration> {
        match self.worker.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

pub fn parse_config(s: &str) -> WorkerResult<Config> {
    let cfg: Config = toml::from_str(s).map_err(|e| WorkerError::Message(e.to_string()))?;
    cfg.circuit.validate()?;
    Ok(cfg)
}

pub fn load_config(path: &Path) -> WorkerResult<Config> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| WorkerError::Message(format!("{}: {e}", path.display())))?;
    parse_config(&s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.worker.name, "prove-worker");
        assert!(cfg.timeout().is_none());
    }

    #[test]
    fn test_partial_sections() {
        let cfg = parse_config(
            r#"
[worker]
timeout_secs = 30

[circuit]
degree = 4
"#,
        )
        .unwrap();
        assert_eq!(cfg.worker.name, "prove-worker");
        assert_eq!(cfg.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.circuit.degree, 4);
        assert_eq!(cfg.circuit.rounds, 4);
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(parse_config("[verifier]\nenabled = true\n").is_err());
    }

    #[test]
    fn test_invalid_circuit_rejected() {
        assert!(parse_config("[circuit]\nrounds = 0\n").is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prove-worker.toml");
        std::fs::write(&path, "[worker]\nname = \"halo-worker\"\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.worker.name, "halo-worker");

        let missing = load_config(&dir.path().join("nope.toml")).unwrap_err();
        assert!(missing.to_string().contains("nope.toml"));
    }
}
