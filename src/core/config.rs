use anyhow::{anyhow, Context, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for task graph execution behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagConfig {
    /// Run independent ready tasks concurrently (default: false)
    #[serde(default)]
    pub enable_parallel_execution: bool,
    /// Maximum number of tasks in flight at once (default: 3)
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,
    /// Emit runtime events to an attached sink (default: true)
    #[serde(default = "default_emit_events")]
    pub emit_events: bool,
}

fn default_max_parallel_tasks() -> usize {
    3
}

fn default_emit_events() -> bool {
    true
}

impl Default for DagConfig {
    fn default() -> Self {
        Self {
            enable_parallel_execution: false,
            max_parallel_tasks: default_max_parallel_tasks(),
            emit_events: default_emit_events(),
        }
    }
}

impl DagConfig {
    /// Configuration running up to `max_parallel_tasks` ready tasks at once.
    pub fn parallel(max_parallel_tasks: usize) -> Self {
        Self {
            enable_parallel_execution: true,
            max_parallel_tasks,
            ..Default::default()
        }
    }

    /// Validates configuration values
    pub fn validate(&self) -> Result<(), Error> {
        if self.enable_parallel_execution && self.max_parallel_tasks == 0 {
            return Err(anyhow!(
                "max_parallel_tasks must be greater than 0 when parallel execution is enabled"
            ));
        }
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Failed to parse DAG config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read DAG config '{}'", path.display()))?;
        Self::from_yaml_str(&yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sequential() {
        let config = DagConfig::default();
        assert!(!config.enable_parallel_execution);
        assert_eq!(config.max_parallel_tasks, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn yaml_fills_missing_fields() {
        let config = DagConfig::from_yaml_str("enable_parallel_execution: true\n").unwrap();
        assert_eq!(config, DagConfig::parallel(3));
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let err = DagConfig::from_yaml_str(
            "enable_parallel_execution: true\nmax_parallel_tasks: 0\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_parallel_tasks"));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dag.yaml");
        std::fs::write(&path, "max_parallel_tasks: 8\nemit_events: false\n").unwrap();

        let config = DagConfig::load_yaml_file(&path).unwrap();
        assert_eq!(config.max_parallel_tasks, 8);
        assert!(!config.emit_events);
    }
}
