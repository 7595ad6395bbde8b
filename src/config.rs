//! Configuration loading with defaults
use crate::repository::SledRepository;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How report review decisions treat the current status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Every transition checks its source status.
    #[default]
    Strict,
    /// approve/reject/confirm-payment/reject-payment apply from any status.
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub database_path: PathBuf,
    /// Open a throwaway database that is removed on drop.
    pub temporary: bool,
    pub flush_on_write: bool,
    pub transition_policy: TransitionPolicy,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("expense-workflow.db"),
            temporary: false,
            flush_on_write: false,
            transition_policy: TransitionPolicy::Strict,
        }
    }
}

/// Reads `path` as JSON, filling absent fields with defaults. A missing file
/// yields the default configuration.
pub fn load_config(path: &Path) -> anyhow::Result<WorkflowConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(WorkflowConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = serde_json::from_str(&raw)
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

pub fn open_repository(config: &WorkflowConfig) -> anyhow::Result<SledRepository> {
    let db = sled::Config::new()
        .path(&config.database_path)
        .temporary(config.temporary)
        .open()
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;

    Ok(SledRepository::new(Arc::new(db)).with_flush_on_write(config.flush_on_write))
}
