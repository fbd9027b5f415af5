//! Reconciler configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::{Error, Result};

/// How a computed diff is delivered to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushStrategyKind {
    /// One RPC per item, barrier after every batch.
    #[default]
    Incremental,
    /// Every step in one ordered batch RPC.
    FlatBatch,
}

impl std::fmt::Display for PushStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incremental => write!(f, "incremental"),
            Self::FlatBatch => write!(f, "flat_batch"),
        }
    }
}

impl std::str::FromStr for PushStrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "incremental" => Ok(Self::Incremental),
            "flat_batch" | "flat-batch" | "flat" => Ok(Self::FlatBatch),
            other => Err(Error::invalid_config(format!("unknown push strategy '{other}'"))),
        }
    }
}

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Concurrent pushes system-wide.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    #[serde(default)]
    pub push_strategy: PushStrategyKind,

    /// Check ownership again right before the push starts.
    #[serde(default = "default_true")]
    pub recheck_ownership_before_push: bool,

    /// Treat flows as equal when their instructions match.
    #[serde(default)]
    pub compare_flow_instructions_only: bool,

    #[serde(default = "default_true")]
    pub push_table_features: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            push_strategy: PushStrategyKind::default(),
            recheck_ownership_before_push: true,
            compare_flow_instructions_only: false,
            push_table_features: true,
        }
    }
}

impl ReconcilerConfig {
    /// Set the worker pool size.
    #[must_use]
    pub const fn worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    /// Set the push strategy.
    #[must_use]
    pub const fn push_strategy(mut self, strategy: PushStrategyKind) -> Self {
        self.push_strategy = strategy;
        self
    }

    #[must_use]
    pub const fn recheck_ownership_before_push(mut self, enabled: bool) -> Self {
        self.recheck_ownership_before_push = enabled;
        self
    }

    #[must_use]
    pub const fn compare_flow_instructions_only(mut self, enabled: bool) -> Self {
        self.compare_flow_instructions_only = enabled;
        self
    }

    /// Load configuration from environment variables on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` when a variable is set but unparsable.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `FLOWSYNC_*` overrides looked up through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` when a value is unparsable.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(size) = lookup("FLOWSYNC_WORKER_POOL_SIZE") {
            self.worker_pool_size = size.trim().parse().map_err(|e| {
                Error::invalid_config(format!("FLOWSYNC_WORKER_POOL_SIZE '{size}': {e}"))
            })?;
        }
        if let Some(strategy) = lookup("FLOWSYNC_PUSH_STRATEGY") {
            self.push_strategy = strategy.parse()?;
        }
        if let Some(flag) = lookup("FLOWSYNC_RECHECK_OWNERSHIP") {
            self.recheck_ownership_before_push = parse_flag("FLOWSYNC_RECHECK_OWNERSHIP", &flag)?;
        }
        if let Some(flag) = lookup("FLOWSYNC_COMPARE_INSTRUCTIONS_ONLY") {
            self.compare_flow_instructions_only =
                parse_flag("FLOWSYNC_COMPARE_INSTRUCTIONS_ONLY", &flag)?;
        }
        if let Some(flag) = lookup("FLOWSYNC_PUSH_TABLE_FEATURES") {
            self.push_table_features = parse_flag("FLOWSYNC_PUSH_TABLE_FEATURES", &flag)?;
        }
        Ok(self)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a core error if the file cannot be read or parsed, or
    /// `Error::InvalidConfig` if the parsed values fail validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| flowsync_core::Error::file_read_failed(path, e.to_string()))?;
        let config: Self = toml::from_str(&content).map_err(flowsync_core::Error::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values can drive a pipeline.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the worker pool is empty or larger
    /// than a semaphore can hold.
    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(Error::invalid_config("worker_pool_size must be at least 1"));
        }
        if self.worker_pool_size > Semaphore::MAX_PERMITS {
            return Err(Error::invalid_config(format!(
                "worker_pool_size {} exceeds the maximum of {}",
                self.worker_pool_size,
                Semaphore::MAX_PERMITS
            )));
        }
        Ok(())
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::invalid_config(format!("{name} '{other}' is not a boolean"))),
    }
}

const fn default_worker_pool_size() -> usize {
    6
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.worker_pool_size, 6);
        assert_eq!(config.push_strategy, PushStrategyKind::Incremental);
        assert!(config.recheck_ownership_before_push);
        assert!(!config.compare_flow_instructions_only);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_pool_is_invalid() {
        let config = ReconcilerConfig::default().worker_pool_size(0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_oversized_pool_from_env_is_invalid() -> Result<()> {
        let huge = usize::MAX.to_string();
        let config = ReconcilerConfig::default()
            .with_overrides(|name| (name == "FLOWSYNC_WORKER_POOL_SIZE").then(|| huge.clone()))?;

        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));
        assert!(ReconcilerConfig::default().worker_pool_size(Semaphore::MAX_PERMITS).validate().is_ok());
        Ok(())
    }

    #[test]
    fn test_overrides_apply() -> Result<()> {
        let vars = HashMap::from([
            ("FLOWSYNC_WORKER_POOL_SIZE", "2"),
            ("FLOWSYNC_PUSH_STRATEGY", "flat_batch"),
            ("FLOWSYNC_RECHECK_OWNERSHIP", "off"),
        ]);
        let config = ReconcilerConfig::default()
            .with_overrides(|name| vars.get(name).map(ToString::to_string))?;

        assert_eq!(config.worker_pool_size, 2);
        assert_eq!(config.push_strategy, PushStrategyKind::FlatBatch);
        assert!(!config.recheck_ownership_before_push);
        assert!(config.push_table_features);
        Ok(())
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let result = ReconcilerConfig::default()
            .with_overrides(|name| (name == "FLOWSYNC_PUSH_TABLE_FEATURES").then(|| "maybe".to_string()));
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_from_file_fills_defaults() -> Result<()> {
        let dir = tempfile::tempdir().map_err(flowsync_core::Error::from)?;
        let path = dir.path().join("flowsync.toml");
        std::fs::write(&path, "push_strategy = \"flat_batch\"\ncompare_flow_instructions_only = true\n")
            .map_err(flowsync_core::Error::from)?;

        let config = ReconcilerConfig::from_file(&path)?;
        assert_eq!(config.push_strategy, PushStrategyKind::FlatBatch);
        assert!(config.compare_flow_instructions_only);
        assert_eq!(config.worker_pool_size, 6);
        Ok(())
    }

    #[test]
    fn test_from_file_rejects_zero_pool() {
        let dir = tempfile::tempdir();
        assert!(dir.is_ok());
        if let Ok(dir) = dir {
            let path = dir.path().join("flowsync.toml");
            assert!(std::fs::write(&path, "worker_pool_size = 0\n").is_ok());
            assert!(matches!(
                ReconcilerConfig::from_file(&path),
                Err(Error::InvalidConfig { .. })
            ));
        }
    }
}
