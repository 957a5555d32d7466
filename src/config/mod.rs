//! Configuration management for viewsync
//!
//! Handles loading, parsing and validation of the YAML configuration file.

use crate::error::SyncError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Delay used to coalesce bursts of remote-origin changes
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Timeout embedded in client forwarding code for swallowed messages
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Prefix for generated message-channel ids
    #[serde(default = "default_comm_prefix")]
    pub comm_prefix: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            timeout_ms: default_timeout_ms(),
            comm_prefix: default_comm_prefix(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Failed to load config: {}", path))?;

        Ok(config)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document means "all defaults"
        let config: SyncConfig = if contents.trim().is_empty() {
            SyncConfig::default()
        } else {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> std::result::Result<(), SyncError> {
        if self.timeout_ms == 0 {
            return Err(SyncError::Config(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.debounce_ms > self.timeout_ms {
            return Err(SyncError::Config(format!(
                "debounce_ms ({}) cannot exceed timeout_ms ({})",
                self.debounce_ms, self.timeout_ms
            )));
        }
        if self.comm_prefix.is_empty() {
            return Err(SyncError::Config("comm_prefix cannot be empty".to_string()));
        }
        // The prefix ends up inside a quoted string in generated client code
        if self
            .comm_prefix
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\'' || c == '\\')
        {
            return Err(SyncError::Config(format!(
                "comm_prefix '{}' must not contain whitespace, quotes or backslashes",
                self.comm_prefix
            )));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// Default value functions
fn default_debounce_ms() -> u64 { 50 }
fn default_timeout_ms() -> u64 { 20000 }
fn default_comm_prefix() -> String { "viewsync".to_string() }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.timeout_ms, 20000);
        assert_eq!(config.comm_prefix, "viewsync");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = SyncConfig::from_yaml("debounce_ms: 120\n").unwrap();
        assert_eq!(config.debounce_ms, 120);
        assert_eq!(config.timeout_ms, 20000);
        assert_eq!(config.debounce(), Duration::from_millis(120));
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = SyncConfig::from_yaml("   \n").unwrap();
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(SyncConfig::from_yaml("timeout_ms: 0\n").is_err());
        assert!(SyncConfig::from_yaml("debounce_ms: 500\ntimeout_ms: 100\n").is_err());
        assert!(SyncConfig::from_yaml("comm_prefix: \"\"\n").is_err());
        assert!(SyncConfig::from_yaml("comm_prefix: \"a b\"\n").is_err());

        let config = SyncConfig {
            timeout_ms: 0,
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[tokio::test]
    async fn test_load_from_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("viewsync.yaml");
        std::fs::write(&path, "debounce_ms: 25\ncomm_prefix: nb\n")?;

        let config = SyncConfig::load(&path.to_string_lossy()).await?;
        assert_eq!(config.debounce_ms, 25);
        assert_eq!(config.comm_prefix, "nb");
        Ok(())
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let result = SyncConfig::load("/nonexistent/viewsync.yaml").await;
        assert!(result.is_err());
    }
}
