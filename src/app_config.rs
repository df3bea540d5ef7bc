//! JSON configuration file for CLI defaults.
//!
//! Every key is optional; command-line flags override file values.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// Values read from `--config <FILE>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Key-value store database path.
    pub store: Option<PathBuf>,
    /// Default output directory for downloads.
    pub output_dir: Option<PathBuf>,
    /// Enlarge the portal page size before scanning.
    pub optimize_pagination: Option<bool>,
    /// Wait after each page navigation, in milliseconds.
    pub settle_delay_ms: Option<u64>,
    /// Jobs released per batch (1..=100).
    pub batch_size: Option<usize>,
    /// Concurrent jobs within a batch (same range as CLI).
    pub concurrency: Option<usize>,
    /// Retries for transient failures (0..=10).
    pub max_retries: Option<u32>,
    /// Base backoff delay in milliseconds.
    pub retry_delay_ms: Option<u64>,
    /// Pause between batches in milliseconds.
    pub delay_between_batches_ms: Option<u64>,
    /// Finished jobs between session snapshots.
    pub progress_save_interval: Option<usize>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(batch_size) = self.batch_size
            && !(1..=100).contains(&batch_size)
        {
            bail!("Invalid config value for `batch_size`: {batch_size}. Expected range: 1..=100");
        }
        if let Some(concurrency) = self.concurrency
            && !(1..=20).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=20");
        }
        if let Some(max_retries) = self.max_retries
            && max_retries > 10
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 0..=10");
        }
        if self.progress_save_interval == Some(0) {
            bail!("Invalid config value for `progress_save_interval`: 0. Expected at least 1");
        }
        validate_delay_ms("settle_delay_ms", self.settle_delay_ms)?;
        validate_delay_ms("retry_delay_ms", self.retry_delay_ms)?;
        validate_delay_ms("delay_between_batches_ms", self.delay_between_batches_ms)?;
        Ok(())
    }
}

fn validate_delay_ms(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if value > 600_000 {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 0..=600000");
    }
    Ok(())
}

/// Loads and validates a config file; `None` path yields the defaults.
pub fn load(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = serde_json::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_str_reads_known_keys() {
        let config = parse_config_str(
            r#"{"batch_size": 5, "concurrency": 2, "retry_delay_ms": 500, "optimize_pagination": true}"#,
        )
        .unwrap();
        assert_eq!(config.batch_size, Some(5));
        assert_eq!(config.concurrency, Some(2));
        assert_eq!(config.retry_delay_ms, Some(500));
        assert_eq!(config.optimize_pagination, Some(true));
        assert!(config.store.is_none());
    }

    #[test]
    fn test_parse_config_str_rejects_unknown_key() {
        let error = parse_config_str(r#"{"rate_limit": 10}"#).unwrap_err();
        assert!(error.to_string().contains("rate_limit"), "{error}");
    }

    #[test]
    fn test_parse_config_str_rejects_out_of_range_concurrency() {
        let error = parse_config_str(r#"{"concurrency": 0}"#).unwrap_err();
        assert!(error.to_string().contains("`concurrency`"), "{error}");
    }

    #[test]
    fn test_parse_config_str_rejects_long_delay() {
        let error = parse_config_str(r#"{"delay_between_batches_ms": 900000}"#).unwrap_err();
        assert!(error.to_string().contains("delay_between_batches_ms"), "{error}");
    }

    #[test]
    fn test_load_without_path_returns_defaults() {
        assert_eq!(load(None).unwrap(), FileConfig::default());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"max_retries": 1}"#).unwrap();
        assert_eq!(load(Some(&path)).unwrap().max_retries, Some(1));
    }
}
