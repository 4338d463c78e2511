//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// Defaults for flags the user leaves unset
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default namespace
    pub namespace: Option<String>,
    /// Label selector for managed Deployments
    pub scope_label: Option<String>,
    /// Prometheus base URL for latency reads
    pub prometheus_url: Option<String>,
    /// Default output format (`table` or `json`)
    pub format: Option<String>,
}

impl Config {
    /// Load configuration from `~/.config/podoscaler/cli.json`, empty if absent
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Configured format, `None` when unset or unrecognized
    pub fn output_format(&self) -> Option<OutputFormat> {
        match self.format.as_deref()?.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }

    fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("podoscaler").join("cli.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_is_empty() {
        let config = Config::load_from(Path::new("/nonexistent/cli.json")).unwrap();

        assert!(config.namespace.is_none());
        assert!(config.output_format().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"namespace": "shop", "prometheus_url": "http://prom:9090", "format": "JSON"}}"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();

        assert_eq!(config.namespace.as_deref(), Some("shop"));
        assert_eq!(config.prometheus_url.as_deref(), Some("http://prom:9090"));
        assert!(config.scope_label.is_none());
        assert!(matches!(config.output_format(), Some(OutputFormat::Json)));
    }

    #[test]
    fn test_unknown_format_ignored() {
        let config = Config {
            format: Some("yaml".to_string()),
            ..Default::default()
        };
        assert!(config.output_format().is_none());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(Config::load_from(file.path()).is_err());
    }
}
