//! Daemon configuration
//!
//! Optional TOML file overlaid by `PODOSCALER_*` environment variables.

use anyhow::{bail, Context, Result};
use scaler_lib::config::{
    DEFAULT_DOWNSCALE_UTILIZATION_THRESHOLD, DEFAULT_LATENCY_THRESHOLD_MILLIS,
    DEFAULT_MAX_ALLOCATION_PER_REPLICA, DEFAULT_MIN_NODE_AVAILABILITY_THRESHOLD,
    DEFAULT_MIN_REQUEST_FLOOR,
};
use scaler_lib::provider::{
    KubeProviderConfig, DEFAULT_LATENCY_METRIC, DEFAULT_LATENCY_WINDOW, DEFAULT_SCOPE_LABEL,
    DEFAULT_SIDECAR_CONTAINERS,
};
use scaler_lib::ScalerConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE_ENV: &str = "PODOSCALER_CONFIG_FILE";
pub const DEFAULT_CONFIG_FILE: &str = "/etc/podoscaler/config.toml";

/// Autoscaler daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Instance name for log events, from the downward API
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    #[serde(default = "default_min_node_availability_threshold")]
    pub min_node_availability_threshold: f64,

    #[serde(default = "default_downscale_utilization_threshold")]
    pub downscale_utilization_threshold: f64,

    #[serde(default = "default_max_allocation_per_replica")]
    pub max_allocation_per_replica: u64,

    #[serde(default = "default_min_request_floor")]
    pub min_request_floor: u64,

    #[serde(default = "default_latency_threshold_millis")]
    pub latency_threshold_millis: u64,

    /// Seconds between round starts
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Label selector that opts a Deployment in
    #[serde(default = "default_scope_label")]
    pub scope_label: String,

    /// Restrict to one namespace, all namespaces when unset
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default = "default_sidecar_containers")]
    pub sidecar_containers: Vec<String>,

    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    #[serde(default = "default_latency_metric")]
    pub latency_metric: String,

    #[serde(default = "default_latency_window")]
    pub latency_window: String,

    /// Upper bound on replica convergence
    #[serde(default = "default_scale_timeout")]
    pub scale_timeout_secs: u64,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_instance_name() -> String {
    std::env::var("POD_NAME").unwrap_or_else(|_| "podoscaler".to_string())
}

fn default_min_node_availability_threshold() -> f64 {
    DEFAULT_MIN_NODE_AVAILABILITY_THRESHOLD
}

fn default_downscale_utilization_threshold() -> f64 {
    DEFAULT_DOWNSCALE_UTILIZATION_THRESHOLD
}

fn default_max_allocation_per_replica() -> u64 {
    DEFAULT_MAX_ALLOCATION_PER_REPLICA
}

fn default_min_request_floor() -> u64 {
    DEFAULT_MIN_REQUEST_FLOOR
}

fn default_latency_threshold_millis() -> u64 {
    DEFAULT_LATENCY_THRESHOLD_MILLIS
}

fn default_poll_interval() -> u64 {
    60
}

fn default_scope_label() -> String {
    DEFAULT_SCOPE_LABEL.to_string()
}

fn default_sidecar_containers() -> Vec<String> {
    DEFAULT_SIDECAR_CONTAINERS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_prometheus_url() -> String {
    "http://prometheus-server.monitoring.svc:80".to_string()
}

fn default_latency_metric() -> String {
    DEFAULT_LATENCY_METRIC.to_string()
}

fn default_latency_window() -> String {
    DEFAULT_LATENCY_WINDOW.to_string()
}

fn default_scale_timeout() -> u64 {
    30
}

fn default_api_port() -> u16 {
    8080
}

impl AppConfig {
    /// Load from the configured file (if present) and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("PODOSCALER")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("sidecar_containers"),
            )
            .build()
            .context("Failed to read configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;

        Ok(config)
    }

    /// Reject configurations the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        self.scaler_config().validate()?;

        if !(5..=600).contains(&self.poll_interval_secs) {
            bail!(
                "poll_interval_secs must be within [5, 600], got {}",
                self.poll_interval_secs
            );
        }
        if self.scope_label.trim().is_empty() {
            bail!("scope_label must not be empty");
        }
        url::Url::parse(&self.prometheus_url)
            .with_context(|| format!("Invalid prometheus_url {}", self.prometheus_url))?;

        Ok(())
    }

    pub fn scaler_config(&self) -> ScalerConfig {
        ScalerConfig {
            min_node_availability_threshold: self.min_node_availability_threshold,
            downscale_utilization_threshold: self.downscale_utilization_threshold,
            max_allocation_per_replica: self.max_allocation_per_replica,
            min_request_floor: self.min_request_floor,
            latency_threshold_millis: self.latency_threshold_millis,
        }
    }

    pub fn kube_provider_config(&self) -> KubeProviderConfig {
        KubeProviderConfig {
            namespace: self.namespace.clone(),
            scope_label: self.scope_label.clone(),
            sidecar_containers: self.sidecar_containers.clone(),
            scale_timeout: Duration::from_secs(self.scale_timeout_secs),
            ..Default::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/podoscaler.toml")).unwrap();

        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.scope_label, "podoscaler.io/managed=true");
        assert_eq!(config.scaler_config(), ScalerConfig::default());
        assert!(config.namespace.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_config(
            r#"
max_allocation_per_replica = 400
latency_threshold_millis = 100
poll_interval_secs = 15
namespace = "shop"
sidecar_containers = ["envoy"]
"#,
        );

        let config = AppConfig::load_from(file.path()).unwrap();

        assert_eq!(config.max_allocation_per_replica, 400);
        assert_eq!(config.latency_threshold_millis, 100);
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.namespace.as_deref(), Some("shop"));
        assert_eq!(config.kube_provider_config().sidecar_containers, vec!["envoy"]);
    }

    #[test]
    fn test_rejects_out_of_range_poll_interval() {
        let file = write_config("poll_interval_secs = 1\n");
        let err = AppConfig::load_from(file.path()).unwrap_err();

        assert!(err.to_string().contains("poll_interval_secs"));
    }

    #[test]
    fn test_rejects_invalid_thresholds() {
        let file = write_config("downscale_utilization_threshold = 0.0\n");
        assert!(AppConfig::load_from(file.path()).is_err());
    }

    #[test]
    fn test_rejects_invalid_prometheus_url() {
        let file = write_config("prometheus_url = \"not a url\"\n");
        assert!(AppConfig::load_from(file.path()).is_err());
    }
}
