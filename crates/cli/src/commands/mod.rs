//! CLI command implementations

pub mod nodes;
pub mod round;
pub mod scale;
pub mod watch;
pub mod workloads;

use anyhow::Result;
use scaler_lib::provider::{KubeProvider, KubeProviderConfig, PrometheusLatency};
use scaler_lib::MetricsProvider;
use std::path::PathBuf;
use std::sync::Arc;

use crate::output::OutputFormat;

/// Connection settings shared by every command
#[derive(Debug, Clone)]
pub struct Session {
    pub kubeconfig: Option<PathBuf>,
    pub namespace: Option<String>,
    pub scope_label: String,
    pub prometheus_url: String,
    pub format: OutputFormat,
}

impl Session {
    pub async fn provider(&self) -> Result<Arc<dyn MetricsProvider>> {
        let latency = PrometheusLatency::new(&self.prometheus_url)?;
        let config = KubeProviderConfig {
            namespace: self.namespace.clone(),
            scope_label: self.scope_label.clone(),
            ..Default::default()
        };
        let provider =
            KubeProvider::connect(config, Arc::new(latency), self.kubeconfig.as_deref()).await?;
        Ok(Arc::new(provider))
    }
}
