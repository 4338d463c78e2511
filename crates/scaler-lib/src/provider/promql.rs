//! Prometheus-backed latency source
//!
//! Issues an instant `histogram_quantile` query against the Prometheus HTTP
//! API and returns the p99 of the workload's response time histogram.

use super::{async_trait, LatencySource};
use crate::error::{ProviderError, ProviderResult};
use crate::models::WorkloadRef;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_LATENCY_METRIC: &str = "http_response_time_milliseconds";
pub const DEFAULT_LATENCY_WINDOW: &str = "10m";

/// Latency source backed by a Prometheus server
pub struct PrometheusLatency {
    client: Client,
    base_url: Url,
    metric: String,
    window: String,
}

impl PrometheusLatency {
    /// Create a client for the Prometheus server at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid Prometheus URL")?;

        Ok(Self {
            client,
            base_url,
            metric: DEFAULT_LATENCY_METRIC.to_string(),
            window: DEFAULT_LATENCY_WINDOW.to_string(),
        })
    }

    /// Histogram metric name, without the `_bucket` suffix
    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = metric.into();
        self
    }

    /// Rate window, e.g. `1m` or `10m`
    pub fn with_window(mut self, window: impl Into<String>) -> Self {
        self.window = window.into();
        self
    }

    /// PromQL for the p99 latency of a workload
    pub fn query_for(&self, workload: &WorkloadRef) -> String {
        format!(
            "histogram_quantile(0.99, sum(rate({}_bucket{{service=\"{}\"}}[{}])) by (le))",
            self.metric, workload.name, self.window
        )
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    #[serde(default)]
    result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    /// `[unix_timestamp, "value"]`
    value: (f64, String),
}

#[async_trait]
impl LatencySource for PrometheusLatency {
    async fn p99_millis(&self, workload: &WorkloadRef) -> ProviderResult<f64> {
        let url = self
            .base_url
            .join("api/v1/query")
            .map_err(ProviderError::transient)?;
        let query = self.query_for(workload);

        let response = self
            .client
            .get(url)
            .query(&[("query", query.as_str())])
            .send()
            .await
            .map_err(ProviderError::transient)?;

        if !response.status().is_success() {
            return Err(ProviderError::Transient(format!(
                "prometheus returned {}",
                response.status()
            )));
        }

        let body: QueryResponse = response.json().await.map_err(ProviderError::transient)?;
        if body.status != "success" {
            return Err(ProviderError::Transient(
                body.error.unwrap_or_else(|| format!("query status {}", body.status)),
            ));
        }

        let data = body.data.ok_or(ProviderError::NoData)?;
        if data.result_type != "vector" {
            return Err(ProviderError::Transient(format!(
                "unexpected result type {}",
                data.result_type
            )));
        }

        let sample = data.result.first().ok_or(ProviderError::NoData)?;
        let value: f64 = sample
            .value
            .1
            .parse()
            .map_err(|_| ProviderError::Transient(format!("bad sample {:?}", sample.value.1)))?;

        // histogram_quantile yields NaN when the rate window saw no requests
        if value.is_nan() {
            return Err(ProviderError::NoData);
        }

        debug!(workload = %workload, latency_ms = value, "Fetched p99 latency");
        Ok(value)
    }
}
