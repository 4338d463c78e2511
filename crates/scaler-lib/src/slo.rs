//! SLO evaluation
//!
//! A workload violates its SLO when the observed p99 latency exceeds the
//! configured threshold. A missing metric never triggers growth.

use crate::error::ProviderError;
use crate::models::WorkloadRef;
use crate::provider::MetricsProvider;
use std::sync::Arc;
use tracing::{debug, warn};

/// Latency reading and the verdict derived from it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SloStatus {
    /// `None` when the backend had no data or could not be read
    pub latency_millis: Option<f64>,
    pub violated: bool,
}

pub struct SloEvaluator {
    provider: Arc<dyn MetricsProvider>,
    latency_threshold_millis: u64,
}

impl SloEvaluator {
    pub fn new(provider: Arc<dyn MetricsProvider>, latency_threshold_millis: u64) -> Self {
        Self {
            provider,
            latency_threshold_millis,
        }
    }

    pub async fn is_violated(&self, workload: &WorkloadRef) -> bool {
        self.evaluate(workload).await.violated
    }

    /// Query p99 latency and compare it to the threshold (fail-open)
    pub async fn evaluate(&self, workload: &WorkloadRef) -> SloStatus {
        let latency = match self.provider.latency_percentile(workload).await {
            Ok(latency) => latency,
            Err(ProviderError::NoData) => {
                warn!(
                    event = "slo_evaluated",
                    workload = %workload,
                    "No latency data, treating SLO as met"
                );
                return SloStatus {
                    latency_millis: None,
                    violated: false,
                };
            }
            Err(e) => {
                warn!(
                    event = "slo_evaluated",
                    workload = %workload,
                    error = %e,
                    "Failed to read latency, treating SLO as met"
                );
                return SloStatus {
                    latency_millis: None,
                    violated: false,
                };
            }
        };

        let distance = latency / self.latency_threshold_millis as f64;
        let violated = distance > 1.0;

        debug!(
            event = "slo_evaluated",
            workload = %workload,
            latency_ms = latency,
            threshold_ms = self.latency_threshold_millis,
            violated = violated,
            "Evaluated latency SLO"
        );

        SloStatus {
            latency_millis: Some(latency),
            violated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockCluster, MockProvider, MockWorkload};

    fn evaluator(latency: Option<f64>) -> SloEvaluator {
        let mut workload = MockWorkload::new("default", "testapp");
        workload.latency_millis = latency;
        let provider = Arc::new(MockProvider::new(MockCluster::new().workload(workload)));
        SloEvaluator::new(provider, 100)
    }

    fn workload() -> WorkloadRef {
        WorkloadRef::new("default", "testapp")
    }

    #[tokio::test]
    async fn test_latency_above_threshold_violates() {
        assert!(evaluator(Some(150.0)).is_violated(&workload()).await);
    }

    #[tokio::test]
    async fn test_latency_at_threshold_does_not_violate() {
        assert!(!evaluator(Some(100.0)).is_violated(&workload()).await);
        assert!(!evaluator(Some(95.0)).is_violated(&workload()).await);
    }

    #[tokio::test]
    async fn test_no_data_fails_open() {
        let status = evaluator(None).evaluate(&workload()).await;
        assert!(!status.violated);
        assert!(status.latency_millis.is_none());
    }

    #[tokio::test]
    async fn test_read_failure_fails_open() {
        let status = evaluator(Some(500.0))
            .evaluate(&WorkloadRef::new("default", "unknown"))
            .await;
        assert!(!status.violated);
    }
}
