//! Read-only cluster sampling
//!
//! Records what the decision engine would see without acting on it: node
//! capacity, allocatable and usage, plus per-workload utilization,
//! allocation and latency.

use crate::congestion::{headroom, CongestionScanner};
use crate::error::{ProviderError, RoundAbortError};
use crate::models::{NodeSnapshot, WorkloadRef};
use crate::provider::MetricsProvider;
use crate::snapshot::SnapshotBuilder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSample {
    #[serde(flatten)]
    pub node: NodeSnapshot,
    pub headroom: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSample {
    pub workload: WorkloadRef,
    pub num_pods: usize,
    pub utilization_millis: u64,
    pub allocation_millis: u64,
    /// `None` when the latency backend had no data
    pub latency_millis: Option<f64>,
}

impl WorkloadSample {
    /// Utilization as a percentage of allocation
    pub fn utilization_percent(&self) -> Option<f64> {
        if self.allocation_millis == 0 {
            return None;
        }
        Some(self.utilization_millis as f64 / self.allocation_millis as f64 * 100.0)
    }
}

/// One observation of the whole managed cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundData {
    pub timestamp: i64,
    pub nodes: Vec<NodeSample>,
    pub workloads: Vec<WorkloadSample>,
}

pub struct Watcher {
    provider: Arc<dyn MetricsProvider>,
    scanner: CongestionScanner,
    snapshots: SnapshotBuilder,
}

impl Watcher {
    pub fn new(provider: Arc<dyn MetricsProvider>, min_node_availability_threshold: f64) -> Self {
        Self {
            scanner: CongestionScanner::new(provider.clone(), min_node_availability_threshold),
            snapshots: SnapshotBuilder::new(provider.clone()),
            provider,
        }
    }

    pub async fn sample_nodes(&self) -> Result<Vec<NodeSample>, RoundAbortError> {
        let names = self
            .provider
            .list_nodes()
            .await
            .map_err(RoundAbortError::ListNodes)?;

        let mut nodes = Vec::with_capacity(names.len());
        for name in names {
            match self.scanner.read_node(&name).await {
                Ok(node) => nodes.push(NodeSample {
                    headroom: headroom(&node),
                    node,
                }),
                Err(e) => warn!(node = %name, error = %e, "Failed to sample node"),
            }
        }
        Ok(nodes)
    }

    pub async fn sample_workloads(&self) -> Result<Vec<WorkloadSample>, RoundAbortError> {
        let workloads = self
            .provider
            .list_managed_workloads()
            .await
            .map_err(RoundAbortError::ListWorkloads)?;

        let mut samples = Vec::with_capacity(workloads.len());
        for workload in workloads {
            let snapshot = match self.snapshots.build(&workload).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(workload = %workload, error = %e, "Failed to sample workload");
                    continue;
                }
            };
            let latency_millis = match self.provider.latency_percentile(&workload).await {
                Ok(latency) => Some(latency),
                Err(ProviderError::NoData) => None,
                Err(e) => {
                    warn!(workload = %workload, error = %e, "Failed to read latency");
                    None
                }
            };

            samples.push(WorkloadSample {
                num_pods: snapshot.num_pods(),
                utilization_millis: snapshot.utilization_millis,
                allocation_millis: snapshot.allocation_millis,
                workload,
                latency_millis,
            });
        }
        Ok(samples)
    }

    pub async fn sample(&self) -> Result<RoundData, RoundAbortError> {
        Ok(RoundData {
            timestamp: chrono::Utc::now().timestamp(),
            nodes: self.sample_nodes().await?,
            workloads: self.sample_workloads().await?,
        })
    }

    /// Take `rounds` samples, `every` apart
    pub async fn record(
        &self,
        rounds: usize,
        every: Duration,
    ) -> Result<Vec<RoundData>, RoundAbortError> {
        let mut data = Vec::with_capacity(rounds);
        for i in 0..rounds {
            if i > 0 {
                tokio::time::sleep(every).await;
            }
            data.push(self.sample().await?);
            debug!(round = i + 1, of = rounds, "Recorded sample");
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockCluster, MockProvider, MockWorkload};

    fn provider() -> Arc<MockProvider> {
        Arc::new(MockProvider::new(
            MockCluster::new()
                .node("node1", 1000, 400, 540)
                .node("node2", 1000, 700, 270)
                .failing_node("node2")
                .workload(
                    MockWorkload::new("default", "testapp")
                        .pod("pod1", "node1", "app", 300)
                        .pod("pod2", "node1", "app", 300)
                        .utilization(450)
                        .latency(12.5),
                )
                .workload(
                    MockWorkload::new("default", "quiet")
                        .pod("pod3", "node1", "app", 200)
                        .utilization(20),
                ),
        ))
    }

    #[tokio::test]
    async fn test_sample_skips_unreadable_nodes() {
        let watcher = Watcher::new(provider(), 0.4);
        let data = watcher.sample().await.unwrap();

        assert_eq!(data.nodes.len(), 1);
        assert_eq!(data.nodes[0].node.name, "node1");
        assert!((data.nodes[0].headroom - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_workload_samples() {
        let watcher = Watcher::new(provider(), 0.4);
        let samples = watcher.sample_workloads().await.unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].allocation_millis, 600);
        assert_eq!(samples[0].utilization_percent(), Some(75.0));
        assert_eq!(samples[0].latency_millis, Some(12.5));
        assert_eq!(samples[1].latency_millis, None);
    }

    #[tokio::test]
    async fn test_record_takes_requested_rounds() {
        let watcher = Watcher::new(provider(), 0.4);
        let data = watcher.record(3, Duration::from_millis(1)).await.unwrap();

        assert_eq!(data.len(), 3);
        let json = serde_json::to_value(&data[0]).unwrap();
        assert_eq!(json["nodes"][0]["capacity_millis"], 1000);
    }

    #[tokio::test]
    async fn test_list_failure_is_reported() {
        let provider = Arc::new(MockProvider::new(MockCluster::new().failing_workload_list()));
        let watcher = Watcher::new(provider, 0.4);

        assert!(watcher.sample().await.is_err());
    }
}
