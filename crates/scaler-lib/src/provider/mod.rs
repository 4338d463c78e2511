//! Cluster and telemetry access
//!
//! The decision engine is written entirely against [`MetricsProvider`].
//! Two realizations exist: [`KubeProvider`] talks to the Kubernetes API and
//! a latency backend, [`MockProvider`] models the cluster as in-memory tables
//! and records every mutation.
//!
//! Every mutation is synchronous and visible to the next read call.

pub mod kubernetes;
pub mod mock;
mod promql;
mod quantity;
mod selector;

pub use kubernetes::{KubeProvider, KubeProviderConfig, DEFAULT_SCOPE_LABEL};
pub use mock::{MockCluster, MockProvider, MockWorkload};
pub use promql::{PrometheusLatency, DEFAULT_LATENCY_METRIC, DEFAULT_LATENCY_WINDOW};
pub use quantity::parse_cpu_millis;
pub use selector::{ContainerSelector, DEFAULT_SIDECAR_CONTAINERS};

use crate::error::ProviderResult;
use crate::models::{PodSnapshot, WorkloadRef};

pub use async_trait::async_trait;

/// Narrow capability interface over the cluster and its metrics
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Names of all schedulable nodes
    async fn list_nodes(&self) -> ProviderResult<Vec<String>>;

    /// Workloads opted in to autoscaling
    async fn list_managed_workloads(&self) -> ProviderResult<Vec<WorkloadRef>>;

    /// Ready pods of a workload in provider order
    async fn list_ready_pods(&self, workload: &WorkloadRef) -> ProviderResult<Vec<PodSnapshot>>;

    /// Returns `(utilization_millis, allocation_millis)` for the given pods
    async fn utilization_and_allocation(
        &self,
        workload: &WorkloadRef,
        pods: &[PodSnapshot],
    ) -> ProviderResult<(u64, u64)>;

    async fn node_usage(&self, node: &str) -> ProviderResult<u64>;

    /// Returns `(allocatable_millis, capacity_millis)`
    async fn node_allocatable_and_capacity(&self, node: &str) -> ProviderResult<(u64, u64)>;

    /// p99 latency in milliseconds, `NoData` when the backend has no samples
    async fn latency_percentile(&self, workload: &WorkloadRef) -> ProviderResult<f64>;

    /// Blocks until the ready replica count matches or a bounded wait expires
    async fn set_replica_count(
        &self,
        namespace: &str,
        workload: &str,
        replicas: u32,
    ) -> ProviderResult<()>;

    async fn set_cpu_request(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        millis: u64,
    ) -> ProviderResult<()>;

    async fn delete_pod(&self, namespace: &str, pod: &str) -> ProviderResult<()>;
}

/// Source of end-to-end latency samples
#[async_trait]
pub trait LatencySource: Send + Sync {
    async fn p99_millis(&self, workload: &WorkloadRef) -> ProviderResult<f64>;
}
