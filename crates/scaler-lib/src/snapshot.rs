//! Per-workload snapshot assembly

use crate::error::ProviderResult;
use crate::models::{WorkloadRef, WorkloadSnapshot};
use crate::provider::MetricsProvider;
use std::sync::Arc;
use tracing::debug;

/// Builds the facts the decision engine needs for one workload
#[derive(Clone)]
pub struct SnapshotBuilder {
    provider: Arc<dyn MetricsProvider>,
}

impl SnapshotBuilder {
    pub fn new(provider: Arc<dyn MetricsProvider>) -> Self {
        Self { provider }
    }

    /// Read ready pods, then utilization and allocation over those pods
    pub async fn build(&self, workload: &WorkloadRef) -> ProviderResult<WorkloadSnapshot> {
        let pods = self.provider.list_ready_pods(workload).await?;
        let (utilization_millis, allocation_millis) = self
            .provider
            .utilization_and_allocation(workload, &pods)
            .await?;

        debug!(
            workload = %workload,
            pods = pods.len(),
            utilization_millis = utilization_millis,
            allocation_millis = allocation_millis,
            "Built workload snapshot"
        );

        Ok(WorkloadSnapshot {
            name: workload.name.clone(),
            namespace: workload.namespace.clone(),
            pods,
            utilization_millis,
            allocation_millis,
        })
    }
}
