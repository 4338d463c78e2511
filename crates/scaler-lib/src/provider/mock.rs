//! Deterministic in-memory provider
//!
//! Models nodes, pods and workload utilization as plain tables and appends
//! every successful mutation to an ordered [`Action`] log. Replica growth
//! places new pods on a configurable spill node; shrinking removes the newest
//! pods first. Requests freed by deletions return to the node's allocatable.

use super::{async_trait, MetricsProvider};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{Action, NodeSnapshot, PodSnapshot, WorkloadRef};
use tokio::sync::Mutex;

/// One workload in the mock cluster
#[derive(Debug, Clone)]
pub struct MockWorkload {
    pub reference: WorkloadRef,
    pub pods: Vec<PodSnapshot>,
    pub utilization_millis: u64,
    /// `None` makes the latency backend report no data
    pub latency_millis: Option<f64>,
    pub fail_utilization: bool,
}

impl MockWorkload {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            reference: WorkloadRef::new(namespace, name),
            pods: Vec::new(),
            utilization_millis: 0,
            latency_millis: None,
            fail_utilization: false,
        }
    }

    pub fn pod(mut self, name: &str, node: &str, container: &str, request_millis: u64) -> Self {
        self.pods
            .push(PodSnapshot::new(name, node, container, request_millis));
        self
    }

    pub fn utilization(mut self, millis: u64) -> Self {
        self.utilization_millis = millis;
        self
    }

    pub fn latency(mut self, millis: f64) -> Self {
        self.latency_millis = Some(millis);
        self
    }

    pub fn failing_utilization(mut self) -> Self {
        self.fail_utilization = true;
        self
    }

    fn allocation_millis(&self) -> u64 {
        self.pods.iter().map(|p| p.cpu_request_millis).sum()
    }
}

/// Initial state of the mock cluster
#[derive(Debug, Clone, Default)]
pub struct MockCluster {
    nodes: Vec<NodeSnapshot>,
    workloads: Vec<MockWorkload>,
    spill_node: Option<String>,
    spill_request_millis: u64,
    failing_nodes: Vec<String>,
    fail_list_nodes: bool,
    fail_list_workloads: bool,
    fail_mutation: Option<(usize, ProviderError)>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self {
            spill_request_millis: 300,
            ..Default::default()
        }
    }

    pub fn node(mut self, name: &str, capacity: u64, allocatable: u64, usage: u64) -> Self {
        self.nodes.push(NodeSnapshot {
            name: name.to_string(),
            capacity_millis: capacity,
            allocatable_millis: allocatable,
            usage_millis: usage,
        });
        self
    }

    pub fn workload(mut self, workload: MockWorkload) -> Self {
        self.workloads.push(workload);
        self
    }

    /// Node that receives new replicas, and the request they start with
    pub fn spill_to(mut self, node: &str, request_millis: u64) -> Self {
        self.spill_node = Some(node.to_string());
        self.spill_request_millis = request_millis;
        self
    }

    /// Make reads of this node's metrics fail
    pub fn failing_node(mut self, node: &str) -> Self {
        self.failing_nodes.push(node.to_string());
        self
    }

    pub fn failing_node_list(mut self) -> Self {
        self.fail_list_nodes = true;
        self
    }

    pub fn failing_workload_list(mut self) -> Self {
        self.fail_list_workloads = true;
        self
    }

    /// Fail the `nth` mutation (1-based) with `error`
    pub fn failing_mutation(mut self, nth: usize, error: ProviderError) -> Self {
        self.fail_mutation = Some((nth, error));
        self
    }
}

struct MockState {
    cluster: MockCluster,
    actions: Vec<Action>,
    mutations: usize,
}

impl MockState {
    fn node_mut(&mut self, name: &str) -> Option<&mut NodeSnapshot> {
        self.cluster.nodes.iter_mut().find(|n| n.name == name)
    }

    fn node(&self, name: &str) -> ProviderResult<&NodeSnapshot> {
        if self.cluster.failing_nodes.iter().any(|n| n == name) {
            return Err(ProviderError::Transient(format!(
                "metrics unavailable for node {name}"
            )));
        }
        self.cluster
            .nodes
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| ProviderError::Transient(format!("node {name} not found")))
    }

    fn workload_index(&self, namespace: &str, name: &str) -> ProviderResult<usize> {
        self.cluster
            .workloads
            .iter()
            .position(|w| w.reference.namespace == namespace && w.reference.name == name)
            .ok_or_else(|| ProviderError::Transient(format!("workload {namespace}/{name} not found")))
    }

    /// Count a mutation and fail it if it is the injected one
    fn begin_mutation(&mut self) -> ProviderResult<()> {
        self.mutations += 1;
        match &self.cluster.fail_mutation {
            Some((nth, error)) if *nth == self.mutations => Err(error.clone()),
            _ => Ok(()),
        }
    }

    fn release(&mut self, pod: &PodSnapshot) {
        if let Some(node) = self.node_mut(&pod.node_name) {
            node.allocatable_millis += pod.cpu_request_millis;
        }
    }

    fn next_pod_name(&self) -> String {
        let highest = self
            .cluster
            .workloads
            .iter()
            .flat_map(|w| w.pods.iter())
            .filter_map(|p| {
                let digits = p.name.trim_start_matches(|c: char| !c.is_ascii_digit());
                digits.parse::<u32>().ok()
            })
            .max()
            .unwrap_or(0);
        format!("pod{}", highest + 1)
    }
}

/// In-memory [`MetricsProvider`] for tests and dry experiments
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new(cluster: MockCluster) -> Self {
        Self {
            state: Mutex::new(MockState {
                cluster,
                actions: Vec::new(),
                mutations: 0,
            }),
        }
    }

    /// Every committed mutation, in order
    pub async fn actions(&self) -> Vec<Action> {
        self.state.lock().await.actions.clone()
    }

    /// Current pods of a workload
    pub async fn pods(&self, namespace: &str, name: &str) -> Vec<PodSnapshot> {
        let state = self.state.lock().await;
        state
            .workload_index(namespace, name)
            .map(|idx| state.cluster.workloads[idx].pods.clone())
            .unwrap_or_default()
    }

    pub async fn node(&self, name: &str) -> Option<NodeSnapshot> {
        let state = self.state.lock().await;
        state.cluster.nodes.iter().find(|n| n.name == name).cloned()
    }

    /// Change a workload's latency between rounds
    pub async fn set_latency(&self, namespace: &str, name: &str, millis: Option<f64>) {
        let mut state = self.state.lock().await;
        if let Ok(idx) = state.workload_index(namespace, name) {
            state.cluster.workloads[idx].latency_millis = millis;
        }
    }
}

#[async_trait]
impl MetricsProvider for MockProvider {
    async fn list_nodes(&self) -> ProviderResult<Vec<String>> {
        let state = self.state.lock().await;
        if state.cluster.fail_list_nodes {
            return Err(ProviderError::Transient("node list unavailable".to_string()));
        }
        Ok(state.cluster.nodes.iter().map(|n| n.name.clone()).collect())
    }

    async fn list_managed_workloads(&self) -> ProviderResult<Vec<WorkloadRef>> {
        let state = self.state.lock().await;
        if state.cluster.fail_list_workloads {
            return Err(ProviderError::Transient(
                "workload list unavailable".to_string(),
            ));
        }
        Ok(state
            .cluster
            .workloads
            .iter()
            .map(|w| w.reference.clone())
            .collect())
    }

    async fn list_ready_pods(&self, workload: &WorkloadRef) -> ProviderResult<Vec<PodSnapshot>> {
        let state = self.state.lock().await;
        let idx = state.workload_index(&workload.namespace, &workload.name)?;
        Ok(state.cluster.workloads[idx].pods.clone())
    }

    async fn utilization_and_allocation(
        &self,
        workload: &WorkloadRef,
        _pods: &[PodSnapshot],
    ) -> ProviderResult<(u64, u64)> {
        let state = self.state.lock().await;
        let idx = state.workload_index(&workload.namespace, &workload.name)?;
        let entry = &state.cluster.workloads[idx];
        if entry.fail_utilization {
            return Err(ProviderError::Transient(format!(
                "pod metrics unavailable for {workload}"
            )));
        }
        Ok((entry.utilization_millis, entry.allocation_millis()))
    }

    async fn node_usage(&self, node: &str) -> ProviderResult<u64> {
        let state = self.state.lock().await;
        Ok(state.node(node)?.usage_millis)
    }

    async fn node_allocatable_and_capacity(&self, node: &str) -> ProviderResult<(u64, u64)> {
        let state = self.state.lock().await;
        let node = state.node(node)?;
        Ok((node.allocatable_millis, node.capacity_millis))
    }

    async fn latency_percentile(&self, workload: &WorkloadRef) -> ProviderResult<f64> {
        let state = self.state.lock().await;
        let idx = state.workload_index(&workload.namespace, &workload.name)?;
        state.cluster.workloads[idx]
            .latency_millis
            .ok_or(ProviderError::NoData)
    }

    async fn set_replica_count(
        &self,
        namespace: &str,
        workload: &str,
        replicas: u32,
    ) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.begin_mutation()?;
        let idx = state
            .workload_index(namespace, workload)
            .map_err(ProviderError::rejected)?;

        let wanted = replicas as usize;
        let current = state.cluster.workloads[idx].pods.len();

        if wanted > current {
            let spill = state
                .cluster
                .spill_node
                .clone()
                .ok_or_else(|| ProviderError::ScaleTimeout {
                    workload: format!("{namespace}/{workload}"),
                    wanted: replicas,
                    ready: current as u32,
                })?;
            let request = state.cluster.spill_request_millis;
            let container = state.cluster.workloads[idx]
                .pods
                .first()
                .map(|p| p.container_name.clone())
                .unwrap_or_else(|| "app".to_string());

            for _ in current..wanted {
                let name = state.next_pod_name();
                if let Some(node) = state.node_mut(&spill) {
                    node.allocatable_millis = node.allocatable_millis.saturating_sub(request);
                }
                state.cluster.workloads[idx]
                    .pods
                    .push(PodSnapshot::new(name, spill.clone(), container.clone(), request));
            }
        } else {
            while state.cluster.workloads[idx].pods.len() > wanted {
                let popped = state.cluster.workloads[idx].pods.pop();
                match popped {
                    Some(pod) => state.release(&pod),
                    None => break,
                }
            }
        }

        state.actions.push(Action::ReplicaCountChange {
            namespace: namespace.to_string(),
            workload: workload.to_string(),
            replicas,
        });
        Ok(())
    }

    async fn set_cpu_request(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        millis: u64,
    ) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.begin_mutation()?;

        let target = state
            .cluster
            .workloads
            .iter_mut()
            .filter(|w| w.reference.namespace == namespace)
            .flat_map(|w| w.pods.iter_mut())
            .find(|p| p.name == pod)
            .ok_or_else(|| ProviderError::Rejected(format!("pod {namespace}/{pod} not found")))?;

        if target.container_name != container {
            return Err(ProviderError::Rejected(format!(
                "pod {pod} has no container {container}"
            )));
        }

        let previous = target.cpu_request_millis;
        let node_name = target.node_name.clone();
        target.cpu_request_millis = millis;

        if let Some(node) = state.node_mut(&node_name) {
            node.allocatable_millis = (node.allocatable_millis + previous).saturating_sub(millis);
        }

        state.actions.push(Action::VerticalScale {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            container: container.to_string(),
            request_millis: millis,
        });
        Ok(())
    }

    async fn delete_pod(&self, namespace: &str, pod: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.begin_mutation()?;

        let mut removed = None;
        for workload in state
            .cluster
            .workloads
            .iter_mut()
            .filter(|w| w.reference.namespace == namespace)
        {
            if let Some(pos) = workload.pods.iter().position(|p| p.name == pod) {
                removed = Some(workload.pods.remove(pos));
                break;
            }
        }

        let removed =
            removed.ok_or_else(|| ProviderError::Rejected(format!("pod {namespace}/{pod} not found")))?;
        state.release(&removed);

        state.actions.push(Action::DeletePod {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> MockCluster {
        MockCluster::new()
            .node("node1", 1000, 400, 540)
            .node("node2", 1000, 700, 270)
            .spill_to("node2", 300)
            .workload(
                MockWorkload::new("default", "testapp")
                    .pod("pod1", "node1", "container", 300)
                    .pod("pod2", "node1", "container", 300)
                    .pod("pod3", "node2", "container", 300)
                    .utilization(810)
                    .latency(95.0),
            )
    }

    fn workload() -> WorkloadRef {
        WorkloadRef::new("default", "testapp")
    }

    #[tokio::test]
    async fn test_growth_lands_on_spill_node() {
        let provider = MockProvider::new(cluster());

        provider.set_replica_count("default", "testapp", 4).await.unwrap();

        let pods = provider.pods("default", "testapp").await;
        assert_eq!(pods.len(), 4);
        assert_eq!(pods[3].name, "pod4");
        assert_eq!(pods[3].node_name, "node2");
        assert_eq!(provider.node("node2").await.unwrap().allocatable_millis, 400);
    }

    #[tokio::test]
    async fn test_shrink_removes_newest_and_frees_capacity() {
        let provider = MockProvider::new(cluster());

        provider.set_replica_count("default", "testapp", 2).await.unwrap();

        let pods = provider.pods("default", "testapp").await;
        let names: Vec<_> = pods.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["pod1", "pod2"]);
        assert_eq!(provider.node("node2").await.unwrap().allocatable_millis, 1000);
    }

    #[tokio::test]
    async fn test_delete_returns_request_to_node() {
        let provider = MockProvider::new(cluster());

        provider.delete_pod("default", "pod1").await.unwrap();

        assert_eq!(provider.node("node1").await.unwrap().allocatable_millis, 700);
        assert!(provider.delete_pod("default", "pod1").await.is_err());
        assert_eq!(provider.actions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_resize_checks_container_and_updates_allocation() {
        let provider = MockProvider::new(cluster());

        assert!(provider
            .set_cpu_request("default", "pod1", "sidecar", 330)
            .await
            .is_err());
        provider
            .set_cpu_request("default", "pod1", "container", 330)
            .await
            .unwrap();

        let (util, alloc) = provider
            .utilization_and_allocation(&workload(), &[])
            .await
            .unwrap();
        assert_eq!(util, 810);
        assert_eq!(alloc, 930);
        assert_eq!(provider.node("node1").await.unwrap().allocatable_millis, 370);
    }

    #[tokio::test]
    async fn test_missing_latency_is_no_data() {
        let provider = MockProvider::new(cluster());
        provider.set_latency("default", "testapp", None).await;

        let err = provider.latency_percentile(&workload()).await.unwrap_err();
        assert_eq!(err, ProviderError::NoData);
    }

    #[tokio::test]
    async fn test_injected_mutation_failure() {
        let provider = MockProvider::new(
            cluster().failing_mutation(2, ProviderError::rejected("resize forbidden")),
        );

        provider
            .set_cpu_request("default", "pod1", "container", 330)
            .await
            .unwrap();
        let err = provider
            .set_cpu_request("default", "pod2", "container", 330)
            .await
            .unwrap_err();

        assert!(err.is_mutation());
        assert_eq!(provider.actions().await.len(), 1);
    }
}
