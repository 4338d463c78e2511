//! Live provider backed by the Kubernetes API
//!
//! Managed workloads are Deployments carrying the scope label. Pod and node
//! usage comes from the `metrics.k8s.io/v1beta1` API served by
//! metrics-server; latency is delegated to a [`LatencySource`].

use super::{async_trait, ContainerSelector, LatencySource, MetricsProvider};
use super::quantity::parse_cpu_millis;
use crate::error::{ProviderError, ProviderResult};
use crate::models::{PodSnapshot, WorkloadRef};
use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch,
    PatchParams,
};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_SCOPE_LABEL: &str = "podoscaler.io/managed=true";
pub const TARGET_CONTAINER_ANNOTATION: &str = "podoscaler.io/target-container";

const MIN_SCALE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_SCALE_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for [`KubeProvider`]
#[derive(Debug, Clone)]
pub struct KubeProviderConfig {
    /// Restrict to one namespace, all namespaces when `None`
    pub namespace: Option<String>,
    /// Label selector that opts a Deployment in
    pub scope_label: String,
    pub sidecar_containers: Vec<String>,
    /// Upper bound on replica convergence, clamped to 5-30s
    pub scale_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for KubeProviderConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            scope_label: DEFAULT_SCOPE_LABEL.to_string(),
            sidecar_containers: super::DEFAULT_SIDECAR_CONTAINERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            scale_timeout: MAX_SCALE_TIMEOUT,
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl KubeProviderConfig {
    /// Clamp `scale_timeout` into 5-30s
    pub fn normalized(mut self) -> Self {
        self.scale_timeout = self
            .scale_timeout
            .clamp(MIN_SCALE_TIMEOUT, MAX_SCALE_TIMEOUT);
        self
    }
}

pub struct KubeProvider {
    client: Client,
    config: KubeProviderConfig,
    selector: ContainerSelector,
    latency: Arc<dyn LatencySource>,
    pod_metrics: ApiResource,
    node_metrics: ApiResource,
}

impl KubeProvider {
    pub fn new(
        client: Client,
        config: KubeProviderConfig,
        latency: Arc<dyn LatencySource>,
    ) -> Self {
        let config = config.normalized();
        let selector = ContainerSelector::new(config.sidecar_containers.iter().cloned());

        Self {
            client,
            config,
            selector,
            latency,
            pod_metrics: metrics_resource("PodMetrics", "pods"),
            node_metrics: metrics_resource("NodeMetrics", "nodes"),
        }
    }

    /// Build a provider from an explicit kubeconfig file, or from the
    /// ambient kubeconfig / in-cluster config when `kubeconfig` is `None`
    pub async fn connect(
        config: KubeProviderConfig,
        latency: Arc<dyn LatencySource>,
        kubeconfig: Option<&Path>,
    ) -> Result<Self> {
        let client = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
                let client_config =
                    kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .context("Failed to load kubeconfig")?;
                Client::try_from(client_config).context("Failed to create Kubernetes client")?
            }
            None => Client::try_default()
                .await
                .context("Failed to create Kubernetes client")?,
        };
        Ok(Self::new(client, config, latency))
    }

    pub fn config(&self) -> &KubeProviderConfig {
        &self.config
    }

    fn deployments(&self) -> Api<Deployment> {
        match &self.config.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    /// Ready pods of a Deployment, in API order
    async fn ready_pods(&self, namespace: &str, workload: &str) -> ProviderResult<Vec<Pod>> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployment = deployments
            .get(workload)
            .await
            .map_err(ProviderError::transient)?;

        let match_labels = deployment
            .spec
            .as_ref()
            .and_then(|s| s.selector.match_labels.as_ref())
            .ok_or_else(|| {
                ProviderError::Transient(format!("{namespace}/{workload} has no label selector"))
            })?;

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&label_selector(match_labels));
        let list = pods.list(&params).await.map_err(ProviderError::transient)?;

        Ok(list.items.into_iter().filter(is_pod_ready).collect())
    }

    /// Sum of CPU requests of non-terminal pods scheduled on a node
    async fn requested_on_node(&self, node: &str) -> ProviderResult<u64> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!(
            "spec.nodeName={node},status.phase!=Succeeded,status.phase!=Failed"
        ));
        let list = pods.list(&params).await.map_err(ProviderError::transient)?;

        let mut total = 0u64;
        for pod in &list.items {
            let containers = pod.spec.as_ref().map(|s| s.containers.as_slice());
            for container in containers.unwrap_or_default() {
                total += container_cpu_request(container)?;
            }
        }
        Ok(total)
    }

    async fn wait_for_deletion(&self, pods: &Api<Pod>, name: &str) -> ProviderResult<()> {
        let deadline = Instant::now() + self.config.scale_timeout;
        loop {
            match pods.get_opt(name).await.map_err(ProviderError::transient)? {
                None => return Ok(()),
                Some(_) if Instant::now() >= deadline => {
                    warn!(pod = name, "Pod still terminating after wait bound");
                    return Ok(());
                }
                Some(_) => tokio::time::sleep(self.config.poll_interval).await,
            }
        }
    }
}

fn metrics_resource(kind: &str, plural: &str) -> ApiResource {
    let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", kind);
    ApiResource::from_gvk_with_plural(&gvk, plural)
}

fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Running, `Ready=True`, and not being deleted
fn is_pod_ready(pod: &Pod) -> bool {
    if pod.metadata.deletion_timestamp.is_some() {
        return false;
    }
    let Some(status) = &pod.status else {
        return false;
    };
    if status.phase.as_deref() != Some("Running") {
        return false;
    }
    status
        .conditions
        .as_ref()
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

fn cpu_of(resources: Option<&BTreeMap<String, Quantity>>) -> ProviderResult<Option<u64>> {
    match resources.and_then(|r| r.get("cpu")) {
        Some(q) => parse_cpu_millis(&q.0).map(Some),
        None => Ok(None),
    }
}

fn container_cpu_request(container: &Container) -> ProviderResult<u64> {
    let requests = container
        .resources
        .as_ref()
        .and_then(|r| r.requests.as_ref());
    Ok(cpu_of(requests)?.unwrap_or(0))
}

/// CPU usage of one container from a PodMetrics object
fn container_usage(metrics: &Value, container: &str) -> ProviderResult<u64> {
    let usage = metrics["containers"]
        .as_array()
        .and_then(|cs| cs.iter().find(|c| c["name"] == container))
        .and_then(|c| c["usage"]["cpu"].as_str())
        .ok_or_else(|| ProviderError::Transient(format!("no usage for container {container}")))?;
    parse_cpu_millis(usage)
}

#[async_trait]
impl MetricsProvider for KubeProvider {
    async fn list_nodes(&self) -> ProviderResult<Vec<String>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes
            .list(&ListParams::default())
            .await
            .map_err(ProviderError::transient)?;

        Ok(list
            .items
            .into_iter()
            .filter(|n| !n.spec.as_ref().and_then(|s| s.unschedulable).unwrap_or(false))
            .filter_map(|n| n.metadata.name)
            .collect())
    }

    async fn list_managed_workloads(&self) -> ProviderResult<Vec<WorkloadRef>> {
        let params = ListParams::default().labels(&self.config.scope_label);
        let list = self
            .deployments()
            .list(&params)
            .await
            .map_err(ProviderError::transient)?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|d| {
                let target = d
                    .metadata
                    .annotations
                    .as_ref()
                    .and_then(|a| a.get(TARGET_CONTAINER_ANNOTATION))
                    .cloned();
                let reference = WorkloadRef::new(d.metadata.namespace?, d.metadata.name?);
                Some(match target {
                    Some(container) => reference.with_target_container(container),
                    None => reference,
                })
            })
            .collect())
    }

    async fn list_ready_pods(&self, workload: &WorkloadRef) -> ProviderResult<Vec<PodSnapshot>> {
        let pods = self.ready_pods(&workload.namespace, &workload.name).await?;
        let mut snapshots = Vec::with_capacity(pods.len());

        for pod in pods {
            let (Some(name), Some(spec)) = (pod.metadata.name, pod.spec) else {
                continue;
            };
            let Some(container) = self
                .selector
                .select(&spec.containers, workload.target_container.as_deref())
            else {
                warn!(pod = %name, workload = %workload, "No target container found, skipping pod");
                continue;
            };

            snapshots.push(PodSnapshot::new(
                name,
                spec.node_name.clone().unwrap_or_default(),
                container.name.clone(),
                container_cpu_request(container)?,
            ));
        }

        Ok(snapshots)
    }

    async fn utilization_and_allocation(
        &self,
        workload: &WorkloadRef,
        pods: &[PodSnapshot],
    ) -> ProviderResult<(u64, u64)> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &workload.namespace, &self.pod_metrics);

        let mut utilization = 0u64;
        for pod in pods {
            let metrics = api.get(&pod.name).await.map_err(ProviderError::transient)?;
            utilization += container_usage(&metrics.data, &pod.container_name)?;
        }
        let allocation = pods.iter().map(|p| p.cpu_request_millis).sum();

        Ok((utilization, allocation))
    }

    async fn node_usage(&self, node: &str) -> ProviderResult<u64> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &self.node_metrics);
        let metrics = api.get(node).await.map_err(ProviderError::transient)?;
        let usage = metrics.data["usage"]["cpu"]
            .as_str()
            .ok_or_else(|| ProviderError::Transient(format!("no cpu usage for node {node}")))?;
        parse_cpu_millis(usage)
    }

    async fn node_allocatable_and_capacity(&self, node: &str) -> ProviderResult<(u64, u64)> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let object = nodes.get(node).await.map_err(ProviderError::transient)?;
        let status = object
            .status
            .ok_or_else(|| ProviderError::Transient(format!("node {node} has no status")))?;

        let capacity = cpu_of(status.capacity.as_ref())?.unwrap_or(0);
        let allocatable = cpu_of(status.allocatable.as_ref())?.unwrap_or(capacity);
        let requested = self.requested_on_node(node).await?;

        Ok((allocatable.saturating_sub(requested), capacity))
    }

    async fn latency_percentile(&self, workload: &WorkloadRef) -> ProviderResult<f64> {
        self.latency.p99_millis(workload).await
    }

    async fn set_replica_count(
        &self,
        namespace: &str,
        workload: &str,
        replicas: u32,
    ) -> ProviderResult<()> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "spec": { "replicas": replicas } });
        deployments
            .patch_scale(workload, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(ProviderError::rejected)?;

        let deadline = Instant::now() + self.config.scale_timeout;
        loop {
            let ready = self.ready_pods(namespace, workload).await?.len() as u32;
            if ready == replicas {
                debug!(namespace, workload, replicas, "Replica count converged");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ProviderError::ScaleTimeout {
                    workload: format!("{namespace}/{workload}"),
                    wanted: replicas,
                    ready,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn set_cpu_request(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        millis: u64,
    ) -> ProviderResult<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({
            "spec": {
                "containers": [{
                    "name": container,
                    "resources": { "requests": { "cpu": format!("{millis}m") } }
                }]
            }
        });
        pods.patch_subresource("resize", pod, &PatchParams::default(), &Patch::Strategic(&patch))
            .await
            .map_err(ProviderError::rejected)?;
        Ok(())
    }

    async fn delete_pod(&self, namespace: &str, pod: &str) -> ProviderResult<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        pods.delete(pod, &DeleteParams::default())
            .await
            .map_err(ProviderError::rejected)?;
        self.wait_for_deletion(&pods, pod).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PodCondition, PodStatus, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn pod(phase: &str, ready: &str) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: ready.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_pod_readiness() {
        assert!(is_pod_ready(&pod("Running", "True")));
        assert!(!is_pod_ready(&pod("Running", "False")));
        assert!(!is_pod_ready(&pod("Pending", "True")));
        assert!(!is_pod_ready(&Pod::default()));

        let mut terminating = pod("Running", "True");
        terminating.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        assert!(!is_pod_ready(&terminating));
    }

    #[test]
    fn test_label_selector_from_match_labels() {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "web".to_string());
        labels.insert("tier".to_string(), "frontend".to_string());

        assert_eq!(label_selector(&labels), "app=web,tier=frontend");
    }

    #[test]
    fn test_container_cpu_request() {
        let mut requests = BTreeMap::new();
        requests.insert("cpu".to_string(), Quantity("250m".to_string()));
        let container = Container {
            name: "app".to_string(),
            resources: Some(ResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(container_cpu_request(&container).unwrap(), 250);
        assert_eq!(container_cpu_request(&Container::default()).unwrap(), 0);
    }

    #[test]
    fn test_container_usage_from_pod_metrics() {
        let metrics = json!({
            "containers": [
                { "name": "linkerd-proxy", "usage": { "cpu": "2m", "memory": "10Mi" } },
                { "name": "app", "usage": { "cpu": "123456789n", "memory": "64Mi" } }
            ]
        });

        assert_eq!(container_usage(&metrics, "app").unwrap(), 124);
        assert!(container_usage(&metrics, "missing").is_err());
    }

    #[test]
    fn test_scale_timeout_normalized_into_bounds() {
        let long = KubeProviderConfig {
            scale_timeout: Duration::from_secs(120),
            ..Default::default()
        };
        let short = KubeProviderConfig {
            scale_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let within = KubeProviderConfig {
            scale_timeout: Duration::from_secs(12),
            ..Default::default()
        };

        assert_eq!(long.normalized().scale_timeout, Duration::from_secs(30));
        assert_eq!(short.normalized().scale_timeout, Duration::from_secs(5));
        assert_eq!(within.normalized().scale_timeout, Duration::from_secs(12));
        assert_eq!(KubeProviderConfig::default().scope_label, DEFAULT_SCOPE_LABEL);
    }
}
