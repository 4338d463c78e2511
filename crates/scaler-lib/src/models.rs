//! Core data models for the autoscaler
//!
//! All CPU quantities are integer millicores. Snapshots are built fresh for
//! the scope that reads them and never outlive a round.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A managed workload as listed by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub name: String,
    pub namespace: String,
    /// Explicit scaling target container, overrides sidecar detection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_container: Option<String>,
}

impl WorkloadRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            target_container: None,
        }
    }

    pub fn with_target_container(mut self, container: impl Into<String>) -> Self {
        self.target_container = Some(container.into());
        self
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Point-in-time CPU state of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    /// Total schedulable CPU
    pub capacity_millis: u64,
    /// CPU still free to schedule
    pub allocatable_millis: u64,
    /// Measured instantaneous usage
    pub usage_millis: u64,
}

/// A ready pod and the container the autoscaler resizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSnapshot {
    pub name: String,
    pub node_name: String,
    pub container_name: String,
    pub cpu_request_millis: u64,
}

impl PodSnapshot {
    pub fn new(
        name: impl Into<String>,
        node_name: impl Into<String>,
        container_name: impl Into<String>,
        cpu_request_millis: u64,
    ) -> Self {
        Self {
            name: name.into(),
            node_name: node_name.into(),
            container_name: container_name.into(),
            cpu_request_millis,
        }
    }
}

/// Everything the decision engine knows about one workload for one round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSnapshot {
    pub name: String,
    pub namespace: String,
    pub pods: Vec<PodSnapshot>,
    /// Sum of measured usage across ready pods
    pub utilization_millis: u64,
    /// Sum of CPU requests across ready pods
    pub allocation_millis: u64,
}

impl WorkloadSnapshot {
    pub fn num_pods(&self) -> usize {
        self.pods.len()
    }
}

/// A cluster mutation, committed the moment it is issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    VerticalScale {
        namespace: String,
        pod: String,
        container: String,
        request_millis: u64,
    },
    ReplicaCountChange {
        namespace: String,
        workload: String,
        replicas: u32,
    },
    DeletePod {
        namespace: String,
        pod: String,
    },
}

impl Action {
    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Action::VerticalScale { .. } => "vertical_scale",
            Action::ReplicaCountChange { .. } => "replica_count_change",
            Action::DeletePod { .. } => "delete_pod",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::VerticalScale {
                namespace,
                pod,
                container,
                request_millis,
            } => write!(f, "resize {namespace}/{pod}[{container}] to {request_millis}m"),
            Action::ReplicaCountChange {
                namespace,
                workload,
                replicas,
            } => write!(f, "scale {namespace}/{workload} to {replicas} replicas"),
            Action::DeletePod { namespace, pod } => write!(f, "delete pod {namespace}/{pod}"),
        }
    }
}

/// What the decision engine concluded for a workload in one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkloadOutcome {
    /// No branch fired
    Stable,
    /// SLO violated, replicas grown and resized
    ScaledOut { replicas: u32, request_millis: u64 },
    /// SLO violated, pods resized in place (after any migrations)
    ScaledUp { request_millis: u64, migrations: usize },
    /// SLO violated but no pod sat on a congested node
    ExternalBottleneck,
    /// SLO violated but the computed request is below the current one
    HeldDuringViolation { migrations: usize },
    /// Low utilization, replicas and/or requests reduced
    ScaledDown {
        replicas: Option<u32>,
        request_millis: Option<u64>,
    },
    /// Not evaluated, e.g. no ready pods
    Skipped { reason: String },
    /// A read or mutation failed; committed actions stand
    Abandoned { reason: String },
}

impl WorkloadOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkloadOutcome::Stable => "stable",
            WorkloadOutcome::ScaledOut { .. } => "scaled_out",
            WorkloadOutcome::ScaledUp { .. } => "scaled_up",
            WorkloadOutcome::ExternalBottleneck => "external_bottleneck",
            WorkloadOutcome::HeldDuringViolation { .. } => "held_during_violation",
            WorkloadOutcome::ScaledDown { .. } => "scaled_down",
            WorkloadOutcome::Skipped { .. } => "skipped",
            WorkloadOutcome::Abandoned { .. } => "abandoned",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, WorkloadOutcome::Abandoned { .. })
    }
}

/// Result of evaluating one workload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadReport {
    pub workload: WorkloadRef,
    pub outcome: WorkloadOutcome,
    /// Whether p99 latency exceeded the threshold this round
    #[serde(default)]
    pub slo_violated: bool,
    /// Actions that were committed, in issue order
    pub actions: Vec<Action>,
}

impl WorkloadReport {
    /// Report for a workload that was never evaluated
    pub fn abandoned(workload: WorkloadRef, reason: impl Into<String>) -> Self {
        Self {
            workload,
            outcome: WorkloadOutcome::Abandoned {
                reason: reason.into(),
            },
            slo_violated: false,
            actions: Vec::new(),
        }
    }
}

/// Summary of one full round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: u64,
    pub started_at: i64,
    pub duration_ms: u64,
    pub nodes_observed: usize,
    pub nodes_skipped: usize,
    pub workloads: Vec<WorkloadReport>,
}

impl RoundSummary {
    pub fn action_count(&self) -> usize {
        self.workloads.iter().map(|w| w.actions.len()).sum()
    }

    pub fn error_count(&self) -> usize {
        self.workloads
            .iter()
            .filter(|w| w.outcome.is_error())
            .count()
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.workloads.iter().flat_map(|w| w.actions.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_display() {
        let action = Action::VerticalScale {
            namespace: "default".to_string(),
            pod: "pod1".to_string(),
            container: "app".to_string(),
            request_millis: 330,
        };
        assert_eq!(action.to_string(), "resize default/pod1[app] to 330m");
        assert_eq!(action.kind(), "vertical_scale");
    }

    #[test]
    fn test_action_serializes_tagged() {
        let action = Action::ReplicaCountChange {
            namespace: "default".to_string(),
            workload: "testapp".to_string(),
            replicas: 4,
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "replica_count_change");
        assert_eq!(json["replicas"], 4);
    }

    #[test]
    fn test_round_summary_counts() {
        let workload = WorkloadRef::new("default", "testapp");
        let summary = RoundSummary {
            round: 1,
            started_at: 0,
            duration_ms: 5,
            nodes_observed: 2,
            nodes_skipped: 0,
            workloads: vec![
                WorkloadReport {
                    workload: workload.clone(),
                    outcome: WorkloadOutcome::ScaledDown {
                        replicas: Some(2),
                        request_millis: None,
                    },
                    slo_violated: false,
                    actions: vec![Action::ReplicaCountChange {
                        namespace: "default".to_string(),
                        workload: "testapp".to_string(),
                        replicas: 2,
                    }],
                },
                WorkloadReport::abandoned(workload, "boom"),
            ],
        };

        assert_eq!(summary.action_count(), 1);
        assert_eq!(summary.error_count(), 1);
    }
}
