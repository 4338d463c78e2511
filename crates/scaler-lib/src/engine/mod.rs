//! Decision engine
//!
//! Turns one workload snapshot into a bounded sequence of scaling actions.
//!
//! - SLO violated: grow replicas when utilization calls for more, otherwise
//!   migrate pods off congested nodes that cannot absorb the larger request,
//!   then resize every ready pod.
//! - Low utilization: shrink replicas and requests, padded by the hysteresis
//!   margin so the next round does not immediately grow again.
//! - Otherwise: leave the workload alone.
//!
//! Every action is committed the moment it is issued. A failed mutation
//! abandons the remaining steps for the workload; earlier actions stand.

mod plan;


pub use plan::ScalingTargets;

use crate::config::ScalerConfig;
use crate::congestion::CongestionScanner;
use crate::error::{ConfigError, ProviderResult};
use crate::models::{Action, WorkloadOutcome, WorkloadRef, WorkloadReport, WorkloadSnapshot};
use crate::observability::StructuredLogger;
use crate::provider::MetricsProvider;
use crate::slo::SloEvaluator;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct DecisionEngine {
    provider: Arc<dyn MetricsProvider>,
    config: ScalerConfig,
    slo: SloEvaluator,
    scanner: CongestionScanner,
    logger: StructuredLogger,
}

impl DecisionEngine {
    /// Rejects policies that fail [`ScalerConfig::validate`]
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        config: ScalerConfig,
        logger: StructuredLogger,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let slo = SloEvaluator::new(provider.clone(), config.latency_threshold_millis);
        let scanner =
            CongestionScanner::new(provider.clone(), config.min_node_availability_threshold);

        Ok(Self {
            provider,
            config,
            slo,
            scanner,
            logger,
        })
    }

    pub fn config(&self) -> &ScalerConfig {
        &self.config
    }

    /// Evaluate one workload and issue whatever actions it needs
    pub async fn evaluate(
        &self,
        workload: &WorkloadRef,
        snapshot: &WorkloadSnapshot,
    ) -> WorkloadReport {
        if snapshot.pods.is_empty() {
            return WorkloadReport {
                workload: workload.clone(),
                outcome: WorkloadOutcome::Skipped {
                    reason: "no ready pods".to_string(),
                },
                slo_violated: false,
                actions: Vec::new(),
            };
        }

        let targets = ScalingTargets::compute(snapshot, &self.config);
        debug!(workload = %workload, ?targets, "Computed scaling targets");

        let slo_violated = self.slo.is_violated(workload).await;
        let mut actions = Vec::new();

        let decided = if slo_violated {
            self.remediate_violation(workload, snapshot, &targets, &mut actions)
                .await
        } else if targets.triggers_downscale(&self.config) {
            self.downscale(workload, &targets, &mut actions).await
        } else {
            Ok(WorkloadOutcome::Stable)
        };

        let outcome = decided.unwrap_or_else(|e| {
            warn!(
                workload = %workload,
                error = %e,
                mutation = e.is_mutation(),
                committed = actions.len(),
                "Abandoning remaining steps for workload"
            );
            WorkloadOutcome::Abandoned {
                reason: e.to_string(),
            }
        });

        WorkloadReport {
            workload: workload.clone(),
            outcome,
            slo_violated,
            actions,
        }
    }

    async fn remediate_violation(
        &self,
        workload: &WorkloadRef,
        snapshot: &WorkloadSnapshot,
        targets: &ScalingTargets,
        actions: &mut Vec<Action>,
    ) -> ProviderResult<WorkloadOutcome> {
        if targets.needs_more_replicas() {
            self.set_replicas(workload, targets.ideal_replicas, actions)
                .await?;
            self.scale_all_to(workload, targets.new_request_millis, actions)
                .await?;
            return Ok(WorkloadOutcome::ScaledOut {
                replicas: targets.ideal_replicas,
                request_millis: targets.new_request_millis,
            });
        }

        let mut saw_congestion = false;
        let mut migrations = 0;

        for pod in &snapshot.pods {
            // Re-read every time: an earlier migration may have freed this node
            let verdict = match self.scanner.scan(&pod.node_name).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(
                        workload = %workload,
                        pod = %pod.name,
                        node = %pod.node_name,
                        error = %e,
                        "Failed to read node, skipping pod"
                    );
                    continue;
                }
            };
            if !verdict.congested {
                continue;
            }
            saw_congestion = true;

            let additional = targets
                .new_request_millis
                .saturating_sub(pod.cpu_request_millis);
            if additional <= verdict.node.allocatable_millis {
                continue;
            }

            debug!(
                workload = %workload,
                pod = %pod.name,
                node = %pod.node_name,
                additional_millis = additional,
                allocatable_millis = verdict.node.allocatable_millis,
                "Migrating pod off congested node"
            );
            let target = targets.floored_replicas();
            self.set_replicas(workload, target.saturating_add(1), actions)
                .await?;
            self.issue(
                workload,
                Action::DeletePod {
                    namespace: workload.namespace.clone(),
                    pod: pod.name.clone(),
                },
                actions,
            )
            .await?;
            self.set_replicas(workload, target, actions).await?;
            migrations += 1;
        }

        if !saw_congestion {
            return Ok(WorkloadOutcome::ExternalBottleneck);
        }
        if targets.new_request_millis < targets.per_pod_alloc_millis {
            return Ok(WorkloadOutcome::HeldDuringViolation { migrations });
        }

        self.scale_all_to(workload, targets.new_request_millis, actions)
            .await?;
        Ok(WorkloadOutcome::ScaledUp {
            request_millis: targets.new_request_millis,
            migrations,
        })
    }

    async fn downscale(
        &self,
        workload: &WorkloadRef,
        targets: &ScalingTargets,
        actions: &mut Vec<Action>,
    ) -> ProviderResult<WorkloadOutcome> {
        let replicas = targets.downscale_replicas();
        if let Some(replicas) = replicas {
            self.set_replicas(workload, replicas, actions).await?;
        }

        let request = targets.downscale_request(&self.config);
        let request_millis = if request == targets.per_pod_alloc_millis {
            None
        } else {
            self.scale_all_to(workload, request, actions).await?;
            Some(request)
        };

        if replicas.is_none() && request_millis.is_none() {
            return Ok(WorkloadOutcome::Stable);
        }
        Ok(WorkloadOutcome::ScaledDown {
            replicas,
            request_millis,
        })
    }

    async fn set_replicas(
        &self,
        workload: &WorkloadRef,
        replicas: u32,
        actions: &mut Vec<Action>,
    ) -> ProviderResult<()> {
        self.issue(
            workload,
            Action::ReplicaCountChange {
                namespace: workload.namespace.clone(),
                workload: workload.name.clone(),
                replicas,
            },
            actions,
        )
        .await
    }

    /// Resize every currently ready pod, read fresh from the provider
    async fn scale_all_to(
        &self,
        workload: &WorkloadRef,
        request_millis: u64,
        actions: &mut Vec<Action>,
    ) -> ProviderResult<()> {
        let pods = self.provider.list_ready_pods(workload).await?;
        for pod in pods {
            self.issue(
                workload,
                Action::VerticalScale {
                    namespace: workload.namespace.clone(),
                    pod: pod.name,
                    container: pod.container_name,
                    request_millis,
                },
                actions,
            )
            .await?;
        }
        Ok(())
    }

    /// Commit one action through the provider and record it
    async fn issue(
        &self,
        workload: &WorkloadRef,
        action: Action,
        actions: &mut Vec<Action>,
    ) -> ProviderResult<()> {
        match &action {
            Action::VerticalScale {
                namespace,
                pod,
                container,
                request_millis,
            } => {
                self.provider
                    .set_cpu_request(namespace, pod, container, *request_millis)
                    .await?
            }
            Action::ReplicaCountChange {
                namespace,
                workload: name,
                replicas,
            } => {
                self.provider
                    .set_replica_count(namespace, name, *replicas)
                    .await?
            }
            Action::DeletePod { namespace, pod } => {
                self.provider.delete_pod(namespace, pod).await?
            }
        }

        self.logger.log_action_issued(workload, &action);
        actions.push(action);
        Ok(())
    }
}
