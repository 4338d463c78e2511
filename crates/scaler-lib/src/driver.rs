//! Round driver
//!
//! Runs one decision round at a time: log every node's state, list the
//! managed workloads, then build a snapshot and run the decision engine for
//! each workload in provider order. Rounds never overlap.

use crate::config::ScalerConfig;
use crate::congestion::{headroom, CongestionScanner};
use crate::engine::DecisionEngine;
use crate::error::RoundAbortError;
use crate::health::RoundHealth;
use crate::models::{RoundSummary, WorkloadReport};
use crate::observability::{ScalerMetrics, StructuredLogger};
use crate::provider::MetricsProvider;
use crate::snapshot::SnapshotBuilder;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

pub struct RoundDriver {
    provider: Arc<dyn MetricsProvider>,
    engine: DecisionEngine,
    snapshots: SnapshotBuilder,
    scanner: CongestionScanner,
    metrics: Option<ScalerMetrics>,
    health: Option<RoundHealth>,
    logger: StructuredLogger,
    round: u64,
}

impl RoundDriver {
    /// Run exactly one round
    pub async fn run_round(&mut self) -> Result<RoundSummary, RoundAbortError> {
        self.round += 1;
        let round = self.round;
        let started_at = chrono::Utc::now().timestamp();
        let start = Instant::now();
        self.logger.log_round_started(round);

        let nodes = self
            .provider
            .list_nodes()
            .await
            .map_err(RoundAbortError::ListNodes)?;

        let mut nodes_skipped = 0;
        for node in &nodes {
            match self.scanner.read_node(node).await {
                Ok(snapshot) => self
                    .logger
                    .log_node_observed(&snapshot, headroom(&snapshot)),
                Err(e) => {
                    nodes_skipped += 1;
                    self.logger.log_node_skipped(node, &e);
                }
            }
        }

        let workloads = self
            .provider
            .list_managed_workloads()
            .await
            .map_err(RoundAbortError::ListWorkloads)?;

        let mut reports = Vec::with_capacity(workloads.len());
        for workload in workloads {
            let report = match self.snapshots.build(&workload).await {
                Ok(snapshot) => self.engine.evaluate(&workload, &snapshot).await,
                Err(e) => WorkloadReport::abandoned(workload, e.to_string()),
            };
            self.logger.log_workload_outcome(&report);
            reports.push(report);
        }

        let summary = RoundSummary {
            round,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            nodes_observed: nodes.len() - nodes_skipped,
            nodes_skipped,
            workloads: reports,
        };

        self.logger.log_round_completed(&summary);
        if let Some(metrics) = &self.metrics {
            metrics.record_round(&summary);
        }
        if let Some(health) = &self.health {
            health.record_completed(&summary).await;
        }

        Ok(summary)
    }

    /// Run rounds on a fixed interval until shutdown
    pub async fn run(mut self, poll_interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = poll_interval.as_secs(),
            "Starting round loop"
        );

        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_round().await {
                        self.record_abort(&e).await;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down round loop");
                    break;
                }
            }
        }
    }

    async fn record_abort(&self, error: &RoundAbortError) {
        self.logger.log_round_aborted(self.round, error);
        if let Some(metrics) = &self.metrics {
            metrics.inc_rounds_aborted();
        }
        if let Some(health) = &self.health {
            health.record_aborted(error.to_string()).await;
        }
    }

    pub fn rounds_started(&self) -> u64 {
        self.round
    }
}

/// Builder for [`RoundDriver`]
pub struct RoundDriverBuilder {
    provider: Option<Arc<dyn MetricsProvider>>,
    config: ScalerConfig,
    metrics: Option<ScalerMetrics>,
    health: Option<RoundHealth>,
    logger: Option<StructuredLogger>,
}

impl RoundDriverBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            config: ScalerConfig::default(),
            metrics: None,
            health: None,
            logger: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn MetricsProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(mut self, config: ScalerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn metrics(mut self, metrics: ScalerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn health(mut self, health: RoundHealth) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Validate the policy and build the driver
    pub fn build(self) -> Result<RoundDriver> {
        let provider = self
            .provider
            .ok_or_else(|| anyhow::anyhow!("Provider is required"))?;

        let logger = self
            .logger
            .unwrap_or_else(|| StructuredLogger::new("podoscaler"));
        let engine = DecisionEngine::new(provider.clone(), self.config.clone(), logger.clone())?;
        if self.metrics.is_none() {
            debug!("Round driver built without metrics");
        }

        Ok(RoundDriver {
            engine,
            snapshots: SnapshotBuilder::new(provider.clone()),
            scanner: CongestionScanner::new(
                provider.clone(),
                self.config.min_node_availability_threshold,
            ),
            provider,
            metrics: self.metrics,
            health: self.health,
            logger,
            round: 0,
        })
    }
}

impl Default for RoundDriverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, WorkloadOutcome};
    use crate::provider::{MockCluster, MockProvider, MockWorkload};

    fn cluster() -> MockCluster {
        MockCluster::new()
            .node("node1", 2000, 1400, 300)
            .node("node2", 2000, 1700, 300)
            .spill_to("node2", 300)
            .workload(
                MockWorkload::new("default", "frontend")
                    .pod("pod1", "node1", "app", 300)
                    .pod("pod2", "node2", "app", 300)
                    .utilization(540)
                    .latency(20.0),
            )
            .workload(
                MockWorkload::new("default", "backend")
                    .pod("pod3", "node1", "app", 300)
                    .pod("pod4", "node2", "app", 300)
                    .utilization(1200)
                    .latency(80.0),
            )
    }

    fn driver(provider: Arc<MockProvider>) -> RoundDriver {
        RoundDriverBuilder::new()
            .provider(provider)
            .config(ScalerConfig {
                latency_threshold_millis: 40,
                ..Default::default()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_provider() {
        assert!(RoundDriverBuilder::new().build().is_err());
    }

    #[test]
    fn test_builder_rejects_invalid_policy() {
        let provider = Arc::new(MockProvider::new(MockCluster::new()));
        let result = RoundDriverBuilder::new()
            .provider(provider)
            .config(ScalerConfig {
                downscale_utilization_threshold: 1.5,
                ..Default::default()
            })
            .build();

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_round_visits_workloads_in_order() {
        let provider = Arc::new(MockProvider::new(cluster()));
        let mut driver = driver(provider.clone());

        let summary = driver.run_round().await.unwrap();

        assert_eq!(summary.round, 1);
        assert_eq!(summary.nodes_observed, 2);
        assert_eq!(summary.workloads.len(), 2);
        assert_eq!(summary.workloads[0].workload.name, "frontend");
        assert_eq!(summary.workloads[0].outcome, WorkloadOutcome::Stable);

        // backend: 1200m over 2 pods with p99 at 2x the threshold
        let backend = &summary.workloads[1];
        assert!(backend.slo_violated);
        assert_eq!(
            backend.outcome,
            WorkloadOutcome::ScaledOut {
                replicas: 3,
                request_millis: 400
            }
        );
        assert_eq!(summary.action_count(), provider.actions().await.len());
    }

    #[tokio::test]
    async fn test_failed_node_list_aborts_round() {
        let provider = Arc::new(MockProvider::new(cluster().failing_node_list()));
        let mut driver = driver(provider.clone());

        let err = driver.run_round().await.unwrap_err();

        assert!(matches!(err, RoundAbortError::ListNodes(_)));
        assert!(provider.actions().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_workload_list_aborts_round() {
        let provider = Arc::new(MockProvider::new(cluster().failing_workload_list()));
        let mut driver = driver(provider);

        assert!(matches!(
            driver.run_round().await,
            Err(RoundAbortError::ListWorkloads(_))
        ));
    }

    #[tokio::test]
    async fn test_unreadable_node_is_skipped() {
        let provider = Arc::new(MockProvider::new(cluster().failing_node("node2")));
        let mut driver = driver(provider);

        let summary = driver.run_round().await.unwrap();

        assert_eq!(summary.nodes_observed, 1);
        assert_eq!(summary.nodes_skipped, 1);
    }

    #[tokio::test]
    async fn test_snapshot_failure_abandons_only_that_workload() {
        let cluster = MockCluster::new()
            .node("node1", 2000, 1400, 300)
            .workload(
                MockWorkload::new("default", "broken")
                    .pod("pod1", "node1", "app", 300)
                    .failing_utilization(),
            )
            .workload(
                MockWorkload::new("default", "idle")
                    .pod("pod2", "node1", "app", 300)
                    .pod("pod3", "node1", "app", 300)
                    .utilization(60)
                    .latency(5.0),
            );
        let provider = Arc::new(MockProvider::new(cluster));
        let mut driver = driver(provider.clone());

        let summary = driver.run_round().await.unwrap();

        assert_eq!(summary.error_count(), 1);
        assert!(summary.workloads[0].outcome.is_error());
        assert_eq!(
            summary.workloads[1].actions.first(),
            Some(&Action::ReplicaCountChange {
                namespace: "default".to_string(),
                workload: "idle".to_string(),
                replicas: 1,
            })
        );
    }

    #[tokio::test]
    async fn test_health_tracks_rounds() {
        let provider = Arc::new(MockProvider::new(cluster()));
        let health = RoundHealth::new(Duration::from_secs(60));
        let mut driver = RoundDriverBuilder::new()
            .provider(provider)
            .health(health.clone())
            .build()
            .unwrap();

        assert!(!health.readiness().await.ready);
        driver.run_round().await.unwrap();
        assert!(health.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let provider = Arc::new(MockProvider::new(cluster()));
        let driver = driver(provider);
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(driver.run(Duration::from_millis(10), rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
