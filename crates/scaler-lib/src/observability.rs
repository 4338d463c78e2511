//! Observability infrastructure for the autoscaler
//!
//! Provides:
//! - Prometheus metrics (round duration, rounds, actions by kind, errors)
//! - Structured JSON logging with tracing, one `event` per decision kind

use crate::error::RoundAbortError;
use crate::models::{Action, NodeSnapshot, RoundSummary, WorkloadRef, WorkloadReport};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for round duration (in seconds)
const ROUND_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ScalerMetricsInner> = OnceLock::new();

struct ScalerMetricsInner {
    round_duration_seconds: Histogram,
    rounds_total: IntCounter,
    rounds_aborted_total: IntCounter,
    actions_total: IntCounterVec,
    workload_errors_total: IntCounter,
    workloads_managed: IntGauge,
    slo_violations_total: IntCounter,
}

impl ScalerMetricsInner {
    fn new() -> Self {
        Self {
            round_duration_seconds: register_histogram!(
                "podoscaler_round_duration_seconds",
                "Wall time of one complete decision round",
                ROUND_BUCKETS.to_vec()
            )
            .expect("Failed to register round_duration_seconds"),

            rounds_total: register_int_counter!(
                "podoscaler_rounds_total",
                "Total number of completed rounds"
            )
            .expect("Failed to register rounds_total"),

            rounds_aborted_total: register_int_counter!(
                "podoscaler_rounds_aborted_total",
                "Rounds aborted because nodes or workloads could not be listed"
            )
            .expect("Failed to register rounds_aborted_total"),

            actions_total: register_int_counter_vec!(
                "podoscaler_actions_total",
                "Committed cluster mutations by kind",
                &["kind"]
            )
            .expect("Failed to register actions_total"),

            workload_errors_total: register_int_counter!(
                "podoscaler_workload_errors_total",
                "Workload evaluations abandoned after a read or mutation failure"
            )
            .expect("Failed to register workload_errors_total"),

            workloads_managed: register_int_gauge!(
                "podoscaler_workloads_managed",
                "Number of workloads opted in to autoscaling"
            )
            .expect("Failed to register workloads_managed"),

            slo_violations_total: register_int_counter!(
                "podoscaler_slo_violations_total",
                "Workload evaluations that observed a latency SLO violation"
            )
            .expect("Failed to register slo_violations_total"),
        }
    }
}

/// Autoscaler metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct ScalerMetrics {
    _private: (),
}

impl Default for ScalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScalerMetricsInner {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new)
    }

    pub fn inc_rounds_aborted(&self) {
        self.inner().rounds_aborted_total.inc();
    }

    pub fn inc_action(&self, kind: &str) {
        self.inner().actions_total.with_label_values(&[kind]).inc();
    }

    pub fn set_workloads_managed(&self, count: i64) {
        self.inner().workloads_managed.set(count);
    }

    /// Fold a completed round into the counters
    pub fn record_round(&self, summary: &RoundSummary) {
        let inner = self.inner();
        inner.rounds_total.inc();
        inner
            .round_duration_seconds
            .observe(summary.duration_ms as f64 / 1000.0);
        inner.workloads_managed.set(summary.workloads.len() as i64);

        for action in summary.actions() {
            inner.actions_total.with_label_values(&[action.kind()]).inc();
        }
        for report in &summary.workloads {
            if report.outcome.is_error() {
                inner.workload_errors_total.inc();
            }
            if report.slo_violated {
                inner.slo_violations_total.inc();
            }
        }
    }

    pub fn rounds_total(&self) -> u64 {
        self.inner().rounds_total.get()
    }

    pub fn rounds_aborted_total(&self) -> u64 {
        self.inner().rounds_aborted_total.get()
    }

    pub fn actions_total(&self, kind: &str) -> u64 {
        self.inner().actions_total.with_label_values(&[kind]).get()
    }
}

/// Structured logger for autoscaler events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, poll_interval_secs: u64, scope_label: &str) {
        info!(
            event = "scaler_started",
            instance = %self.instance,
            version = %version,
            poll_interval_secs = poll_interval_secs,
            scope_label = %scope_label,
            "Autoscaler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "scaler_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Autoscaler shutting down"
        );
    }

    pub fn log_round_started(&self, round: u64) {
        info!(
            event = "round_started",
            instance = %self.instance,
            round = round,
            "Round started"
        );
    }

    pub fn log_node_observed(&self, node: &NodeSnapshot, headroom: f64) {
        info!(
            event = "node_observed",
            instance = %self.instance,
            node = %node.name,
            usage_millis = node.usage_millis,
            allocatable_millis = node.allocatable_millis,
            capacity_millis = node.capacity_millis,
            headroom = headroom,
            "Observed node"
        );
    }

    pub fn log_node_skipped(&self, node: &str, error: &dyn std::fmt::Display) {
        warn!(
            event = "node_observed",
            instance = %self.instance,
            node = %node,
            error = %error,
            "Failed to read node, skipping"
        );
    }

    pub fn log_action_issued(&self, workload: &WorkloadRef, action: &Action) {
        info!(
            event = "action_issued",
            instance = %self.instance,
            workload = %workload,
            kind = action.kind(),
            action = %action,
            "Issued scaling action"
        );
    }

    pub fn log_workload_outcome(&self, report: &WorkloadReport) {
        if report.outcome.is_error() {
            warn!(
                event = "workload_outcome",
                instance = %self.instance,
                workload = %report.workload,
                outcome = report.outcome.kind(),
                slo_violated = report.slo_violated,
                actions = report.actions.len(),
                detail = ?report.outcome,
                "Abandoned workload for this round"
            );
        } else {
            info!(
                event = "workload_outcome",
                instance = %self.instance,
                workload = %report.workload,
                outcome = report.outcome.kind(),
                slo_violated = report.slo_violated,
                actions = report.actions.len(),
                "Evaluated workload"
            );
        }
    }

    pub fn log_round_completed(&self, summary: &RoundSummary) {
        info!(
            event = "round_completed",
            instance = %self.instance,
            round = summary.round,
            duration_ms = summary.duration_ms,
            nodes_observed = summary.nodes_observed,
            nodes_skipped = summary.nodes_skipped,
            workloads = summary.workloads.len(),
            actions = summary.action_count(),
            errors = summary.error_count(),
            "Round completed"
        );
    }

    pub fn log_round_aborted(&self, round: u64, error: &RoundAbortError) {
        warn!(
            event = "round_aborted",
            instance = %self.instance,
            round = round,
            error = %error,
            "Round aborted, retrying next tick"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkloadOutcome;

    #[test]
    fn test_record_round_counts_actions_by_kind() {
        let metrics = ScalerMetrics::new();
        let before = metrics.actions_total("delete_pod");
        let rounds_before = metrics.rounds_total();

        let summary = RoundSummary {
            round: 1,
            started_at: 0,
            duration_ms: 120,
            nodes_observed: 1,
            nodes_skipped: 0,
            workloads: vec![WorkloadReport {
                workload: WorkloadRef::new("default", "testapp"),
                outcome: WorkloadOutcome::HeldDuringViolation { migrations: 1 },
                slo_violated: true,
                actions: vec![Action::DeletePod {
                    namespace: "default".to_string(),
                    pod: "pod1".to_string(),
                }],
            }],
        };
        metrics.record_round(&summary);

        // Other tests share the global registry, so only check the delta floor
        assert!(metrics.actions_total("delete_pod") > before);
        assert!(metrics.rounds_total() > rounds_before);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("podoscaler-0");
        assert_eq!(logger.instance, "podoscaler-0");
    }
}
