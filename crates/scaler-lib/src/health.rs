//! Health check infrastructure for the autoscaler
//!
//! Liveness is derived from round progress: the process is unhealthy when no
//! round has completed within three poll intervals, degraded after an
//! aborted round, and ready once a first round has completed.

use crate::models::RoundSummary;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn at(status: ComponentStatus, message: Option<String>, now: i64) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: now,
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub rounds_completed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_round_timestamp: Option<i64>,
    pub components: HashMap<String, ComponentHealth>,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const ROUND_DRIVER: &str = "round_driver";
}

#[derive(Debug)]
struct RoundState {
    started_at: i64,
    last_completed: Option<i64>,
    rounds_completed: u64,
    last_abort: Option<String>,
}

/// Tracks round progress for liveness and readiness probes
#[derive(Debug, Clone)]
pub struct RoundHealth {
    state: Arc<RwLock<RoundState>>,
    stale_after: Duration,
}

impl RoundHealth {
    pub fn new(poll_interval: Duration) -> Self {
        Self::started_at(poll_interval, chrono::Utc::now().timestamp())
    }

    fn started_at(poll_interval: Duration, now: i64) -> Self {
        Self {
            state: Arc::new(RwLock::new(RoundState {
                started_at: now,
                last_completed: None,
                rounds_completed: 0,
                last_abort: None,
            })),
            stale_after: poll_interval * 3,
        }
    }

    pub async fn record_completed(&self, summary: &RoundSummary) {
        let mut state = self.state.write().await;
        state.last_completed = Some(summary.started_at + (summary.duration_ms / 1000) as i64);
        state.rounds_completed += 1;
        state.last_abort = None;
    }

    pub async fn record_aborted(&self, reason: impl Into<String>) {
        self.state.write().await.last_abort = Some(reason.into());
    }

    pub async fn health(&self) -> HealthResponse {
        self.health_at(chrono::Utc::now().timestamp()).await
    }

    /// Health as seen at unix time `now`
    pub async fn health_at(&self, now: i64) -> HealthResponse {
        let state = self.state.read().await;
        let reference = state.last_completed.unwrap_or(state.started_at);
        let stale = now.saturating_sub(reference) > self.stale_after.as_secs() as i64;

        let driver = if stale {
            ComponentHealth::at(
                ComponentStatus::Unhealthy,
                Some(format!(
                    "no round completed in the last {}s",
                    self.stale_after.as_secs()
                )),
                now,
            )
        } else if let Some(reason) = &state.last_abort {
            ComponentHealth::at(ComponentStatus::Degraded, Some(reason.clone()), now)
        } else {
            ComponentHealth::at(ComponentStatus::Healthy, None, now)
        };

        let status = driver.status;
        let mut by_name = HashMap::new();
        by_name.insert(components::ROUND_DRIVER.to_string(), driver);

        HealthResponse {
            status,
            rounds_completed: state.rounds_completed,
            last_round_timestamp: state.last_completed,
            components: by_name,
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let health = self.health().await;

        if health.rounds_completed == 0 {
            ReadinessResponse {
                ready: false,
                reason: Some("No round completed yet".to_string()),
            }
        } else if !health.status.is_operational() {
            ReadinessResponse {
                ready: false,
                reason: Some("Round driver unhealthy".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}
