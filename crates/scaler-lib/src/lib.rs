//! Closed-loop CPU autoscaler library
//!
//! This crate provides the core functionality for:
//! - Reading cluster and latency state through a narrow provider interface
//! - SLO evaluation and node congestion detection
//! - The per-workload decision engine (horizontal, vertical, migration)
//! - The round driver, health checks and observability

pub mod config;
pub mod congestion;
pub mod driver;
pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod provider;
pub mod slo;
pub mod snapshot;
pub mod watcher;

pub use config::ScalerConfig;
pub use driver::{RoundDriver, RoundDriverBuilder};
pub use engine::DecisionEngine;
pub use error::{ConfigError, ProviderError, ProviderResult, RoundAbortError};
pub use health::{ComponentHealth, ComponentStatus, HealthResponse, ReadinessResponse, RoundHealth};
pub use models::*;
pub use observability::{ScalerMetrics, StructuredLogger};
pub use provider::MetricsProvider;
pub use watcher::{RoundData, Watcher};
