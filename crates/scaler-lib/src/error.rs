//! Error taxonomy for the autoscaler
//!
//! Per-workload and per-pod errors are logged where they occur. Only
//! [`RoundAbortError`] and [`ConfigError`] travel up to the process boundary.

use thiserror::Error;

/// Failure reported by a [`MetricsProvider`](crate::provider::MetricsProvider)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// A metric or state query failed
    #[error("read failed: {0}")]
    Transient(String),

    /// The latency backend answered with no samples
    #[error("metrics backend returned no data")]
    NoData,

    /// The ready replica count did not converge in time
    #[error("timed out scaling {workload} to {wanted} replicas ({ready} ready)")]
    ScaleTimeout {
        workload: String,
        wanted: u32,
        ready: u32,
    },

    /// A scale, resize or delete request was refused
    #[error("mutation rejected: {0}")]
    Rejected(String),
}

impl ProviderError {
    pub fn transient(err: impl std::fmt::Display) -> Self {
        ProviderError::Transient(err.to_string())
    }

    pub fn rejected(err: impl std::fmt::Display) -> Self {
        ProviderError::Rejected(err.to_string())
    }

    /// True for failures of a write against the cluster
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ProviderError::ScaleTimeout { .. } | ProviderError::Rejected(_)
        )
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Invalid policy at startup; the process must not start
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}

/// The round could not even enumerate what to work on
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoundAbortError {
    #[error("failed to list nodes: {0}")]
    ListNodes(ProviderError),

    #[error("failed to list managed workloads: {0}")]
    ListWorkloads(ProviderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_classification() {
        assert!(ProviderError::rejected("patch refused").is_mutation());
        assert!(ProviderError::ScaleTimeout {
            workload: "default/testapp".to_string(),
            wanted: 4,
            ready: 3,
        }
        .is_mutation());
        assert!(!ProviderError::NoData.is_mutation());
        assert!(!ProviderError::transient("connection reset").is_mutation());
    }

    #[test]
    fn test_error_messages() {
        let err = RoundAbortError::ListNodes(ProviderError::transient("forbidden"));
        assert_eq!(err.to_string(), "failed to list nodes: read failed: forbidden");
    }
}
