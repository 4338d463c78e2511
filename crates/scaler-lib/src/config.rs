//! Scaling policy

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_NODE_AVAILABILITY_THRESHOLD: f64 = 0.4;
pub const DEFAULT_DOWNSCALE_UTILIZATION_THRESHOLD: f64 = 0.85;
pub const DEFAULT_MAX_ALLOCATION_PER_REPLICA: u64 = 500;
pub const DEFAULT_MIN_REQUEST_FLOOR: u64 = 100;
pub const DEFAULT_LATENCY_THRESHOLD_MILLIS: u64 = 40;

/// Immutable per-process scaling policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerConfig {
    /// Headroom fraction at or below which a node counts as congested
    #[serde(default = "default_min_node_availability_threshold")]
    pub min_node_availability_threshold: f64,

    /// Utilization/allocation ratio below which a workload is shrunk
    #[serde(default = "default_downscale_utilization_threshold")]
    pub downscale_utilization_threshold: f64,

    /// Target CPU ceiling for a single replica (Maps), in millicores
    #[serde(default = "default_max_allocation_per_replica")]
    pub max_allocation_per_replica: u64,

    /// Lowest per-replica request a downscale may set, in millicores
    #[serde(default = "default_min_request_floor")]
    pub min_request_floor: u64,

    /// p99 latency above which the SLO is violated
    #[serde(default = "default_latency_threshold_millis")]
    pub latency_threshold_millis: u64,
}

fn default_min_node_availability_threshold() -> f64 {
    DEFAULT_MIN_NODE_AVAILABILITY_THRESHOLD
}

fn default_downscale_utilization_threshold() -> f64 {
    DEFAULT_DOWNSCALE_UTILIZATION_THRESHOLD
}

fn default_max_allocation_per_replica() -> u64 {
    DEFAULT_MAX_ALLOCATION_PER_REPLICA
}

fn default_min_request_floor() -> u64 {
    DEFAULT_MIN_REQUEST_FLOOR
}

fn default_latency_threshold_millis() -> u64 {
    DEFAULT_LATENCY_THRESHOLD_MILLIS
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            min_node_availability_threshold: DEFAULT_MIN_NODE_AVAILABILITY_THRESHOLD,
            downscale_utilization_threshold: DEFAULT_DOWNSCALE_UTILIZATION_THRESHOLD,
            max_allocation_per_replica: DEFAULT_MAX_ALLOCATION_PER_REPLICA,
            min_request_floor: DEFAULT_MIN_REQUEST_FLOOR,
            latency_threshold_millis: DEFAULT_LATENCY_THRESHOLD_MILLIS,
        }
    }
}

impl ScalerConfig {
    /// Reject policies the decision engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let availability = self.min_node_availability_threshold;
        if !(0.0..=1.0).contains(&availability) {
            return Err(ConfigError::OutOfRange {
                field: "min_node_availability_threshold",
                expected: "within [0, 1]",
                value: availability.to_string(),
            });
        }

        // The hysteresis margin divides by this value
        let downscale = self.downscale_utilization_threshold;
        if !(downscale > 0.0 && downscale <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "downscale_utilization_threshold",
                expected: "within (0, 1]",
                value: downscale.to_string(),
            });
        }

        if self.max_allocation_per_replica == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_allocation_per_replica",
                expected: "greater than 0",
                value: "0".to_string(),
            });
        }

        if self.latency_threshold_millis == 0 {
            return Err(ConfigError::OutOfRange {
                field: "latency_threshold_millis",
                expected: "greater than 0",
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScalerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_allocation_per_replica, 500);
        assert_eq!(config.min_request_floor, 100);
    }

    #[test]
    fn test_rejects_zero_downscale_threshold() {
        let config = ScalerConfig {
            downscale_utilization_threshold: 0.0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("downscale_utilization_threshold"));
    }

    #[test]
    fn test_rejects_availability_above_one() {
        let config = ScalerConfig {
            min_node_availability_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_maps() {
        let config = ScalerConfig {
            max_allocation_per_replica: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_nan_threshold() {
        let config = ScalerConfig {
            min_node_availability_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: ScalerConfig =
            serde_json::from_str(r#"{"latency_threshold_millis": 100}"#).unwrap();
        assert_eq!(config.latency_threshold_millis, 100);
        assert_eq!(config.downscale_utilization_threshold, 0.85);
    }
}
