//! Per-round scaling targets derived from a workload snapshot

use crate::config::ScalerConfig;
use crate::models::WorkloadSnapshot;

/// Integer targets for one workload in one round
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingTargets {
    pub num_pods: usize,
    /// `ceil(utilization / max_allocation_per_replica)`, may be 0
    pub ideal_replicas: u32,
    /// `ceil(utilization / ideal_replicas)`, dividing by 1 when ideal is 0
    pub new_request_millis: u64,
    /// `ceil(allocation / num_pods)`
    pub per_pod_alloc_millis: u64,
    /// `utilization / allocation`, infinite when nothing is allocated
    pub utilization_ratio: f64,
}

impl ScalingTargets {
    pub fn compute(snapshot: &WorkloadSnapshot, config: &ScalerConfig) -> Self {
        let num_pods = snapshot.num_pods();
        let util = snapshot.utilization_millis;
        let alloc = snapshot.allocation_millis;

        let ideal = util.div_ceil(config.max_allocation_per_replica);
        let ideal_replicas = u32::try_from(ideal).unwrap_or(u32::MAX);
        let new_request_millis = util.div_ceil(ideal.max(1));
        let per_pod_alloc_millis = alloc.div_ceil(num_pods.max(1) as u64);
        let utilization_ratio = if alloc == 0 {
            f64::INFINITY
        } else {
            util as f64 / alloc as f64
        };

        Self {
            num_pods,
            ideal_replicas,
            new_request_millis,
            per_pod_alloc_millis,
            utilization_ratio,
        }
    }

    /// Replica target with the floor of one applied
    pub fn floored_replicas(&self) -> u32 {
        self.ideal_replicas.max(1)
    }

    /// More replicas are needed than currently run
    pub fn needs_more_replicas(&self) -> bool {
        self.ideal_replicas as usize > self.num_pods
    }

    /// Utilization is low enough relative to allocation to shrink
    pub fn triggers_downscale(&self, config: &ScalerConfig) -> bool {
        self.utilization_ratio < config.downscale_utilization_threshold
    }

    /// Replica count to shrink to, if fewer are needed
    pub fn downscale_replicas(&self) -> Option<u32> {
        if (self.ideal_replicas as usize) < self.num_pods {
            Some(self.floored_replicas())
        } else {
            None
        }
    }

    /// Per-pod request after the hysteresis margin, floored at the minimum
    pub fn downscale_request(&self, config: &ScalerConfig) -> u64 {
        let margin = 1.0 / config.downscale_utilization_threshold;
        let padded = (self.new_request_millis as f64 * margin).ceil() as u64;
        padded.max(config.min_request_floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PodSnapshot;

    fn snapshot(requests: &[u64], utilization: u64) -> WorkloadSnapshot {
        let pods: Vec<_> = requests
            .iter()
            .enumerate()
            .map(|(i, r)| PodSnapshot::new(format!("pod{}", i + 1), "node1", "app", *r))
            .collect();
        WorkloadSnapshot {
            name: "testapp".to_string(),
            namespace: "default".to_string(),
            allocation_millis: requests.iter().sum(),
            pods,
            utilization_millis: utilization,
        }
    }

    fn config(maps: u64) -> ScalerConfig {
        ScalerConfig {
            max_allocation_per_replica: maps,
            ..Default::default()
        }
    }

    #[test]
    fn test_targets_round_up() {
        let targets = ScalingTargets::compute(&snapshot(&[300, 300, 300], 990), &config(400));

        assert_eq!(targets.ideal_replicas, 3);
        assert_eq!(targets.new_request_millis, 330);
        assert_eq!(targets.per_pod_alloc_millis, 300);
        assert!(!targets.needs_more_replicas());
    }

    #[test]
    fn test_per_pod_alloc_rounds_up() {
        let targets = ScalingTargets::compute(&snapshot(&[300, 301], 100), &config(500));
        assert_eq!(targets.per_pod_alloc_millis, 301);
    }

    #[test]
    fn test_hysteresis_padding() {
        let cfg = ScalerConfig {
            max_allocation_per_replica: 300,
            downscale_utilization_threshold: 0.85,
            ..Default::default()
        };
        let targets = ScalingTargets::compute(&snapshot(&[300, 300, 300], 750), &cfg);

        assert_eq!(targets.new_request_millis, 250);
        assert_eq!(targets.downscale_request(&cfg), 295);
        assert!(targets.triggers_downscale(&cfg));
        assert_eq!(targets.downscale_replicas(), None);
    }

    #[test]
    fn test_hysteresis_margin_lands_on_exact_multiples() {
        let cfg = ScalerConfig {
            downscale_utilization_threshold: 0.7,
            min_request_floor: 10,
            ..Default::default()
        };

        for (utilization, expected) in [(21, 30), (42, 60), (63, 90), (175, 250)] {
            let targets = ScalingTargets::compute(&snapshot(&[400], utilization), &cfg);
            assert_eq!(targets.downscale_request(&cfg), expected, "util {utilization}");
        }
    }

    #[test]
    fn test_downscale_request_respects_floor() {
        let cfg = ScalerConfig {
            min_request_floor: 100,
            ..Default::default()
        };
        let targets = ScalingTargets::compute(&snapshot(&[300, 300], 20), &cfg);

        assert_eq!(targets.downscale_request(&cfg), 100);
    }

    #[test]
    fn test_zero_utilization_keeps_one_replica() {
        let targets = ScalingTargets::compute(&snapshot(&[300, 300, 300], 0), &config(500));

        assert_eq!(targets.ideal_replicas, 0);
        assert_eq!(targets.new_request_millis, 0);
        assert_eq!(targets.downscale_replicas(), Some(1));
    }

    #[test]
    fn test_zero_allocation_never_downscales() {
        let targets = ScalingTargets::compute(&snapshot(&[0, 0], 50), &config(500));

        assert!(targets.utilization_ratio.is_infinite());
        assert!(!targets.triggers_downscale(&ScalerConfig::default()));
    }
}
