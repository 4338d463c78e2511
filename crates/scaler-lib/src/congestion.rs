//! Node congestion detection
//!
//! Headroom is the fraction of a node's capacity that is both unused and
//! schedulable: `min(capacity - usage, allocatable) / capacity`. A node with
//! free quota can still be CPU-saturated by noisy neighbours, so both must be
//! scarce for the node to count as congested.
//!
//! The scanner never caches: every call re-reads the node through the
//! provider so that a migration earlier in the same scan is visible.

use crate::error::ProviderResult;
use crate::models::NodeSnapshot;
use crate::provider::MetricsProvider;
use std::sync::Arc;

/// Fresh reading of a node plus the congestion verdict derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct NodeVerdict {
    pub node: NodeSnapshot,
    pub headroom: f64,
    pub congested: bool,
}

/// Fraction of capacity that is both idle and schedulable
pub fn headroom(node: &NodeSnapshot) -> f64 {
    if node.capacity_millis == 0 {
        return 0.0;
    }
    let idle = node.capacity_millis.saturating_sub(node.usage_millis);
    idle.min(node.allocatable_millis) as f64 / node.capacity_millis as f64
}

/// Read-through congestion scanner
#[derive(Clone)]
pub struct CongestionScanner {
    provider: Arc<dyn MetricsProvider>,
    min_node_availability_threshold: f64,
}

impl CongestionScanner {
    pub fn new(provider: Arc<dyn MetricsProvider>, min_node_availability_threshold: f64) -> Self {
        Self {
            provider,
            min_node_availability_threshold,
        }
    }

    pub fn is_congested(&self, node: &NodeSnapshot) -> bool {
        headroom(node) <= self.min_node_availability_threshold
    }

    /// Read usage, allocatable and capacity for a node
    pub async fn read_node(&self, name: &str) -> ProviderResult<NodeSnapshot> {
        let usage_millis = self.provider.node_usage(name).await?;
        let (allocatable_millis, capacity_millis) =
            self.provider.node_allocatable_and_capacity(name).await?;

        Ok(NodeSnapshot {
            name: name.to_string(),
            capacity_millis,
            allocatable_millis,
            usage_millis,
        })
    }

    /// Re-read a node and judge it
    pub async fn scan(&self, name: &str) -> ProviderResult<NodeVerdict> {
        let node = self.read_node(name).await?;
        let headroom = headroom(&node);
        let congested = headroom <= self.min_node_availability_threshold;

        Ok(NodeVerdict {
            node,
            headroom,
            congested,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockCluster, MockProvider};

    fn node(capacity: u64, allocatable: u64, usage: u64) -> NodeSnapshot {
        NodeSnapshot {
            name: "node1".to_string(),
            capacity_millis: capacity,
            allocatable_millis: allocatable,
            usage_millis: usage,
        }
    }

    #[test]
    fn test_headroom_limited_by_usage() {
        // Plenty of quota, but the CPU is busy
        assert!((headroom(&node(1000, 800, 900)) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_headroom_limited_by_allocatable() {
        assert!((headroom(&node(1000, 200, 100)) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_headroom_saturates_when_overcommitted() {
        assert_eq!(headroom(&node(1000, 500, 1200)), 0.0);
        assert_eq!(headroom(&node(0, 0, 0)), 0.0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let provider = Arc::new(MockProvider::new(MockCluster::new()));
        let scanner = CongestionScanner::new(provider, 0.4);

        assert!(scanner.is_congested(&node(1000, 400, 0)));
        assert!(!scanner.is_congested(&node(1000, 401, 0)));
    }

    #[tokio::test]
    async fn test_scan_reads_through_provider() {
        let provider = Arc::new(MockProvider::new(
            MockCluster::new().node("node1", 1000, 10, 1000),
        ));
        let scanner = CongestionScanner::new(provider.clone(), 0.4);

        let verdict = scanner.scan("node1").await.unwrap();
        assert!(verdict.congested);
        assert_eq!(verdict.node.allocatable_millis, 10);
        assert_eq!(verdict.headroom, 0.0);
    }

    #[tokio::test]
    async fn test_scan_unknown_node_fails() {
        let provider = Arc::new(MockProvider::new(MockCluster::new()));
        let scanner = CongestionScanner::new(provider, 0.4);

        assert!(scanner.scan("missing").await.is_err());
    }
}
