//! Scaling target container selection

use k8s_openapi::api::core::v1::Container;
use std::collections::HashSet;

/// Sidecars injected by common service meshes
pub const DEFAULT_SIDECAR_CONTAINERS: &[&str] = &["linkerd-proxy", "istio-proxy"];

/// Picks the one container per pod whose CPU request is resized
///
/// An explicit per-workload target wins. Otherwise the first container whose
/// name is not a known sidecar is used, falling back to the first container.
#[derive(Debug, Clone)]
pub struct ContainerSelector {
    sidecars: HashSet<String>,
}

impl Default for ContainerSelector {
    fn default() -> Self {
        Self::new(DEFAULT_SIDECAR_CONTAINERS.iter().copied())
    }
}

impl ContainerSelector {
    pub fn new<I, S>(sidecars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sidecars: sidecars.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_sidecar(&self, name: &str) -> bool {
        self.sidecars.contains(name)
    }

    /// Select by name only, for callers that do not hold full container specs
    pub fn select_name<'a>(&self, names: &[&'a str], target: Option<&str>) -> Option<&'a str> {
        if let Some(target) = target {
            return names.iter().copied().find(|n| *n == target);
        }

        names
            .iter()
            .copied()
            .find(|n| !self.is_sidecar(n))
            .or_else(|| names.first().copied())
    }

    pub fn select<'a>(
        &self,
        containers: &'a [Container],
        target: Option<&str>,
    ) -> Option<&'a Container> {
        let names: Vec<&str> = containers.iter().map(|c| c.name.as_str()).collect();
        let chosen = self.select_name(&names, target)?;
        containers.iter().find(|c| c.name == chosen)
    }
}
