//! Cluster lifecycle procedures.
//!
//! Each procedure walks the topology in component order and drives the
//! remote hosts through an [`ExecutorGetter`]: start and stop via
//! systemd with port waits, upgrades with leader transfer and store
//! eviction, scale-in with quorum guards and async offline, destroy
//! with imported-instance protection, and host pre-flight checks.
//!
//! The task engine's shared context implements [`ExecutorGetter`], so
//! procedures stay free of task-engine types.

pub mod action;
pub mod check;
pub mod destroy;
pub mod error;
pub mod precheck;
pub mod scale_in;
pub mod upgrade;

use std::collections::HashSet;
use std::sync::Arc;

use tiops_executor::Executor;
use tiops_topology::{Component, Instance};

pub use check::{CheckOptions, CheckResult};
pub use error::{OperationError, PreCheckError, Result};

/// Looks up the cached executor of a host.
pub trait ExecutorGetter: Send + Sync {
    /// Returns the executor bound to `host`, if one was established.
    fn get(&self, host: &str) -> Option<Arc<dyn Executor>>;
}

/// Options shared by the lifecycle procedures.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Restrict the operation to these roles; empty means all.
    pub roles: Vec<String>,
    /// Restrict the operation to these node ids; empty means all.
    pub nodes: Vec<String>,
    /// Skip leader transfer and store eviction during upgrades.
    pub force: bool,
}

/// The cluster operations a task can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Start all (or the selected) instances.
    Start,
    /// Stop all (or the selected) instances.
    Stop,
    /// Stop then start.
    Restart,
    /// Rolling upgrade with leader awareness.
    Upgrade,
    /// Remove instances from the cluster.
    ScaleIn,
    /// Tear the cluster down.
    Destroy,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Upgrade => "upgrade",
            Self::ScaleIn => "scale-in",
            Self::Destroy => "destroy",
        };
        write!(f, "{}", name)
    }
}

/// Keeps only the components named in `roles`; empty keeps all.
pub fn filter_components<'a>(
    components: Vec<Component<'a>>,
    roles: &[String],
) -> Vec<Component<'a>> {
    if roles.is_empty() {
        return components;
    }
    let keep: HashSet<&str> = roles.iter().map(String::as_str).collect();
    components
        .into_iter()
        .filter(|c| keep.contains(c.name()))
        .collect()
}

/// Keeps only the instances whose id is named in `nodes`; empty keeps
/// all.
pub fn filter_instances(
    instances: Vec<Box<dyn Instance>>,
    nodes: &[String],
) -> Vec<Box<dyn Instance>> {
    if nodes.is_empty() {
        return instances;
    }
    let keep: HashSet<&str> = nodes.iter().map(String::as_str).collect();
    instances
        .into_iter()
        .filter(|i| keep.contains(i.id().as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiops_topology::Topology;

    #[test]
    fn test_filter_components_by_role() {
        let topo = Topology::from_str(
            "pd_servers:\n  - host: 10.0.0.1\ntikv_servers:\n  - host: 10.0.0.2\n",
        )
        .unwrap();
        let comps = filter_components(
            topo.components_by_start_order(),
            &["tikv".to_string()],
        );
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].name(), "tikv");
    }

    #[test]
    fn test_filter_instances_by_id() {
        let topo = Topology::from_str(
            "tikv_servers:\n  - host: 10.0.0.1\n  - host: 10.0.0.2\n",
        )
        .unwrap();
        let comps = topo.components_by_start_order();
        let tikv = comps.iter().find(|c| c.name() == "tikv").unwrap();
        let insts = filter_instances(tikv.instances(), &["10.0.0.2:20160".to_string()]);
        assert_eq!(insts.len(), 1);
        assert_eq!(insts[0].host(), "10.0.0.2");
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::ScaleIn.to_string(), "scale-in");
    }
}
