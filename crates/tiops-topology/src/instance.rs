//! The per-instance capability surface.
//!
//! Role modules expose every concrete process of the cluster through
//! [`Instance`], dispatching role-specific behavior (ports, dirs, status
//! probe, config rendering) by variant. Instances never own the
//! topology; sibling endpoints are resolved from a borrowed reference
//! passed into the config calls.

use std::path::PathBuf;

use tiops_executor::module::{port_started, port_stopped};
use tiops_executor::Executor;

use crate::error::Result;
use crate::roles;
use crate::spec::{component, Topology};

/// Resolved directory set for one instance's config rendering.
#[derive(Debug, Clone)]
pub struct DirPaths {
    /// Absolute deploy directory on the target host.
    pub deploy: String,
    /// Absolute data directory on the target host, if the role has one.
    pub data: Option<String>,
    /// Absolute log directory on the target host.
    pub log: String,
    /// Local cache directory where rendered files are staged.
    pub cache: PathBuf,
}

/// One concrete process of a role on a specific host/port.
pub trait Instance: Send + Sync {
    /// The component this instance belongs to.
    fn component_name(&self) -> &'static str;

    /// The target host.
    fn host(&self) -> &str;

    /// SSH port of the target host.
    fn ssh_port(&self) -> u16;

    /// The primary port, used for identity and liveness.
    fn port(&self) -> u16;

    /// Deploy directory as written in the topology (possibly relative).
    fn deploy_dir(&self) -> &str;

    /// Data directory as written in the topology, if any.
    fn data_dir(&self) -> Option<&str>;

    /// Log directory; defaults to `log` under the deploy dir.
    fn log_dir(&self) -> String;

    /// Every port the instance claims on its host.
    fn used_ports(&self) -> Vec<u16>;

    /// Every directory the instance claims on its host.
    fn used_dirs(&self) -> Vec<String>;

    /// True when the instance originated from a legacy inventory.
    fn is_imported(&self) -> bool;

    /// Identity of the instance, `host:port`.
    fn id(&self) -> String {
        format!("{}:{}", self.host(), self.port())
    }

    /// Display name, `<component><port>`.
    fn instance_name(&self) -> String {
        format!("{}{}", self.component_name(), self.port())
    }

    /// Systemd unit name, `<component>-<port>.service`.
    fn service_name(&self) -> String {
        format!("{}-{}.service", self.component_name(), self.port())
    }

    /// Probes the instance's status for display.
    ///
    /// `pd_endpoints` carries the PD API addresses for roles whose
    /// status lives in PD rather than on the instance itself.
    fn status(&self, pd_endpoints: &[String]) -> String;

    /// Renders and uploads the systemd unit, run script and config file.
    fn init_config(
        &self,
        exec: &dyn Executor,
        topo: &Topology,
        cluster: &str,
        user: &str,
        paths: &DirPaths,
    ) -> Result<()>;

    /// Like [`Instance::init_config`] but against the post-scale
    /// topology, for roles that join an existing cluster differently.
    fn scale_config(
        &self,
        exec: &dyn Executor,
        topo: &Topology,
        cluster: &str,
        user: &str,
        paths: &DirPaths,
    ) -> Result<()> {
        self.init_config(exec, topo, cluster, user, paths)
    }

    /// Blocks until the instance's primary port is listening.
    fn ready(&self, exec: &dyn Executor) -> Result<()> {
        port_started(exec, self.port())?;
        Ok(())
    }

    /// Blocks until the instance's primary port is released.
    fn wait_for_down(&self, exec: &dyn Executor) -> Result<()> {
        port_stopped(exec, self.port())?;
        Ok(())
    }
}

/// A component role of the cluster, in its closed set of variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// The placement driver.
    Pd,
    /// The storage layer.
    Tikv,
    /// The binlog producer.
    Pump,
    /// The SQL layer.
    Tidb,
    /// The columnar replica.
    Tiflash,
    /// The binlog consumer.
    Drainer,
    /// The metrics store.
    Prometheus,
    /// The dashboard.
    Grafana,
    /// The alert router.
    Alertmanager,
}

impl ComponentKind {
    /// Components in the order they must start.
    pub fn start_order() -> Vec<ComponentKind> {
        vec![
            Self::Pd,
            Self::Tikv,
            Self::Pump,
            Self::Tidb,
            Self::Tiflash,
            Self::Drainer,
            Self::Prometheus,
            Self::Grafana,
            Self::Alertmanager,
        ]
    }

    /// Components in the order they must stop: the reverse of
    /// [`ComponentKind::start_order`].
    pub fn stop_order() -> Vec<ComponentKind> {
        let mut order = Self::start_order();
        order.reverse();
        order
    }

    /// The component's name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pd => component::PD,
            Self::Tikv => component::TIKV,
            Self::Pump => component::PUMP,
            Self::Tidb => component::TIDB,
            Self::Tiflash => component::TIFLASH,
            Self::Drainer => component::DRAINER,
            Self::Prometheus => component::PROMETHEUS,
            Self::Grafana => component::GRAFANA,
            Self::Alertmanager => component::ALERTMANAGER,
        }
    }

    /// Resolves the component's name back to its variant.
    pub fn from_name(name: &str) -> Option<ComponentKind> {
        Self::start_order().into_iter().find(|c| c.name() == name)
    }

    /// Materializes the component's instances from a topology.
    pub fn instances(&self, topo: &Topology) -> Vec<Box<dyn Instance>> {
        match self {
            Self::Pd => roles::pd::instances(topo),
            Self::Tikv => roles::tikv::instances(topo),
            Self::Pump => roles::pump::instances(topo),
            Self::Tidb => roles::tidb::instances(topo),
            Self::Tiflash => roles::tiflash::instances(topo),
            Self::Drainer => roles::drainer::instances(topo),
            Self::Prometheus => roles::prometheus::instances(topo),
            Self::Grafana => roles::grafana::instances(topo),
            Self::Alertmanager => roles::alertmanager::instances(topo),
        }
    }
}

/// A component paired with the topology it came from, mirroring the
/// iteration helpers the orchestrator walks.
pub struct Component<'a> {
    /// Which role this is.
    pub kind: ComponentKind,
    topo: &'a Topology,
}

impl<'a> Component<'a> {
    /// The component's name.
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// The component's instances.
    pub fn instances(&self) -> Vec<Box<dyn Instance>> {
        self.kind.instances(self.topo)
    }
}

impl Topology {
    /// Components in start order.
    pub fn components_by_start_order(&self) -> Vec<Component<'_>> {
        ComponentKind::start_order()
            .into_iter()
            .map(|kind| Component { kind, topo: self })
            .collect()
    }

    /// Components in stop order.
    pub fn components_by_stop_order(&self) -> Vec<Component<'_>> {
        ComponentKind::stop_order()
            .into_iter()
            .map(|kind| Component { kind, topo: self })
            .collect()
    }

    /// Calls `f` for every instance, walking components in start order.
    pub fn iter_instances(&self, mut f: impl FnMut(&dyn Instance)) {
        for comp in self.components_by_start_order() {
            for inst in comp.instances() {
                f(inst.as_ref());
            }
        }
    }

    /// Calls `f` once per unique host, with the first instance found on
    /// that host.
    pub fn iter_hosts(&self, mut f: impl FnMut(&dyn Instance)) {
        let mut seen = std::collections::HashSet::new();
        for comp in self.components_by_start_order() {
            for inst in comp.instances() {
                if seen.insert(inst.host().to_string()) {
                    f(inst.as_ref());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_order_is_reversed_start_order() {
        let mut reversed = ComponentKind::start_order();
        reversed.reverse();
        assert_eq!(ComponentKind::stop_order(), reversed);
    }

    #[test]
    fn test_start_order_begins_with_pd_ends_with_alertmanager() {
        let order = ComponentKind::start_order();
        assert_eq!(order.first(), Some(&ComponentKind::Pd));
        assert_eq!(order.last(), Some(&ComponentKind::Alertmanager));
    }

    #[test]
    fn test_from_name_round_trips() {
        for kind in ComponentKind::start_order() {
            assert_eq!(ComponentKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ComponentKind::from_name("nonsuch"), None);
    }

    #[test]
    fn test_iter_instances_walks_start_order() {
        let topo = Topology::from_str(
            "pd_servers:\n  - host: 10.0.0.1\ntikv_servers:\n  - host: 10.0.0.2\ntidb_servers:\n  - host: 10.0.0.3\n",
        )
        .unwrap();
        let mut names = Vec::new();
        topo.iter_instances(|i| names.push(i.component_name()));
        assert_eq!(names, vec!["pd", "tikv", "tidb"]);
    }

    #[test]
    fn test_iter_hosts_visits_each_host_once() {
        let topo = Topology::from_str(
            "pd_servers:\n  - host: 10.0.0.1\ntikv_servers:\n  - host: 10.0.0.1\n  - host: 10.0.0.2\n",
        )
        .unwrap();
        let mut hosts = Vec::new();
        topo.iter_hosts(|i| hosts.push(i.host().to_string()));
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2"]);
    }
}
