//! Typed topology specification and defaulting.
//!
//! The YAML shape is strict: unknown keys are an error, so a typo in a
//! field name fails at load time instead of silently deploying with a
//! default.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TopologyError};

/// Free-form configuration map whose keys may be dotted paths.
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// Component names, also used as default directory prefixes.
pub mod component {
    /// The SQL layer.
    pub const TIDB: &str = "tidb";
    /// The storage layer.
    pub const TIKV: &str = "tikv";
    /// The placement driver.
    pub const PD: &str = "pd";
    /// The columnar replica.
    pub const TIFLASH: &str = "tiflash";
    /// The binlog producer.
    pub const PUMP: &str = "pump";
    /// The binlog consumer.
    pub const DRAINER: &str = "drainer";
    /// The metrics store.
    pub const PROMETHEUS: &str = "prometheus";
    /// The dashboard.
    pub const GRAFANA: &str = "grafana";
    /// The alert router.
    pub const ALERTMANAGER: &str = "alertmanager";
    /// Host-level metrics exporter, deployed once per host.
    pub const NODE_EXPORTER: &str = "node_exporter";
    /// Probe exporter, deployed once per host.
    pub const BLACKBOX_EXPORTER: &str = "blackbox_exporter";
}

/// All deployable components in start order, monitored agents included.
pub const FULL_COMPONENT_ORDER: [&str; 11] = [
    component::PD,
    component::TIKV,
    component::PUMP,
    component::TIDB,
    component::TIFLASH,
    component::DRAINER,
    component::PROMETHEUS,
    component::GRAFANA,
    component::ALERTMANAGER,
    component::NODE_EXPORTER,
    component::BLACKBOX_EXPORTER,
];

fn default_user() -> String {
    "tidb".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_deploy_parent() -> String {
    "deploy".to_string()
}

fn default_data_parent() -> String {
    "data".to_string()
}

/// Defaults shared by every group in the topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalOptions {
    /// The user components run as on the target hosts.
    #[serde(default = "default_user")]
    pub user: String,

    /// SSH port used when an instance does not override it.
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// Parent of generated deploy directories.
    #[serde(default = "default_deploy_parent")]
    pub deploy_dir: String,

    /// Parent of generated data directories.
    #[serde(default = "default_data_parent")]
    pub data_dir: String,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            user: default_user(),
            ssh_port: default_ssh_port(),
            deploy_dir: default_deploy_parent(),
            data_dir: default_data_parent(),
        }
    }
}

fn default_node_exporter_port() -> u16 {
    9100
}

fn default_blackbox_exporter_port() -> u16 {
    9115
}

/// Configuration of the per-host monitoring agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitoredOptions {
    /// Port of the node exporter, checked against every known host.
    #[serde(default = "default_node_exporter_port")]
    pub node_exporter_port: u16,

    /// Port of the blackbox exporter, checked against every known host.
    #[serde(default = "default_blackbox_exporter_port")]
    pub blackbox_exporter_port: u16,

    /// Deploy directory of the agents; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deploy_dir: String,

    /// Data directory of the agents; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_dir: String,

    /// Log directory of the agents; `log` under the deploy dir when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_dir: String,
}

impl Default for MonitoredOptions {
    fn default() -> Self {
        Self {
            node_exporter_port: default_node_exporter_port(),
            blackbox_exporter_port: default_blackbox_exporter_port(),
            deploy_dir: String::new(),
            data_dir: String::new(),
            log_dir: String::new(),
        }
    }
}

/// Per-role configuration maps layered under every instance's own map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfigs {
    /// Defaults for all TiDB instances.
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub tidb: ConfigMap,
    /// Defaults for all TiKV instances.
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub tikv: ConfigMap,
    /// Defaults for all PD instances.
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub pd: ConfigMap,
    /// Defaults for all TiFlash instances.
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub tiflash: ConfigMap,
    /// Defaults for the TiFlash proxy (learner) config.
    #[serde(
        default,
        rename = "tiflash-learner",
        skip_serializing_if = "ConfigMap::is_empty"
    )]
    pub tiflash_learner: ConfigMap,
    /// Defaults for all Pump instances.
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub pump: ConfigMap,
    /// Defaults for all Drainer instances.
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub drainer: ConfigMap,
}

fn is_false(v: &bool) -> bool {
    !*v
}

macro_rules! default_port_fn {
    ($name:ident, $value:expr) => {
        fn $name() -> u16 {
            $value
        }
    };
}

default_port_fn!(default_tidb_port, 4000);
default_port_fn!(default_tidb_status_port, 10080);
default_port_fn!(default_tikv_port, 20160);
default_port_fn!(default_tikv_status_port, 20180);
default_port_fn!(default_pd_client_port, 2379);
default_port_fn!(default_pd_peer_port, 2380);
default_port_fn!(default_tiflash_tcp_port, 9000);
default_port_fn!(default_tiflash_http_port, 8123);
default_port_fn!(default_flash_service_port, 3930);
default_port_fn!(default_flash_proxy_port, 20170);
default_port_fn!(default_flash_proxy_status_port, 20292);
default_port_fn!(default_tiflash_status_port, 8234);
default_port_fn!(default_pump_port, 8250);
default_port_fn!(default_drainer_port, 8249);
default_port_fn!(default_prometheus_port, 9090);
default_port_fn!(default_grafana_port, 3000);
default_port_fn!(default_alertmanager_web_port, 9093);
default_port_fn!(default_alertmanager_cluster_port, 9094);

/// A TiDB instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TidbSpec {
    /// Target host, required.
    pub host: String,
    /// SSH port; global default when zero.
    #[serde(default, skip_serializing_if = "crate::spec::is_zero")]
    pub ssh_port: u16,
    /// Client port.
    #[serde(default = "default_tidb_port")]
    pub port: u16,
    /// Status/metrics port.
    #[serde(default = "default_tidb_status_port")]
    pub status_port: u16,
    /// Deploy directory; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deploy_dir: String,
    /// Log directory; `log` under the deploy dir when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_dir: String,
    /// NUMA node to bind to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub numa_node: String,
    /// Instance-level configuration overriding `server_configs.tidb`.
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub config: ConfigMap,
    /// True for instances migrated from a legacy inventory.
    #[serde(default, skip_serializing_if = "is_false")]
    pub imported: bool,
}

/// A TiKV instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TikvSpec {
    /// Target host, required.
    pub host: String,
    /// SSH port; global default when zero.
    #[serde(default, skip_serializing_if = "crate::spec::is_zero")]
    pub ssh_port: u16,
    /// Service port.
    #[serde(default = "default_tikv_port")]
    pub port: u16,
    /// Status/metrics port.
    #[serde(default = "default_tikv_status_port")]
    pub status_port: u16,
    /// Deploy directory; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deploy_dir: String,
    /// Data directory; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_dir: String,
    /// Log directory; `log` under the deploy dir when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_dir: String,
    /// Placement labels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// NUMA node to bind to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub numa_node: String,
    /// Set when the store has been requested offline via PD.
    #[serde(default, skip_serializing_if = "is_false")]
    pub offline: bool,
    /// Instance-level configuration overriding `server_configs.tikv`.
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub config: ConfigMap,
    /// True for instances migrated from a legacy inventory.
    #[serde(default, skip_serializing_if = "is_false")]
    pub imported: bool,
}

/// A PD instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PdSpec {
    /// Member name; synthesized as `pd-<host>-<client_port>` when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Target host, required.
    pub host: String,
    /// SSH port; global default when zero.
    #[serde(default, skip_serializing_if = "crate::spec::is_zero")]
    pub ssh_port: u16,
    /// Client port.
    #[serde(default = "default_pd_client_port")]
    pub client_port: u16,
    /// Peer port.
    #[serde(default = "default_pd_peer_port")]
    pub peer_port: u16,
    /// Deploy directory; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deploy_dir: String,
    /// Data directory; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_dir: String,
    /// Log directory; `log` under the deploy dir when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_dir: String,
    /// NUMA node to bind to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub numa_node: String,
    /// Instance-level configuration overriding `server_configs.pd`.
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub config: ConfigMap,
    /// True for instances migrated from a legacy inventory.
    #[serde(default, skip_serializing_if = "is_false")]
    pub imported: bool,
}

/// A TiFlash instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TiflashSpec {
    /// Target host, required.
    pub host: String,
    /// SSH port; global default when zero.
    #[serde(default, skip_serializing_if = "crate::spec::is_zero")]
    pub ssh_port: u16,
    /// TCP service port, the primary port of the instance.
    #[serde(default = "default_tiflash_tcp_port")]
    pub tcp_port: u16,
    /// HTTP service port.
    #[serde(default = "default_tiflash_http_port")]
    pub http_port: u16,
    /// Flash service port.
    #[serde(default = "default_flash_service_port")]
    pub flash_service_port: u16,
    /// Proxy (learner) port.
    #[serde(default = "default_flash_proxy_port")]
    pub flash_proxy_port: u16,
    /// Proxy status port.
    #[serde(default = "default_flash_proxy_status_port")]
    pub flash_proxy_status_port: u16,
    /// Metrics port.
    #[serde(default = "default_tiflash_status_port")]
    pub status_port: u16,
    /// Deploy directory; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deploy_dir: String,
    /// Data directory; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_dir: String,
    /// Log directory; `log` under the deploy dir when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_dir: String,
    /// NUMA node to bind to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub numa_node: String,
    /// Instance-level configuration overriding `server_configs.tiflash`.
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub config: ConfigMap,
    /// Learner (proxy) configuration overriding
    /// `server_configs.tiflash-learner`.
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub learner_config: ConfigMap,
    /// True for instances migrated from a legacy inventory.
    #[serde(default, skip_serializing_if = "is_false")]
    pub imported: bool,
}

/// A Pump instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PumpSpec {
    /// Target host, required.
    pub host: String,
    /// SSH port; global default when zero.
    #[serde(default, skip_serializing_if = "crate::spec::is_zero")]
    pub ssh_port: u16,
    /// Service port.
    #[serde(default = "default_pump_port")]
    pub port: u16,
    /// Deploy directory; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deploy_dir: String,
    /// Data directory; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_dir: String,
    /// Log directory; `log` under the deploy dir when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_dir: String,
    /// NUMA node to bind to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub numa_node: String,
    /// Set when the pump has been requested offline via the binlog API.
    #[serde(default, skip_serializing_if = "is_false")]
    pub offline: bool,
    /// Instance-level configuration overriding `server_configs.pump`.
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub config: ConfigMap,
    /// True for instances migrated from a legacy inventory.
    #[serde(default, skip_serializing_if = "is_false")]
    pub imported: bool,
}

/// A Drainer instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DrainerSpec {
    /// Target host, required.
    pub host: String,
    /// SSH port; global default when zero.
    #[serde(default, skip_serializing_if = "crate::spec::is_zero")]
    pub ssh_port: u16,
    /// Service port.
    #[serde(default = "default_drainer_port")]
    pub port: u16,
    /// Deploy directory; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deploy_dir: String,
    /// Data directory; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_dir: String,
    /// Log directory; `log` under the deploy dir when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_dir: String,
    /// Replication starting point; best-effort, `-1` when unknown.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit_ts: String,
    /// NUMA node to bind to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub numa_node: String,
    /// Set when the drainer has been requested offline.
    #[serde(default, skip_serializing_if = "is_false")]
    pub offline: bool,
    /// Instance-level configuration overriding `server_configs.drainer`.
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub config: ConfigMap,
    /// True for instances migrated from a legacy inventory.
    #[serde(default, skip_serializing_if = "is_false")]
    pub imported: bool,
}

/// A Prometheus instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusSpec {
    /// Target host, required.
    pub host: String,
    /// SSH port; global default when zero.
    #[serde(default, skip_serializing_if = "crate::spec::is_zero")]
    pub ssh_port: u16,
    /// Web port.
    #[serde(default = "default_prometheus_port")]
    pub port: u16,
    /// Deploy directory; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deploy_dir: String,
    /// Data directory; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_dir: String,
    /// Log directory; `log` under the deploy dir when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_dir: String,
    /// True for instances migrated from a legacy inventory.
    #[serde(default, skip_serializing_if = "is_false")]
    pub imported: bool,
}

/// A Grafana instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrafanaSpec {
    /// Target host, required.
    pub host: String,
    /// SSH port; global default when zero.
    #[serde(default, skip_serializing_if = "crate::spec::is_zero")]
    pub ssh_port: u16,
    /// Web port.
    #[serde(default = "default_grafana_port")]
    pub port: u16,
    /// Deploy directory; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deploy_dir: String,
    /// True for instances migrated from a legacy inventory.
    #[serde(default, skip_serializing_if = "is_false")]
    pub imported: bool,
}

/// An AlertManager instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertmanagerSpec {
    /// Target host, required.
    pub host: String,
    /// SSH port; global default when zero.
    #[serde(default, skip_serializing_if = "crate::spec::is_zero")]
    pub ssh_port: u16,
    /// Web port, the primary port of the instance.
    #[serde(default = "default_alertmanager_web_port")]
    pub web_port: u16,
    /// Gossip port for alertmanager clustering.
    #[serde(default = "default_alertmanager_cluster_port")]
    pub cluster_port: u16,
    /// Deploy directory; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deploy_dir: String,
    /// Data directory; generated when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_dir: String,
    /// Log directory; `log` under the deploy dir when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_dir: String,
    /// True for instances migrated from a legacy inventory.
    #[serde(default, skip_serializing_if = "is_false")]
    pub imported: bool,
}

pub(crate) fn is_zero(v: &u16) -> bool {
    *v == 0
}

/// The complete declarative description of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Topology {
    /// Defaults shared by every group.
    #[serde(default)]
    pub global: GlobalOptions,

    /// Per-host monitoring agent configuration.
    #[serde(default)]
    pub monitored: MonitoredOptions,

    /// Per-role configuration defaults.
    #[serde(default, skip_serializing_if = "server_configs_is_empty")]
    pub server_configs: ServerConfigs,

    /// TiDB instances.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tidb_servers: Vec<TidbSpec>,

    /// TiKV instances.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tikv_servers: Vec<TikvSpec>,

    /// PD instances.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pd_servers: Vec<PdSpec>,

    /// TiFlash instances.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tiflash_servers: Vec<TiflashSpec>,

    /// Pump instances.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pump_servers: Vec<PumpSpec>,

    /// Drainer instances.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drainer_servers: Vec<DrainerSpec>,

    /// Prometheus instances.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub monitoring_servers: Vec<PrometheusSpec>,

    /// Grafana instances.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grafana_servers: Vec<GrafanaSpec>,

    /// AlertManager instances.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alertmanager_servers: Vec<AlertmanagerSpec>,
}

fn server_configs_is_empty(c: &ServerConfigs) -> bool {
    *c == ServerConfigs::default()
}

fn join_dir(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), child)
    }
}

fn default_dir(current: &mut String, parent: &str, role: &str, port: u16) {
    if current.is_empty() {
        *current = join_dir(parent, &format!("{}-{}", role, port));
    }
}

impl Topology {
    /// Parses a topology document, fills defaults and validates it.
    pub fn from_str(doc: &str) -> Result<Self> {
        let mut topo: Topology = serde_yaml::from_str(doc)?;
        topo.fill_defaults();
        topo.validate()?;
        Ok(topo)
    }

    /// Reads and parses a topology file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let doc = std::fs::read_to_string(path)?;
        Self::from_str(&doc)
    }

    /// Fills deterministic defaults, in the documented order:
    ///
    /// 1. global defaults (already applied during parsing),
    /// 2. per-instance ssh port and deploy/data dirs,
    /// 3. PD member names,
    /// 4. monitored agent dirs.
    pub fn fill_defaults(&mut self) {
        let global = self.global.clone();

        for s in &mut self.tidb_servers {
            if s.ssh_port == 0 {
                s.ssh_port = global.ssh_port;
            }
            default_dir(&mut s.deploy_dir, &global.deploy_dir, component::TIDB, s.port);
        }
        for s in &mut self.tikv_servers {
            if s.ssh_port == 0 {
                s.ssh_port = global.ssh_port;
            }
            default_dir(&mut s.deploy_dir, &global.deploy_dir, component::TIKV, s.port);
            default_dir(&mut s.data_dir, &global.data_dir, component::TIKV, s.port);
        }
        for s in &mut self.pd_servers {
            if s.ssh_port == 0 {
                s.ssh_port = global.ssh_port;
            }
            default_dir(&mut s.deploy_dir, &global.deploy_dir, component::PD, s.client_port);
            default_dir(&mut s.data_dir, &global.data_dir, component::PD, s.client_port);
            if s.name.is_empty() {
                s.name = format!("pd-{}-{}", s.host, s.client_port);
            }
        }
        for s in &mut self.tiflash_servers {
            if s.ssh_port == 0 {
                s.ssh_port = global.ssh_port;
            }
            default_dir(&mut s.deploy_dir, &global.deploy_dir, component::TIFLASH, s.tcp_port);
            default_dir(&mut s.data_dir, &global.data_dir, component::TIFLASH, s.tcp_port);
        }
        for s in &mut self.pump_servers {
            if s.ssh_port == 0 {
                s.ssh_port = global.ssh_port;
            }
            default_dir(&mut s.deploy_dir, &global.deploy_dir, component::PUMP, s.port);
            default_dir(&mut s.data_dir, &global.data_dir, component::PUMP, s.port);
        }
        for s in &mut self.drainer_servers {
            if s.ssh_port == 0 {
                s.ssh_port = global.ssh_port;
            }
            default_dir(&mut s.deploy_dir, &global.deploy_dir, component::DRAINER, s.port);
            default_dir(&mut s.data_dir, &global.data_dir, component::DRAINER, s.port);
        }
        for s in &mut self.monitoring_servers {
            if s.ssh_port == 0 {
                s.ssh_port = global.ssh_port;
            }
            default_dir(&mut s.deploy_dir, &global.deploy_dir, component::PROMETHEUS, s.port);
            default_dir(&mut s.data_dir, &global.data_dir, component::PROMETHEUS, s.port);
        }
        for s in &mut self.grafana_servers {
            if s.ssh_port == 0 {
                s.ssh_port = global.ssh_port;
            }
            default_dir(&mut s.deploy_dir, &global.deploy_dir, component::GRAFANA, s.port);
        }
        for s in &mut self.alertmanager_servers {
            if s.ssh_port == 0 {
                s.ssh_port = global.ssh_port;
            }
            default_dir(&mut s.deploy_dir, &global.deploy_dir, component::ALERTMANAGER, s.web_port);
            default_dir(&mut s.data_dir, &global.data_dir, component::ALERTMANAGER, s.web_port);
        }

        let monitor_dir = format!("monitor-{}", self.monitored.node_exporter_port);
        if self.monitored.deploy_dir.is_empty() {
            self.monitored.deploy_dir = join_dir(&global.deploy_dir, &monitor_dir);
        }
        if self.monitored.data_dir.is_empty() {
            self.monitored.data_dir = join_dir(&global.data_dir, &monitor_dir);
        }
    }

    /// Returns the PD endpoint list as `host:client_port` pairs.
    pub fn pd_endpoints(&self) -> Vec<String> {
        self.pd_servers
            .iter()
            .map(|pd| format!("{}:{}", pd.host, pd.client_port))
            .collect()
    }

    /// Returns a new topology with `that`'s instance groups appended.
    ///
    /// Global, monitored and server configs keep the receiver's values;
    /// a scale-out file only contributes instances.
    pub fn merge(&self, that: &Topology) -> Topology {
        let mut merged = self.clone();
        merged.tidb_servers.extend(that.tidb_servers.iter().cloned());
        merged.tikv_servers.extend(that.tikv_servers.iter().cloned());
        merged.pd_servers.extend(that.pd_servers.iter().cloned());
        merged
            .tiflash_servers
            .extend(that.tiflash_servers.iter().cloned());
        merged.pump_servers.extend(that.pump_servers.iter().cloned());
        merged
            .drainer_servers
            .extend(that.drainer_servers.iter().cloned());
        merged
            .monitoring_servers
            .extend(that.monitoring_servers.iter().cloned());
        merged
            .grafana_servers
            .extend(that.grafana_servers.iter().cloned());
        merged
            .alertmanager_servers
            .extend(that.alertmanager_servers.iter().cloned());
        merged
    }

    /// Serializes the topology back to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"
pd_servers:
  - host: 10.0.0.1
tikv_servers:
  - host: 10.0.0.1
  - host: 10.0.0.2
  - host: 10.0.0.3
tidb_servers:
  - host: 10.0.0.1
"#;

    #[test]
    fn test_defaults_fill_dirs_and_ports() {
        let topo = Topology::from_str(SMALL).unwrap();
        let pd = &topo.pd_servers[0];
        assert_eq!(pd.client_port, 2379);
        assert_eq!(pd.peer_port, 2380);
        assert_eq!(pd.ssh_port, 22);
        assert_eq!(pd.deploy_dir, "deploy/pd-2379");
        assert_eq!(pd.data_dir, "data/pd-2379");
        assert_eq!(pd.name, "pd-10.0.0.1-2379");

        let kv = &topo.tikv_servers[1];
        assert_eq!(kv.port, 20160);
        assert_eq!(kv.deploy_dir, "deploy/tikv-20160");

        let db = &topo.tidb_servers[0];
        assert_eq!(db.port, 4000);
        assert_eq!(db.status_port, 10080);
        assert_eq!(db.deploy_dir, "deploy/tidb-4000");

        assert_eq!(topo.monitored.deploy_dir, "deploy/monitor-9100");
        assert_eq!(topo.monitored.data_dir, "data/monitor-9100");
    }

    #[test]
    fn test_explicit_pd_name_kept() {
        let topo = Topology::from_str(
            "pd_servers:\n  - host: 10.0.0.1\n    name: pd-custom\n",
        )
        .unwrap();
        assert_eq!(topo.pd_servers[0].name, "pd-custom");
    }

    #[test]
    fn test_unknown_key_is_an_error() {
        let err = Topology::from_str(
            "tidb_servers:\n  - host: 10.0.0.1\n    prot: 4000\n",
        )
        .unwrap_err();
        assert!(matches!(err, TopologyError::Parse(_)), "{err}");
    }

    #[test]
    fn test_global_overrides_apply() {
        let topo = Topology::from_str(
            "global:\n  user: ops\n  ssh_port: 2222\n  deploy_dir: /srv/deploy\npd_servers:\n  - host: 10.0.0.1\n",
        )
        .unwrap();
        assert_eq!(topo.global.user, "ops");
        assert_eq!(topo.pd_servers[0].ssh_port, 2222);
        assert_eq!(topo.pd_servers[0].deploy_dir, "/srv/deploy/pd-2379");
    }

    /// Parsing, defaulting and serializing must be idempotent.
    #[test]
    fn test_round_trip_is_idempotent() {
        let topo = Topology::from_str(SMALL).unwrap();
        let yaml = topo.to_yaml().unwrap();
        let reparsed = Topology::from_str(&yaml).unwrap();
        assert_eq!(topo, reparsed);

        let yaml2 = reparsed.to_yaml().unwrap();
        assert_eq!(yaml, yaml2);
    }

    #[test]
    fn test_merge_appends_groups() {
        let base = Topology::from_str(SMALL).unwrap();
        let extra = Topology::from_str("tikv_servers:\n  - host: 10.0.0.4\n").unwrap();
        let merged = base.merge(&extra);
        assert_eq!(merged.tikv_servers.len(), 4);
        assert_eq!(merged.pd_servers.len(), 1);
        assert_eq!(merged.global, base.global);
    }

    #[test]
    fn test_pd_endpoints() {
        let topo = Topology::from_str(SMALL).unwrap();
        assert_eq!(topo.pd_endpoints(), vec!["10.0.0.1:2379".to_string()]);
    }
}
