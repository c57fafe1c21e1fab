//! On-host artifacts: systemd units, run scripts and monitoring configs.
//!
//! Each artifact is a small struct rendered through an embedded
//! template; the struct carries exactly the substitutions the template
//! uses. Paths handed to these builders are expected to be absolute
//! already.

use serde::Serialize;
use tera::{Context, Tera};

use crate::error::{Result, TopologyError};

fn render(what: &str, tpl: &str, data: &impl Serialize) -> Result<String> {
    let ctx = Context::from_serialize(data)
        .map_err(|e| TopologyError::render(what, e.to_string()))?;
    Tera::one_off(tpl, &ctx, false).map_err(|e| TopologyError::render(what, e.to_string()))
}

const SYSTEMD_UNIT_TPL: &str = "\
[Unit]
Description={{ service_name }} service
After=syslog.target network.target remote-fs.target nss-lookup.target

[Service]
LimitNOFILE=1000000
LimitSTACK=10485760
{% if memory_limit %}MemoryLimit={{ memory_limit }}
{% endif %}{% if cpu_quota %}CPUQuota={{ cpu_quota }}
{% endif %}{% if io_read_bandwidth_max %}IOReadBandwidthMax={{ io_read_bandwidth_max }}
{% endif %}{% if io_write_bandwidth_max %}IOWriteBandwidthMax={{ io_write_bandwidth_max }}
{% endif %}User={{ user }}
ExecStart=/bin/bash -c '{{ deploy_dir }}/scripts/run_{{ component }}.sh'
Restart={{ restart }}
RestartSec=15s

[Install]
WantedBy=multi-user.target
";

/// A rendered systemd unit for one component instance.
#[derive(Debug, Clone, Serialize)]
pub struct SystemdUnit {
    /// Component the unit runs, names the run script.
    pub component: String,
    /// Unit description name.
    pub service_name: String,
    /// User the service runs as.
    pub user: String,
    /// Absolute deploy directory.
    pub deploy_dir: String,
    /// Restart policy, `always` or `on-failure`.
    pub restart: String,
    /// Optional systemd MemoryLimit value.
    pub memory_limit: Option<String>,
    /// Optional systemd CPUQuota value.
    pub cpu_quota: Option<String>,
    /// Optional systemd IOReadBandwidthMax value.
    pub io_read_bandwidth_max: Option<String>,
    /// Optional systemd IOWriteBandwidthMax value.
    pub io_write_bandwidth_max: Option<String>,
}

impl SystemdUnit {
    /// Creates a unit with the always-restart policy.
    ///
    /// Pump and Drainer callers switch to `on-failure` so a binlog
    /// offline requested through the API is not undone by systemd.
    pub fn new(component: impl Into<String>, user: impl Into<String>, deploy_dir: impl Into<String>) -> Self {
        let component = component.into();
        Self {
            service_name: component.clone(),
            component,
            user: user.into(),
            deploy_dir: deploy_dir.into(),
            restart: "always".to_string(),
            memory_limit: None,
            cpu_quota: None,
            io_read_bandwidth_max: None,
            io_write_bandwidth_max: None,
        }
    }

    /// Sets the restart policy to `on-failure`.
    pub fn restart_on_failure(mut self) -> Self {
        self.restart = "on-failure".to_string();
        self
    }

    /// Sets the MemoryLimit directive.
    pub fn with_memory_limit(mut self, limit: impl Into<String>) -> Self {
        self.memory_limit = Some(limit.into());
        self
    }

    /// Sets the CPUQuota directive.
    pub fn with_cpu_quota(mut self, quota: impl Into<String>) -> Self {
        self.cpu_quota = Some(quota.into());
        self
    }

    /// Sets the IOReadBandwidthMax directive.
    pub fn with_io_read_bandwidth_max(mut self, v: impl Into<String>) -> Self {
        self.io_read_bandwidth_max = Some(v.into());
        self
    }

    /// Sets the IOWriteBandwidthMax directive.
    pub fn with_io_write_bandwidth_max(mut self, v: impl Into<String>) -> Self {
        self.io_write_bandwidth_max = Some(v.into());
        self
    }

    /// Renders the unit file content.
    pub fn render(&self) -> Result<String> {
        render("systemd unit", SYSTEMD_UNIT_TPL, self)
    }
}

const PD_SCRIPT_TPL: &str = "\
#!/bin/bash
set -e

# WARNING: This file was auto-generated. Do not edit!
DEPLOY_DIR={{ deploy_dir }}
cd \"${DEPLOY_DIR}\" || exit 1

{% if numa_node %}exec numactl --cpunodebind={{ numa_node }} --membind={{ numa_node }} bin/pd-server \\
{% else %}exec bin/pd-server \\
{% endif %}    --name=\"{{ name }}\" \\
    --client-urls=\"http://0.0.0.0:{{ client_port }}\" \\
    --advertise-client-urls=\"http://{{ host }}:{{ client_port }}\" \\
    --peer-urls=\"http://0.0.0.0:{{ peer_port }}\" \\
    --advertise-peer-urls=\"http://{{ host }}:{{ peer_port }}\" \\
    --data-dir=\"{{ data_dir }}\" \\
{% if join %}    --join=\"{{ join }}\" \\
{% else %}    --initial-cluster=\"{{ initial_cluster }}\" \\
{% endif %}    --config=conf/pd.toml \\
    --log-file=\"{{ log_dir }}/pd.log\" 2>> \"{{ log_dir }}/pd_stderr.log\"
";

/// Run script of a PD instance.
#[derive(Debug, Clone, Serialize)]
pub struct PdScript {
    /// PD member name.
    pub name: String,
    /// Advertised host.
    pub host: String,
    /// Client port.
    pub client_port: u16,
    /// Peer port.
    pub peer_port: u16,
    /// Absolute deploy dir.
    pub deploy_dir: String,
    /// Absolute data dir.
    pub data_dir: String,
    /// Absolute log dir.
    pub log_dir: String,
    /// NUMA node to bind to.
    pub numa_node: Option<String>,
    /// `name=http://host:peer_port` pairs of the whole PD group.
    pub initial_cluster: String,
    /// When scaling out, the client URLs to join instead of the
    /// initial cluster.
    pub join: Option<String>,
}

impl PdScript {
    /// Renders the run script content.
    pub fn render(&self) -> Result<String> {
        render("pd run script", PD_SCRIPT_TPL, self)
    }
}

const TIKV_SCRIPT_TPL: &str = "\
#!/bin/bash
set -e

# WARNING: This file was auto-generated. Do not edit!
DEPLOY_DIR={{ deploy_dir }}
cd \"${DEPLOY_DIR}\" || exit 1

{% if numa_node %}exec numactl --cpunodebind={{ numa_node }} --membind={{ numa_node }} bin/tikv-server \\
{% else %}exec bin/tikv-server \\
{% endif %}    --addr \"0.0.0.0:{{ port }}\" \\
    --advertise-addr \"{{ host }}:{{ port }}\" \\
    --status-addr \"{{ host }}:{{ status_port }}\" \\
    --pd \"{{ pd }}\" \\
    --data-dir \"{{ data_dir }}\" \\
    --config conf/tikv.toml \\
    --log-file \"{{ log_dir }}/tikv.log\" 2>> \"{{ log_dir }}/tikv_stderr.log\"
";

/// Run script of a TiKV instance.
#[derive(Debug, Clone, Serialize)]
pub struct TikvScript {
    /// Advertised host.
    pub host: String,
    /// Service port.
    pub port: u16,
    /// Status port.
    pub status_port: u16,
    /// Absolute deploy dir.
    pub deploy_dir: String,
    /// Absolute data dir.
    pub data_dir: String,
    /// Absolute log dir.
    pub log_dir: String,
    /// NUMA node to bind to.
    pub numa_node: Option<String>,
    /// Comma-joined PD endpoints.
    pub pd: String,
}

impl TikvScript {
    /// Renders the run script content.
    pub fn render(&self) -> Result<String> {
        render("tikv run script", TIKV_SCRIPT_TPL, self)
    }
}

const TIDB_SCRIPT_TPL: &str = "\
#!/bin/bash
set -e

# WARNING: This file was auto-generated. Do not edit!
DEPLOY_DIR={{ deploy_dir }}
cd \"${DEPLOY_DIR}\" || exit 1

{% if numa_node %}exec numactl --cpunodebind={{ numa_node }} --membind={{ numa_node }} bin/tidb-server \\
{% else %}exec bin/tidb-server \\
{% endif %}    -P {{ port }} \\
    --status=\"{{ status_port }}\" \\
    --host=\"0.0.0.0\" \\
    --advertise-address=\"{{ host }}\" \\
    --store=\"tikv\" \\
    --path=\"{{ pd }}\" \\
    --config=conf/tidb.toml \\
    --log-slow-query=\"{{ log_dir }}/tidb_slow_query.log\" \\
    --log-file=\"{{ log_dir }}/tidb.log\" 2>> \"{{ log_dir }}/tidb_stderr.log\"
";

/// Run script of a TiDB instance.
#[derive(Debug, Clone, Serialize)]
pub struct TidbScript {
    /// Advertised host.
    pub host: String,
    /// Client port.
    pub port: u16,
    /// Status port.
    pub status_port: u16,
    /// Absolute deploy dir.
    pub deploy_dir: String,
    /// Absolute log dir.
    pub log_dir: String,
    /// NUMA node to bind to.
    pub numa_node: Option<String>,
    /// Comma-joined PD endpoints.
    pub pd: String,
}

impl TidbScript {
    /// Renders the run script content.
    pub fn render(&self) -> Result<String> {
        render("tidb run script", TIDB_SCRIPT_TPL, self)
    }
}

const TIFLASH_SCRIPT_TPL: &str = "\
#!/bin/bash
set -e

# WARNING: This file was auto-generated. Do not edit!
DEPLOY_DIR={{ deploy_dir }}
cd \"${DEPLOY_DIR}\" || exit 1

{% if numa_node %}exec numactl --cpunodebind={{ numa_node }} --membind={{ numa_node }} bin/tiflash/tiflash server \\
{% else %}exec bin/tiflash/tiflash server \\
{% endif %}    --config-file conf/tiflash.toml 2>> \"{{ log_dir }}/tiflash_stderr.log\"
";

/// Run script of a TiFlash instance.
#[derive(Debug, Clone, Serialize)]
pub struct TiflashScript {
    /// Absolute deploy dir.
    pub deploy_dir: String,
    /// Absolute log dir.
    pub log_dir: String,
    /// NUMA node to bind to.
    pub numa_node: Option<String>,
}

impl TiflashScript {
    /// Renders the run script content.
    pub fn render(&self) -> Result<String> {
        render("tiflash run script", TIFLASH_SCRIPT_TPL, self)
    }
}

const PUMP_SCRIPT_TPL: &str = "\
#!/bin/bash
set -e

# WARNING: This file was auto-generated. Do not edit!
DEPLOY_DIR={{ deploy_dir }}
cd \"${DEPLOY_DIR}\" || exit 1

exec bin/pump \\
    --node-id=\"{{ host }}:{{ port }}\" \\
    --addr=\"0.0.0.0:{{ port }}\" \\
    --advertise-addr=\"{{ host }}:{{ port }}\" \\
    --pd-urls=\"{{ pd }}\" \\
    --data-dir=\"{{ data_dir }}\" \\
    --config=conf/pump.toml \\
    --log-file=\"{{ log_dir }}/pump.log\" 2>> \"{{ log_dir }}/pump_stderr.log\"
";

/// Run script of a Pump instance.
#[derive(Debug, Clone, Serialize)]
pub struct PumpScript {
    /// Advertised host.
    pub host: String,
    /// Service port.
    pub port: u16,
    /// Absolute deploy dir.
    pub deploy_dir: String,
    /// Absolute data dir.
    pub data_dir: String,
    /// Absolute log dir.
    pub log_dir: String,
    /// Comma-joined `http://` PD endpoints.
    pub pd: String,
}

impl PumpScript {
    /// Renders the run script content.
    pub fn render(&self) -> Result<String> {
        render("pump run script", PUMP_SCRIPT_TPL, self)
    }
}

const DRAINER_SCRIPT_TPL: &str = "\
#!/bin/bash
set -e

# WARNING: This file was auto-generated. Do not edit!
DEPLOY_DIR={{ deploy_dir }}
cd \"${DEPLOY_DIR}\" || exit 1

exec bin/drainer \\
    --node-id=\"{{ host }}:{{ port }}\" \\
    --addr=\"{{ host }}:{{ port }}\" \\
    --pd-urls=\"{{ pd }}\" \\
    --data-dir=\"{{ data_dir }}\" \\
    --initial-commit-ts={{ commit_ts }} \\
    --config=conf/drainer.toml \\
    --log-file=\"{{ log_dir }}/drainer.log\" 2>> \"{{ log_dir }}/drainer_stderr.log\"
";

/// Run script of a Drainer instance.
#[derive(Debug, Clone, Serialize)]
pub struct DrainerScript {
    /// Advertised host.
    pub host: String,
    /// Service port.
    pub port: u16,
    /// Absolute deploy dir.
    pub deploy_dir: String,
    /// Absolute data dir.
    pub data_dir: String,
    /// Absolute log dir.
    pub log_dir: String,
    /// Comma-joined `http://` PD endpoints.
    pub pd: String,
    /// Replication starting point, `-1` when unknown.
    pub commit_ts: String,
}

impl DrainerScript {
    /// Renders the run script content.
    pub fn render(&self) -> Result<String> {
        render("drainer run script", DRAINER_SCRIPT_TPL, self)
    }
}

const PROMETHEUS_SCRIPT_TPL: &str = "\
#!/bin/bash
set -e

# WARNING: This file was auto-generated. Do not edit!
DEPLOY_DIR={{ deploy_dir }}
cd \"${DEPLOY_DIR}\" || exit 1

exec bin/prometheus/prometheus \\
    --config.file=\"{{ deploy_dir }}/conf/prometheus.yml\" \\
    --web.listen-address=\":{{ port }}\" \\
    --web.external-url=\"http://{{ host }}:{{ port }}/\" \\
    --storage.tsdb.path=\"{{ data_dir }}\" \\
    --storage.tsdb.retention=\"15d\" \\
    --log.level=\"info\" 2>> \"{{ log_dir }}/prometheus_stderr.log\"
";

/// Run script of a Prometheus instance.
#[derive(Debug, Clone, Serialize)]
pub struct PrometheusScript {
    /// Advertised host.
    pub host: String,
    /// Web port.
    pub port: u16,
    /// Absolute deploy dir.
    pub deploy_dir: String,
    /// Absolute data dir.
    pub data_dir: String,
    /// Absolute log dir.
    pub log_dir: String,
}

impl PrometheusScript {
    /// Renders the run script content.
    pub fn render(&self) -> Result<String> {
        render("prometheus run script", PROMETHEUS_SCRIPT_TPL, self)
    }
}

const GRAFANA_SCRIPT_TPL: &str = "\
#!/bin/bash
set -e

# WARNING: This file was auto-generated. Do not edit!
DEPLOY_DIR={{ deploy_dir }}
cd \"${DEPLOY_DIR}\" || exit 1

exec bin/grafana-server \\
    --homepath=\"{{ deploy_dir }}/bin\" \\
    --config=\"{{ deploy_dir }}/conf/grafana.ini\"
";

/// Run script of a Grafana instance.
#[derive(Debug, Clone, Serialize)]
pub struct GrafanaScript {
    /// Absolute deploy dir.
    pub deploy_dir: String,
}

impl GrafanaScript {
    /// Renders the run script content.
    pub fn render(&self) -> Result<String> {
        render("grafana run script", GRAFANA_SCRIPT_TPL, self)
    }
}

const ALERTMANAGER_SCRIPT_TPL: &str = "\
#!/bin/bash
set -e

# WARNING: This file was auto-generated. Do not edit!
DEPLOY_DIR={{ deploy_dir }}
cd \"${DEPLOY_DIR}\" || exit 1

exec bin/alertmanager/alertmanager \\
    --config.file=\"conf/alertmanager.yml\" \\
    --storage.path=\"{{ data_dir }}\" \\
    --data.retention=120h \\
    --log.level=\"info\" \\
    --web.listen-address=\":{{ web_port }}\" \\
    --cluster.listen-address=\":{{ cluster_port }}\" 2>> \"{{ log_dir }}/alertmanager_stderr.log\"
";

/// Run script of an AlertManager instance.
#[derive(Debug, Clone, Serialize)]
pub struct AlertmanagerScript {
    /// Web port.
    pub web_port: u16,
    /// Cluster gossip port.
    pub cluster_port: u16,
    /// Absolute deploy dir.
    pub deploy_dir: String,
    /// Absolute data dir.
    pub data_dir: String,
    /// Absolute log dir.
    pub log_dir: String,
}

impl AlertmanagerScript {
    /// Renders the run script content.
    pub fn render(&self) -> Result<String> {
        render("alertmanager run script", ALERTMANAGER_SCRIPT_TPL, self)
    }
}

const NODE_EXPORTER_SCRIPT_TPL: &str = "\
#!/bin/bash
set -e

# WARNING: This file was auto-generated. Do not edit!
DEPLOY_DIR={{ deploy_dir }}
cd \"${DEPLOY_DIR}\" || exit 1

exec bin/node_exporter/node_exporter \\
    --web.listen-address=\":{{ port }}\" \\
    --collector.tcpstat \\
    --collector.systemd \\
    --collector.mountstats \\
    --collector.meminfo_numa \\
    --collector.interrupts \\
    --collector.vmstat.fields=\"^.*\" \\
    --log.level=\"info\" 2>> \"{{ log_dir }}/node_exporter_stderr.log\"
";

/// Run script of the per-host node exporter.
#[derive(Debug, Clone, Serialize)]
pub struct NodeExporterScript {
    /// Exporter port.
    pub port: u16,
    /// Absolute deploy dir.
    pub deploy_dir: String,
    /// Absolute log dir.
    pub log_dir: String,
}

impl NodeExporterScript {
    /// Renders the run script content.
    pub fn render(&self) -> Result<String> {
        render("node_exporter run script", NODE_EXPORTER_SCRIPT_TPL, self)
    }
}

const BLACKBOX_EXPORTER_SCRIPT_TPL: &str = "\
#!/bin/bash
set -e

# WARNING: This file was auto-generated. Do not edit!
DEPLOY_DIR={{ deploy_dir }}
cd \"${DEPLOY_DIR}\" || exit 1

exec bin/blackbox_exporter/blackbox_exporter \\
    --web.listen-address=\":{{ port }}\" \\
    --log.level=\"info\" \\
    --config.file=\"conf/blackbox.yml\" 2>> \"{{ log_dir }}/blackbox_exporter_stderr.log\"
";

/// Run script of the per-host blackbox exporter.
#[derive(Debug, Clone, Serialize)]
pub struct BlackboxExporterScript {
    /// Exporter port.
    pub port: u16,
    /// Absolute deploy dir.
    pub deploy_dir: String,
    /// Absolute log dir.
    pub log_dir: String,
}

impl BlackboxExporterScript {
    /// Renders the run script content.
    pub fn render(&self) -> Result<String> {
        render(
            "blackbox_exporter run script",
            BLACKBOX_EXPORTER_SCRIPT_TPL,
            self,
        )
    }
}

const PROMETHEUS_CONFIG_TPL: &str = "\
global:
  scrape_interval: 15s
  evaluation_interval: 15s
  external_labels:
    cluster: '{{ cluster_name }}'
    monitor: \"prometheus\"

scrape_configs:
{% for job in jobs %}  - job_name: \"{{ job.name }}\"
    honor_labels: true
    static_configs:
      - targets:
{% for target in job.targets %}        - '{{ target }}'
{% endfor %}{% endfor %}";

/// One scrape job of the generated prometheus config.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeJob {
    /// Job name, the component name.
    pub name: String,
    /// `host:port` targets.
    pub targets: Vec<String>,
}

/// The generated `prometheus.yml`.
#[derive(Debug, Clone, Serialize)]
pub struct PrometheusConfig {
    /// Cluster name stamped into external labels.
    pub cluster_name: String,
    /// Scrape jobs, one per component with instances.
    pub jobs: Vec<ScrapeJob>,
}

impl PrometheusConfig {
    /// Creates an empty config for `cluster_name`.
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            jobs: Vec::new(),
        }
    }

    /// Adds a scrape job unless its target list is empty.
    pub fn add_job(&mut self, name: impl Into<String>, targets: Vec<String>) {
        if !targets.is_empty() {
            self.jobs.push(ScrapeJob {
                name: name.into(),
                targets,
            });
        }
    }

    /// Renders the config content.
    pub fn render(&self) -> Result<String> {
        render("prometheus config", PROMETHEUS_CONFIG_TPL, self)
    }
}

const GRAFANA_INI_TPL: &str = "\
[paths]
data = {{ deploy_dir }}/data
logs = {{ deploy_dir }}/log
plugins = {{ deploy_dir }}/plugins
provisioning = {{ deploy_dir }}/provisioning

[server]
http_port = {{ port }}
domain = {{ host }}

[users]
default_theme = light

[log]
mode = file

[log.file]
level = info
format = text
";

/// The generated `grafana.ini`.
#[derive(Debug, Clone, Serialize)]
pub struct GrafanaConfig {
    /// Host grafana serves on.
    pub host: String,
    /// Web port.
    pub port: u16,
    /// Absolute deploy dir.
    pub deploy_dir: String,
}

impl GrafanaConfig {
    /// Renders the config content.
    pub fn render(&self) -> Result<String> {
        render("grafana config", GRAFANA_INI_TPL, self)
    }
}

const DATASOURCE_TPL: &str = "\
apiVersion: 1
datasources:
  - name: {{ cluster_name }}
    type: prometheus
    access: proxy
    url: http://{{ prometheus_addr }}
    withCredentials: false
    isDefault: false
    tlsAuth: false
    tlsAuthWithCACert: false
    version: 1
    editable: true
";

/// The generated grafana `datasource.yml`.
#[derive(Debug, Clone, Serialize)]
pub struct DatasourceConfig {
    /// Cluster name, used as the datasource name.
    pub cluster_name: String,
    /// `host:port` of the prometheus instance.
    pub prometheus_addr: String,
}

impl DatasourceConfig {
    /// Renders the config content.
    pub fn render(&self) -> Result<String> {
        render("grafana datasource", DATASOURCE_TPL, self)
    }
}

const DASHBOARD_TPL: &str = "\
apiVersion: 1
providers:
  - name: {{ cluster_name }}
    folder: {{ cluster_name }}
    type: file
    disableDeletion: false
    editable: true
    updateIntervalSeconds: 30
    options:
      path: {{ deploy_dir }}/dashboards
";

/// The generated grafana `dashboard.yml`.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardConfig {
    /// Cluster name, used as the provider and folder name.
    pub cluster_name: String,
    /// Absolute deploy dir.
    pub deploy_dir: String,
}

impl DashboardConfig {
    /// Renders the config content.
    pub fn render(&self) -> Result<String> {
        render("grafana dashboard provider", DASHBOARD_TPL, self)
    }
}

/// The static `alertmanager.yml` shipped with new clusters.
pub const ALERTMANAGER_CONFIG: &str = "\
global:
  resolve_timeout: 5m

route:
  receiver: 'blackhole'
  group_by: ['env', 'instance', 'alertname', 'type', 'group', 'job']
  group_wait: 30s
  group_interval: 3m
  repeat_interval: 3m

receivers:
  - name: 'blackhole'
";

/// The static `blackbox.yml` shipped to every monitored host.
pub const BLACKBOX_CONFIG: &str = "\
modules:
  http_2xx:
    prober: http
    http:
      method: GET
  tcp_connect:
    prober: tcp
  icmp:
    prober: icmp
    icmp:
      preferred_ip_protocol: \"ip4\"
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_systemd_unit_substitutes_fields() {
        let unit = SystemdUnit::new("tikv", "tidb", "/home/tidb/deploy/tikv-20160")
            .with_memory_limit("32G");
        let out = unit.render().unwrap();
        assert!(out.contains("User=tidb"));
        assert!(out.contains("MemoryLimit=32G"));
        assert!(out.contains("Restart=always"));
        assert!(out.contains("run_tikv.sh"));
    }

    #[test]
    fn test_binlog_unit_restarts_on_failure() {
        let unit = SystemdUnit::new("pump", "tidb", "/d").restart_on_failure();
        let out = unit.render().unwrap();
        assert!(out.contains("Restart=on-failure"));
        assert!(!out.contains("MemoryLimit"));
    }

    #[test]
    fn test_pd_script_initial_cluster() {
        let script = PdScript {
            name: "pd-10.0.0.1-2379".to_string(),
            host: "10.0.0.1".to_string(),
            client_port: 2379,
            peer_port: 2380,
            deploy_dir: "/home/tidb/deploy/pd-2379".to_string(),
            data_dir: "/home/tidb/data/pd-2379".to_string(),
            log_dir: "/home/tidb/deploy/pd-2379/log".to_string(),
            numa_node: None,
            initial_cluster: "pd-10.0.0.1-2379=http://10.0.0.1:2380".to_string(),
            join: None,
        };
        let out = script.render().unwrap();
        assert!(out.contains("--initial-cluster=\"pd-10.0.0.1-2379=http://10.0.0.1:2380\""));
        assert!(!out.contains("--join"));
        assert!(out.contains("exec bin/pd-server"));
    }

    #[test]
    fn test_pd_script_join_mode_for_scale_out() {
        let script = PdScript {
            name: "pd-10.0.0.2-2379".to_string(),
            host: "10.0.0.2".to_string(),
            client_port: 2379,
            peer_port: 2380,
            deploy_dir: "/d".to_string(),
            data_dir: "/data".to_string(),
            log_dir: "/d/log".to_string(),
            numa_node: None,
            initial_cluster: String::new(),
            join: Some("http://10.0.0.1:2379".to_string()),
        };
        let out = script.render().unwrap();
        assert!(out.contains("--join=\"http://10.0.0.1:2379\""));
        assert!(!out.contains("--initial-cluster"));
    }

    #[test]
    fn test_numa_binding_wraps_exec() {
        let script = TikvScript {
            host: "10.0.0.1".to_string(),
            port: 20160,
            status_port: 20180,
            deploy_dir: "/d".to_string(),
            data_dir: "/data".to_string(),
            log_dir: "/d/log".to_string(),
            numa_node: Some("0".to_string()),
            pd: "10.0.0.1:2379".to_string(),
        };
        let out = script.render().unwrap();
        assert!(out.contains("numactl --cpunodebind=0 --membind=0 bin/tikv-server"));
    }

    #[test]
    fn test_prometheus_config_lists_targets() {
        let mut cfg = PrometheusConfig::new("foo");
        cfg.add_job("tidb", vec!["10.0.0.1:10080".to_string()]);
        cfg.add_job("tikv", vec![]);
        let out = cfg.render().unwrap();
        assert!(out.contains("cluster: 'foo'"));
        assert!(out.contains("job_name: \"tidb\""));
        assert!(out.contains("- '10.0.0.1:10080'"));
        // Empty target lists are dropped entirely.
        assert!(!out.contains("tikv"));
    }

    #[test]
    fn test_drainer_script_carries_commit_ts() {
        let script = DrainerScript {
            host: "10.0.0.9".to_string(),
            port: 8249,
            deploy_dir: "/d".to_string(),
            data_dir: "/data".to_string(),
            log_dir: "/d/log".to_string(),
            pd: "http://10.0.0.1:2379".to_string(),
            commit_ts: "-1".to_string(),
        };
        let out = script.render().unwrap();
        assert!(out.contains("--initial-commit-ts=-1"));
    }
}
