//! The Grafana role.

use tiops_executor::Executor;

use crate::error::{Result, TopologyError};
use crate::instance::{DirPaths, Instance};
use crate::roles::common::{delegate_common, Common};
use crate::spec::{component, GrafanaSpec, Topology};
use crate::template::{DashboardConfig, DatasourceConfig, GrafanaConfig, GrafanaScript};

/// A Grafana instance.
pub struct GrafanaInstance {
    spec: GrafanaSpec,
    common: Common,
}

/// Materializes all Grafana instances of the topology.
pub fn instances(topo: &Topology) -> Vec<Box<dyn Instance>> {
    topo.grafana_servers
        .iter()
        .map(|s| {
            Box::new(GrafanaInstance {
                common: Common {
                    component: component::GRAFANA,
                    host: s.host.clone(),
                    port: s.port,
                    ssh_port: s.ssh_port,
                    deploy_dir: s.deploy_dir.clone(),
                    data_dir: None,
                    log_dir: None,
                    imported: s.imported,
                    used_ports: vec![s.port],
                    used_dirs: vec![s.deploy_dir.clone()],
                },
                spec: s.clone(),
            }) as Box<dyn Instance>
        })
        .collect()
}

impl Instance for GrafanaInstance {
    delegate_common!();

    fn status(&self, _pd_endpoints: &[String]) -> String {
        "-".to_string()
    }

    fn init_config(
        &self,
        exec: &dyn Executor,
        topo: &Topology,
        cluster: &str,
        user: &str,
        paths: &DirPaths,
    ) -> Result<()> {
        self.common.init_unit(exec, user, paths, false)?;

        let script = GrafanaScript {
            deploy_dir: paths.deploy.clone(),
        }
        .render()?;
        self.common.upload_run_script(exec, &script, paths)?;

        let ini = GrafanaConfig {
            host: self.spec.host.clone(),
            port: self.spec.port,
            deploy_dir: paths.deploy.clone(),
        }
        .render()?;
        self.common.upload_conf_file(
            exec,
            &format!("grafana_{}.ini", self.spec.host),
            &ini,
            paths,
            "grafana.ini",
        )?;

        let dashboard = DashboardConfig {
            cluster_name: cluster.to_string(),
            deploy_dir: paths.deploy.clone(),
        }
        .render()?;
        self.common.upload_conf_file(
            exec,
            &format!("dashboard_{}.yml", self.spec.host),
            &dashboard,
            paths,
            "dashboard.yml",
        )?;

        // The datasource points at the cluster's prometheus instance.
        let prometheus = topo.monitoring_servers.first().ok_or_else(|| {
            TopologyError::render("grafana datasource", "no prometheus found in topology")
        })?;
        let datasource = DatasourceConfig {
            cluster_name: cluster.to_string(),
            prometheus_addr: format!("{}:{}", prometheus.host, prometheus.port),
        }
        .render()?;
        self.common.upload_conf_file(
            exec,
            &format!("datasource_{}.yml", self.spec.host),
            &datasource,
            paths,
            "datasource.yml",
        )
    }
}
