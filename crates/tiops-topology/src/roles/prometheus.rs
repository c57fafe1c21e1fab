//! The Prometheus role.

use tiops_executor::Executor;

use crate::error::Result;
use crate::instance::{DirPaths, Instance};
use crate::roles::common::{delegate_common, Common};
use crate::spec::{component, PrometheusSpec, Topology};
use crate::template::{PrometheusConfig, PrometheusScript};

/// A Prometheus instance.
pub struct PrometheusInstance {
    spec: PrometheusSpec,
    common: Common,
}

/// Materializes all Prometheus instances of the topology.
pub fn instances(topo: &Topology) -> Vec<Box<dyn Instance>> {
    topo.monitoring_servers
        .iter()
        .map(|s| {
            let mut used_dirs = vec![s.deploy_dir.clone()];
            if !s.data_dir.is_empty() {
                used_dirs.push(s.data_dir.clone());
            }
            Box::new(PrometheusInstance {
                common: Common {
                    component: component::PROMETHEUS,
                    host: s.host.clone(),
                    port: s.port,
                    ssh_port: s.ssh_port,
                    deploy_dir: s.deploy_dir.clone(),
                    data_dir: Some(s.data_dir.clone()).filter(|d| !d.is_empty()),
                    log_dir: Some(s.log_dir.clone()).filter(|d| !d.is_empty()),
                    imported: s.imported,
                    used_ports: vec![s.port],
                    used_dirs,
                },
                spec: s.clone(),
            }) as Box<dyn Instance>
        })
        .collect()
}

/// Builds the scrape configuration covering every instance and the
/// per-host exporters.
pub fn scrape_config(cluster: &str, topo: &Topology) -> PrometheusConfig {
    let mut cfg = PrometheusConfig::new(cluster);

    cfg.add_job(
        component::PD,
        topo.pd_servers
            .iter()
            .map(|s| format!("{}:{}", s.host, s.client_port))
            .collect(),
    );
    cfg.add_job(
        component::TIKV,
        topo.tikv_servers
            .iter()
            .map(|s| format!("{}:{}", s.host, s.status_port))
            .collect(),
    );
    cfg.add_job(
        component::TIDB,
        topo.tidb_servers
            .iter()
            .map(|s| format!("{}:{}", s.host, s.status_port))
            .collect(),
    );
    cfg.add_job(
        component::TIFLASH,
        topo.tiflash_servers
            .iter()
            .map(|s| format!("{}:{}", s.host, s.status_port))
            .collect(),
    );
    cfg.add_job(
        "tiflash-proxy",
        topo.tiflash_servers
            .iter()
            .map(|s| format!("{}:{}", s.host, s.flash_proxy_status_port))
            .collect(),
    );
    cfg.add_job(
        component::PUMP,
        topo.pump_servers
            .iter()
            .map(|s| format!("{}:{}", s.host, s.port))
            .collect(),
    );
    cfg.add_job(
        component::DRAINER,
        topo.drainer_servers
            .iter()
            .map(|s| format!("{}:{}", s.host, s.port))
            .collect(),
    );
    cfg.add_job(
        component::GRAFANA,
        topo.grafana_servers
            .iter()
            .map(|s| format!("{}:{}", s.host, s.port))
            .collect(),
    );

    let hosts = topo.unique_hosts();
    cfg.add_job(
        component::NODE_EXPORTER,
        hosts
            .iter()
            .map(|h| format!("{}:{}", h, topo.monitored.node_exporter_port))
            .collect(),
    );
    cfg.add_job(
        component::BLACKBOX_EXPORTER,
        hosts
            .iter()
            .map(|h| format!("{}:{}", h, topo.monitored.blackbox_exporter_port))
            .collect(),
    );

    cfg
}

impl Instance for PrometheusInstance {
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

        let script = PrometheusScript {
            host: self.spec.host.clone(),
            port: self.spec.port,
            deploy_dir: paths.deploy.clone(),
            data_dir: paths.data.clone().unwrap_or_default(),
            log_dir: paths.log.clone(),
        }
        .render()?;
        self.common.upload_run_script(exec, &script, paths)?;

        let prom = scrape_config(cluster, topo).render()?;
        self.common.upload_conf_file(
            exec,
            &format!("prometheus_{}.yml", self.spec.host),
            &prom,
            paths,
            "prometheus.yml",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_config_covers_roles_and_exporters() {
        let topo = Topology::from_str(
            "pd_servers:\n  - host: 10.0.0.1\ntikv_servers:\n  - host: 10.0.0.2\n",
        )
        .unwrap();
        let rendered = scrape_config("foo", &topo).render().unwrap();
        assert!(rendered.contains("job_name: \"pd\""));
        assert!(rendered.contains("- '10.0.0.1:2379'"));
        assert!(rendered.contains("- '10.0.0.2:20180'"));
        assert!(rendered.contains("job_name: \"node_exporter\""));
        assert!(rendered.contains("- '10.0.0.1:9100'"));
        assert!(rendered.contains("- '10.0.0.2:9115'"));
        // No tidb instances means no tidb job.
        assert!(!rendered.contains("job_name: \"tidb\""));
    }
}
