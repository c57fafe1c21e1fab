//! The AlertManager role.

use tiops_executor::Executor;

use crate::error::Result;
use crate::instance::{DirPaths, Instance};
use crate::roles::common::{delegate_common, Common};
use crate::spec::{component, AlertmanagerSpec, Topology};
use crate::template::{AlertmanagerScript, ALERTMANAGER_CONFIG};

/// An AlertManager instance.
pub struct AlertmanagerInstance {
    spec: AlertmanagerSpec,
    common: Common,
}

/// Materializes all AlertManager instances of the topology.
pub fn instances(topo: &Topology) -> Vec<Box<dyn Instance>> {
    topo.alertmanager_servers
        .iter()
        .map(|s| {
            let mut used_dirs = vec![s.deploy_dir.clone()];
            if !s.data_dir.is_empty() {
                used_dirs.push(s.data_dir.clone());
            }
            Box::new(AlertmanagerInstance {
                common: Common {
                    component: component::ALERTMANAGER,
                    host: s.host.clone(),
                    port: s.web_port,
                    ssh_port: s.ssh_port,
                    deploy_dir: s.deploy_dir.clone(),
                    data_dir: Some(s.data_dir.clone()).filter(|d| !d.is_empty()),
                    log_dir: Some(s.log_dir.clone()).filter(|d| !d.is_empty()),
                    imported: s.imported,
                    used_ports: vec![s.web_port, s.cluster_port],
                    used_dirs,
                },
                spec: s.clone(),
            }) as Box<dyn Instance>
        })
        .collect()
}

impl Instance for AlertmanagerInstance {
    delegate_common!();

    fn status(&self, _pd_endpoints: &[String]) -> String {
        "-".to_string()
    }

    fn init_config(
        &self,
        exec: &dyn Executor,
        _topo: &Topology,
        _cluster: &str,
        user: &str,
        paths: &DirPaths,
    ) -> Result<()> {
        self.common.init_unit(exec, user, paths, false)?;

        let script = AlertmanagerScript {
            web_port: self.spec.web_port,
            cluster_port: self.spec.cluster_port,
            deploy_dir: paths.deploy.clone(),
            data_dir: paths.data.clone().unwrap_or_default(),
            log_dir: paths.log.clone(),
        }
        .render()?;
        self.common.upload_run_script(exec, &script, paths)?;

        self.common.upload_conf_file(
            exec,
            &format!("alertmanager_{}.yml", self.spec.host),
            ALERTMANAGER_CONFIG,
            paths,
            "alertmanager.yml",
        )
    }
}
