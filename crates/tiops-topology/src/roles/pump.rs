//! The Pump role.

use tiops_executor::Executor;

use crate::error::Result;
use crate::instance::{DirPaths, Instance};
use crate::roles::common::{delegate_common, pd_urls, status_by_url, Common};
use crate::spec::{component, PumpSpec, Topology};
use crate::template::PumpScript;

/// A Pump instance.
pub struct PumpInstance {
    spec: PumpSpec,
    common: Common,
}

impl PumpInstance {
    /// True when the pump has been requested offline.
    pub fn is_offline(&self) -> bool {
        self.spec.offline
    }
}

/// Materializes all Pump instances of the topology.
pub fn instances(topo: &Topology) -> Vec<Box<dyn Instance>> {
    topo.pump_servers
        .iter()
        .map(|s| {
            let mut used_dirs = vec![s.deploy_dir.clone()];
            if !s.data_dir.is_empty() {
                used_dirs.push(s.data_dir.clone());
            }
            Box::new(PumpInstance {
                common: Common {
                    component: component::PUMP,
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

impl Instance for PumpInstance {
    delegate_common!();

    fn status(&self, _pd_endpoints: &[String]) -> String {
        status_by_url(&self.spec.host, self.spec.port, "status")
    }

    fn init_config(
        &self,
        exec: &dyn Executor,
        topo: &Topology,
        _cluster: &str,
        user: &str,
        paths: &DirPaths,
    ) -> Result<()> {
        // on-failure so a binlogctl offline is not undone by systemd.
        self.common.init_unit(exec, user, paths, true)?;

        let script = PumpScript {
            host: self.spec.host.clone(),
            port: self.spec.port,
            deploy_dir: paths.deploy.clone(),
            data_dir: paths.data.clone().unwrap_or_default(),
            log_dir: paths.log.clone(),
            pd: pd_urls(topo),
        }
        .render()?;
        self.common.upload_run_script(exec, &script, paths)?;

        self.common.upload_merged_config(
            exec,
            component::PUMP,
            &topo.server_configs.pump,
            &self.spec.config,
            paths,
        )
    }
}
