//! The Drainer role.

use tiops_executor::Executor;

use crate::error::Result;
use crate::instance::{DirPaths, Instance};
use crate::roles::common::{delegate_common, pd_urls, status_by_url, Common};
use crate::spec::{component, DrainerSpec, Topology};
use crate::template::DrainerScript;

/// A Drainer instance.
pub struct DrainerInstance {
    spec: DrainerSpec,
    common: Common,
}

impl DrainerInstance {
    /// True when the drainer has been requested offline.
    pub fn is_offline(&self) -> bool {
        self.spec.offline
    }
}

/// Materializes all Drainer instances of the topology.
pub fn instances(topo: &Topology) -> Vec<Box<dyn Instance>> {
    topo.drainer_servers
        .iter()
        .map(|s| {
            let mut used_dirs = vec![s.deploy_dir.clone()];
            if !s.data_dir.is_empty() {
                used_dirs.push(s.data_dir.clone());
            }
            Box::new(DrainerInstance {
                common: Common {
                    component: component::DRAINER,
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

impl Instance for DrainerInstance {
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

        // commit_ts is best-effort; fall back to -1 (resume from the
        // latest checkpoint).
        let commit_ts = if self.spec.commit_ts.is_empty() {
            "-1".to_string()
        } else {
            self.spec.commit_ts.clone()
        };

        let script = DrainerScript {
            host: self.spec.host.clone(),
            port: self.spec.port,
            deploy_dir: paths.deploy.clone(),
            data_dir: paths.data.clone().unwrap_or_default(),
            log_dir: paths.log.clone(),
            pd: pd_urls(topo),
            commit_ts,
        }
        .render()?;
        self.common.upload_run_script(exec, &script, paths)?;

        self.common.upload_merged_config(
            exec,
            component::DRAINER,
            &topo.server_configs.drainer,
            &self.spec.config,
            paths,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_port_and_dirs() {
        let topo = Topology::from_str("drainer_servers:\n  - host: 10.0.0.9\n").unwrap();
        let insts = instances(&topo);
        assert_eq!(insts[0].used_ports(), vec![8249]);
        assert_eq!(
            insts[0].used_dirs(),
            vec![
                "deploy/drainer-8249".to_string(),
                "data/drainer-8249".to_string()
            ]
        );
    }
}
