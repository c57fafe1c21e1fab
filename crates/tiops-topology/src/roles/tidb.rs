//! The TiDB role.

use tiops_executor::Executor;

use crate::error::Result;
use crate::instance::{DirPaths, Instance};
use crate::roles::common::{delegate_common, pd_list, status_by_url, Common};
use crate::spec::{component, TidbSpec, Topology};
use crate::template::TidbScript;

/// A TiDB instance.
pub struct TidbInstance {
    spec: TidbSpec,
    common: Common,
}

/// Materializes all TiDB instances of the topology.
pub fn instances(topo: &Topology) -> Vec<Box<dyn Instance>> {
    topo.tidb_servers
        .iter()
        .map(|s| {
            Box::new(TidbInstance {
                common: Common {
                    component: component::TIDB,
                    host: s.host.clone(),
                    port: s.port,
                    ssh_port: s.ssh_port,
                    deploy_dir: s.deploy_dir.clone(),
                    data_dir: None,
                    log_dir: Some(s.log_dir.clone()).filter(|d| !d.is_empty()),
                    imported: s.imported,
                    used_ports: vec![s.port, s.status_port],
                    used_dirs: vec![s.deploy_dir.clone()],
                },
                spec: s.clone(),
            }) as Box<dyn Instance>
        })
        .collect()
}

impl Instance for TidbInstance {
    delegate_common!();

    fn status(&self, _pd_endpoints: &[String]) -> String {
        status_by_url(&self.spec.host, self.spec.status_port, "status")
    }

    fn init_config(
        &self,
        exec: &dyn Executor,
        topo: &Topology,
        _cluster: &str,
        user: &str,
        paths: &DirPaths,
    ) -> Result<()> {
        self.common.init_unit(exec, user, paths, false)?;

        let script = TidbScript {
            host: self.spec.host.clone(),
            port: self.spec.port,
            status_port: self.spec.status_port,
            deploy_dir: paths.deploy.clone(),
            log_dir: paths.log.clone(),
            numa_node: Some(self.spec.numa_node.clone()).filter(|n| !n.is_empty()),
            pd: pd_list(topo),
        }
        .render()?;
        self.common.upload_run_script(exec, &script, paths)?;

        self.common.upload_merged_config(
            exec,
            component::TIDB,
            &topo.server_configs.tidb,
            &self.spec.config,
            paths,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tidb_claims_no_data_dir() {
        let topo = Topology::from_str("tidb_servers:\n  - host: 10.0.0.1\n").unwrap();
        let insts = instances(&topo);
        assert_eq!(insts[0].data_dir(), None);
        assert_eq!(insts[0].used_dirs(), vec!["deploy/tidb-4000".to_string()]);
    }
}
