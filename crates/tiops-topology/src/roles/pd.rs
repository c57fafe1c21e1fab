//! The PD role.

use tiops_api::PdClient;
use tiops_executor::Executor;

use crate::error::Result;
use crate::instance::{DirPaths, Instance};
use crate::roles::common::{
    delegate_common, pd_initial_cluster, pd_urls, Common, STATUS_QUERY_TIMEOUT,
};
use crate::spec::{component, PdSpec, Topology};
use crate::template::PdScript;

/// A PD instance.
pub struct PdInstance {
    spec: PdSpec,
    common: Common,
}

impl PdInstance {
    /// The PD member name, synthesized at load time when absent.
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// Materializes all PD instances of the topology.
pub fn instances(topo: &Topology) -> Vec<Box<dyn Instance>> {
    topo.pd_servers
        .iter()
        .map(|s| {
            let mut used_dirs = vec![s.deploy_dir.clone()];
            if !s.data_dir.is_empty() {
                used_dirs.push(s.data_dir.clone());
            }
            Box::new(PdInstance {
                common: Common {
                    component: component::PD,
                    host: s.host.clone(),
                    port: s.client_port,
                    ssh_port: s.ssh_port,
                    deploy_dir: s.deploy_dir.clone(),
                    data_dir: Some(s.data_dir.clone()).filter(|d| !d.is_empty()),
                    log_dir: Some(s.log_dir.clone()).filter(|d| !d.is_empty()),
                    imported: s.imported,
                    used_ports: vec![s.client_port, s.peer_port],
                    used_dirs,
                },
                spec: s.clone(),
            }) as Box<dyn Instance>
        })
        .collect()
}

impl PdInstance {
    fn render_script(&self, topo: &Topology, paths: &DirPaths, join: Option<String>) -> Result<String> {
        let script = PdScript {
            name: self.spec.name.clone(),
            host: self.spec.host.clone(),
            client_port: self.spec.client_port,
            peer_port: self.spec.peer_port,
            deploy_dir: paths.deploy.clone(),
            data_dir: paths.data.clone().unwrap_or_default(),
            log_dir: paths.log.clone(),
            numa_node: Some(self.spec.numa_node.clone()).filter(|n| !n.is_empty()),
            initial_cluster: pd_initial_cluster(topo),
            join,
        };
        script.render()
    }
}

impl Instance for PdInstance {
    delegate_common!();

    fn status(&self, _pd_endpoints: &[String]) -> String {
        let endpoint = format!("{}:{}", self.spec.host, self.spec.client_port);
        let Ok(client) = PdClient::new(vec![endpoint], STATUS_QUERY_TIMEOUT, None) else {
            return "ERR".to_string();
        };
        let Ok(healths) = client.get_health() else {
            return "Down".to_string();
        };
        let leader_name = client.get_leader().map(|l| l.name).unwrap_or_default();

        for member in healths {
            if member.name != self.spec.name {
                continue;
            }
            let suffix = if self.spec.name == leader_name { "|L" } else { "" };
            return if member.health {
                format!("Healthy{}", suffix)
            } else {
                "Unhealthy".to_string()
            };
        }
        "N/A".to_string()
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
        let script = self.render_script(topo, paths, None)?;
        self.common.upload_run_script(exec, &script, paths)?;
        self.common.upload_merged_config(
            exec,
            component::PD,
            &topo.server_configs.pd,
            &self.spec.config,
            paths,
        )
    }

    /// A scaled-out PD must join the running cluster instead of
    /// bootstrapping a new one.
    fn scale_config(
        &self,
        exec: &dyn Executor,
        topo: &Topology,
        _cluster: &str,
        user: &str,
        paths: &DirPaths,
    ) -> Result<()> {
        self.common.init_unit(exec, user, paths, false)?;
        let script = self.render_script(topo, paths, Some(pd_urls(topo)))?;
        self.common.upload_run_script(exec, &script, paths)?;
        self.common.upload_merged_config(
            exec,
            component::PD,
            &topo.server_configs.pd,
            &self.spec.config,
            paths,
        )
    }
}
