//! The TiKV role.

use tiops_api::PdClient;
use tiops_executor::Executor;

use crate::error::Result;
use crate::instance::{DirPaths, Instance};
use crate::roles::common::{delegate_common, pd_list, Common, STATUS_QUERY_TIMEOUT};
use crate::spec::{component, TikvSpec, Topology};
use crate::template::TikvScript;

/// A TiKV instance.
pub struct TikvInstance {
    spec: TikvSpec,
    common: Common,
}

impl TikvInstance {
    /// True when the store has been requested offline via PD.
    pub fn is_offline(&self) -> bool {
        self.spec.offline
    }
}

/// Materializes all TiKV instances of the topology.
pub fn instances(topo: &Topology) -> Vec<Box<dyn Instance>> {
    topo.tikv_servers
        .iter()
        .map(|s| {
            let mut used_dirs = vec![s.deploy_dir.clone()];
            if !s.data_dir.is_empty() {
                used_dirs.push(s.data_dir.clone());
            }
            Box::new(TikvInstance {
                common: Common {
                    component: component::TIKV,
                    host: s.host.clone(),
                    port: s.port,
                    ssh_port: s.ssh_port,
                    deploy_dir: s.deploy_dir.clone(),
                    data_dir: Some(s.data_dir.clone()).filter(|d| !d.is_empty()),
                    log_dir: Some(s.log_dir.clone()).filter(|d| !d.is_empty()),
                    imported: s.imported,
                    used_ports: vec![s.port, s.status_port],
                    used_dirs,
                },
                spec: s.clone(),
            }) as Box<dyn Instance>
        })
        .collect()
}

impl Instance for TikvInstance {
    delegate_common!();

    /// TiKV's state lives in PD: the store entry carries `Up`,
    /// `Offline` or `Tombstone`.
    fn status(&self, pd_endpoints: &[String]) -> String {
        if pd_endpoints.is_empty() {
            return "N/A".to_string();
        }
        let Ok(client) = PdClient::new(pd_endpoints.to_vec(), STATUS_QUERY_TIMEOUT, None) else {
            return "ERR".to_string();
        };
        let Ok(stores) = client.get_stores() else {
            return "ERR".to_string();
        };

        let address = format!("{}:{}", self.spec.host, self.spec.port);
        stores
            .stores
            .into_iter()
            .find(|s| s.store.address == address)
            .map(|s| s.store.state_name)
            .unwrap_or_else(|| "N/A".to_string())
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

        let script = TikvScript {
            host: self.spec.host.clone(),
            port: self.spec.port,
            status_port: self.spec.status_port,
            deploy_dir: paths.deploy.clone(),
            data_dir: paths.data.clone().unwrap_or_default(),
            log_dir: paths.log.clone(),
            numa_node: Some(self.spec.numa_node.clone()).filter(|n| !n.is_empty()),
            pd: pd_list(topo),
        }
        .render()?;
        self.common.upload_run_script(exec, &script, paths)?;

        // Placement labels ride in the config file rather than the
        // command line.
        let mut instance_conf = self.spec.config.clone();
        if !self.spec.labels.is_empty() {
            let labels: serde_json::Map<String, serde_json::Value> = self
                .spec
                .labels
                .iter()
                .filter_map(|l| {
                    l.split_once('=')
                        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
                })
                .collect();
            instance_conf.insert(
                "server.labels".to_string(),
                serde_json::Value::Object(labels),
            );
        }

        self.common.upload_merged_config(
            exec,
            component::TIKV,
            &topo.server_configs.tikv,
            &instance_conf,
            paths,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_identity() {
        let topo = Topology::from_str("tikv_servers:\n  - host: 10.0.0.5\n").unwrap();
        let insts = instances(&topo);
        assert_eq!(insts.len(), 1);
        let inst = &insts[0];
        assert_eq!(inst.id(), "10.0.0.5:20160");
        assert_eq!(inst.instance_name(), "tikv20160");
        assert_eq!(inst.service_name(), "tikv-20160.service");
        assert_eq!(inst.used_ports(), vec![20160, 20180]);
        assert_eq!(
            inst.used_dirs(),
            vec!["deploy/tikv-20160".to_string(), "data/tikv-20160".to_string()]
        );
    }

    #[test]
    fn test_status_without_pd_is_na() {
        let topo = Topology::from_str("tikv_servers:\n  - host: 10.0.0.5\n").unwrap();
        let insts = instances(&topo);
        assert_eq!(insts[0].status(&[]), "N/A");
    }
}
