//! The TiFlash role.
//!
//! TiFlash carries two configurations: its own server config and the
//! embedded raft learner (proxy) config. Both start from built-in
//! defaults resolved against the topology, then the role and instance
//! maps are layered on top.

use serde_json::json;
use tiops_executor::Executor;

use crate::config;
use crate::error::Result;
use crate::instance::{DirPaths, Instance};
use crate::roles::common::{delegate_common, pd_list, status_by_url, Common};
use crate::spec::{component, ConfigMap, TiflashSpec, Topology};
use crate::template::TiflashScript;

/// A TiFlash instance.
pub struct TiflashInstance {
    spec: TiflashSpec,
    common: Common,
}

/// Materializes all TiFlash instances of the topology.
pub fn instances(topo: &Topology) -> Vec<Box<dyn Instance>> {
    topo.tiflash_servers
        .iter()
        .map(|s| {
            let mut used_dirs = vec![s.deploy_dir.clone()];
            if !s.data_dir.is_empty() {
                used_dirs.push(s.data_dir.clone());
            }
            Box::new(TiflashInstance {
                common: Common {
                    component: component::TIFLASH,
                    host: s.host.clone(),
                    port: s.tcp_port,
                    ssh_port: s.ssh_port,
                    deploy_dir: s.deploy_dir.clone(),
                    data_dir: Some(s.data_dir.clone()).filter(|d| !d.is_empty()),
                    log_dir: Some(s.log_dir.clone()).filter(|d| !d.is_empty()),
                    imported: s.imported,
                    used_ports: vec![
                        s.tcp_port,
                        s.http_port,
                        s.flash_service_port,
                        s.flash_proxy_port,
                        s.flash_proxy_status_port,
                        s.status_port,
                    ],
                    used_dirs,
                },
                spec: s.clone(),
            }) as Box<dyn Instance>
        })
        .collect()
}

impl TiflashInstance {
    /// Built-in server config, written as dotted keys so topology
    /// overrides land on the same leaves.
    fn default_server_config(&self, topo: &Topology, paths: &DirPaths) -> ConfigMap {
        let data = paths.data.clone().unwrap_or_default();
        let tidb_status: Vec<String> = topo
            .tidb_servers
            .iter()
            .map(|s| format!("{}:{}", s.host, s.status_port))
            .collect();

        let mut conf = ConfigMap::new();
        conf.insert("default_profile".into(), json!("default"));
        conf.insert("display_name".into(), json!("TiFlash"));
        conf.insert("listen_host".into(), json!("0.0.0.0"));
        conf.insert("tmp_path".into(), json!(format!("{}/tmp", data)));
        conf.insert("path".into(), json!(format!("{}/db", data)));
        conf.insert("tcp_port".into(), json!(self.spec.tcp_port));
        conf.insert("http_port".into(), json!(self.spec.http_port));
        conf.insert("mark_cache_size".into(), json!(5368709120u64));
        conf.insert("flash.tidb_status_addr".into(), json!(tidb_status.join(",")));
        conf.insert(
            "flash.service_addr".into(),
            json!(format!("{}:{}", self.spec.host, self.spec.flash_service_port)),
        );
        conf.insert(
            "flash.proxy.config".into(),
            json!(format!("{}/conf/tiflash-learner.toml", paths.deploy)),
        );
        conf.insert("raft.pd_addr".into(), json!(pd_list(topo)));
        conf.insert(
            "status.metrics_port".into(),
            json!(self.spec.status_port),
        );
        conf.insert(
            "logger.log".into(),
            json!(format!("{}/tiflash.log", paths.log)),
        );
        conf.insert(
            "logger.errorlog".into(),
            json!(format!("{}/tiflash_error.log", paths.log)),
        );
        conf.insert("logger.count".into(), json!(20));
        conf.insert("logger.level".into(), json!("info"));
        conf.insert("logger.size".into(), json!("1000M"));
        conf.insert("application.runAsDaemon".into(), json!(true));
        conf
    }

    /// Built-in learner (proxy) config.
    fn default_learner_config(&self, paths: &DirPaths) -> ConfigMap {
        let data = paths.data.clone().unwrap_or_default();

        let mut conf = ConfigMap::new();
        conf.insert(
            "log-file".into(),
            json!(format!("{}/tiflash_tikv.log", paths.log)),
        );
        conf.insert(
            "server.engine-addr".into(),
            json!(format!("{}:{}", self.spec.host, self.spec.flash_service_port)),
        );
        conf.insert(
            "server.addr".into(),
            json!(format!("0.0.0.0:{}", self.spec.flash_proxy_port)),
        );
        conf.insert(
            "server.advertise-addr".into(),
            json!(format!("{}:{}", self.spec.host, self.spec.flash_proxy_port)),
        );
        conf.insert(
            "server.status-addr".into(),
            json!(format!("{}:{}", self.spec.host, self.spec.flash_proxy_status_port)),
        );
        conf.insert(
            "storage.data-dir".into(),
            json!(format!("{}/flash", data)),
        );
        conf
    }
}

impl Instance for TiflashInstance {
    delegate_common!();

    fn status(&self, _pd_endpoints: &[String]) -> String {
        status_by_url(&self.spec.host, self.spec.status_port, "metrics")
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

        let script = TiflashScript {
            deploy_dir: paths.deploy.clone(),
            log_dir: paths.log.clone(),
            numa_node: Some(self.spec.numa_node.clone()).filter(|n| !n.is_empty()),
        }
        .render()?;
        self.common.upload_run_script(exec, &script, paths)?;

        let learner_defaults = config::merge(
            &self.default_learner_config(paths),
            &topo.server_configs.tiflash_learner,
        );
        self.common.upload_merged_config(
            exec,
            "tiflash-learner",
            &learner_defaults,
            &self.spec.learner_config,
            paths,
        )?;

        let server_defaults = config::merge(
            &self.default_server_config(topo, paths),
            &topo.server_configs.tiflash,
        );
        self.common.upload_merged_config(
            exec,
            component::TIFLASH,
            &server_defaults,
            &self.spec.config,
            paths,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiflash_claims_all_six_ports() {
        let topo = Topology::from_str("tiflash_servers:\n  - host: 10.0.0.7\n").unwrap();
        let insts = instances(&topo);
        assert_eq!(
            insts[0].used_ports(),
            vec![9000, 8123, 3930, 20170, 20292, 8234]
        );
        assert_eq!(insts[0].port(), 9000);
    }
}
