//! Shared instance plumbing: identity fields, artifact upload helpers
//! and sibling endpoint resolution.

use std::time::Duration;

use tiops_executor::Executor;

use crate::config;
use crate::error::Result;
use crate::instance::DirPaths;
use crate::spec::{ConfigMap, Topology};
use crate::template::SystemdUnit;

/// Status probes answer within this budget or the instance shows as down.
pub(crate) const STATUS_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// The identity and directory fields every role shares.
#[derive(Debug, Clone)]
pub(crate) struct Common {
    pub component: &'static str,
    pub host: String,
    pub port: u16,
    pub ssh_port: u16,
    pub deploy_dir: String,
    pub data_dir: Option<String>,
    pub log_dir: Option<String>,
    pub imported: bool,
    pub used_ports: Vec<u16>,
    pub used_dirs: Vec<String>,
}

impl Common {
    /// Resolves the log dir: explicit field, else `log` under deploy.
    pub fn resolved_log_dir(&self) -> String {
        let log_dir = match &self.log_dir {
            Some(dir) if !dir.is_empty() => dir.clone(),
            _ => "log".to_string(),
        };
        if log_dir.starts_with('/') {
            log_dir
        } else {
            format!("{}/{}", self.deploy_dir, log_dir)
        }
    }

    /// Renders the systemd unit, uploads it and installs it under
    /// `/etc/systemd/system/<component>-<port>.service`.
    pub fn init_unit(
        &self,
        exec: &dyn Executor,
        user: &str,
        paths: &DirPaths,
        restart_on_failure: bool,
    ) -> Result<()> {
        let mut unit = SystemdUnit::new(self.component, user, paths.deploy.clone());
        if restart_on_failure {
            unit = unit.restart_on_failure();
        }
        let content = unit.render()?;

        let cache_file = paths.cache.join(format!(
            "{}-{}-{}.service",
            self.component, self.host, self.port
        ));
        std::fs::write(&cache_file, content)?;

        // Stage under /tmp first: the deploy user cannot write to
        // /etc/systemd/system directly.
        let staging = format!("/tmp/{}-{}.service", self.component, self.port);
        exec.transfer(&cache_file.to_string_lossy(), &staging, false)?;
        exec.exec(
            &format!(
                "mv {} /etc/systemd/system/{}-{}.service",
                staging, self.component, self.port
            ),
            None,
            true,
        )?;
        Ok(())
    }

    /// Uploads a run script to `<deploy>/scripts/run_<component>.sh`
    /// and marks it executable.
    pub fn upload_run_script(
        &self,
        exec: &dyn Executor,
        content: &str,
        paths: &DirPaths,
    ) -> Result<()> {
        let cache_file = paths.cache.join(format!(
            "run_{}_{}_{}.sh",
            self.component, self.host, self.port
        ));
        std::fs::write(&cache_file, content)?;

        let dst = format!("{}/scripts/run_{}.sh", paths.deploy, self.component);
        exec.transfer(&cache_file.to_string_lossy(), &dst, false)?;
        exec.exec(&format!("chmod +x {}", dst), None, false)?;
        Ok(())
    }

    /// Merges the role defaults with the instance overrides, uploads the
    /// result to `<deploy>/conf/<name>.toml` and runs the binary
    /// self-check.
    ///
    /// Instances migrated from a legacy inventory keep their verbatim
    /// on-disk config as the base layer; topology values win on
    /// conflict.
    pub fn upload_merged_config(
        &self,
        exec: &dyn Executor,
        name: &str,
        global: &ConfigMap,
        instance: &ConfigMap,
        paths: &DirPaths,
    ) -> Result<()> {
        let mut base = global.clone();
        if self.imported {
            if let Some(legacy) = self.imported_config(name, paths)? {
                base = config::merge_imported(&legacy, global)?;
            }
        }
        let content = config::merge_to_toml(name, &base, instance)?;
        let cache_file = paths
            .cache
            .join(format!("{}-{}-{}.toml", name, self.host, self.port));
        std::fs::write(&cache_file, content)?;

        let dst = format!("{}/conf/{}.toml", paths.deploy, name);
        exec.transfer(&cache_file.to_string_lossy(), &dst, false)?;

        config::check_config(exec, self.component, &paths.deploy, &format!("{}.toml", name))
    }

    /// The legacy config backed up during import, if present.
    ///
    /// Import places the verbatim files next to the rendered config
    /// cache, under `ansible-backup/`.
    fn imported_config(&self, name: &str, paths: &DirPaths) -> Result<Option<String>> {
        let Some(cluster_dir) = paths.cache.parent() else {
            return Ok(None);
        };
        let legacy = cluster_dir
            .join("ansible-backup")
            .join(format!("{}-{}-{}.toml", name, self.host, self.port));
        if !legacy.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(legacy)?))
    }

    /// Stages an arbitrary config file and uploads it under
    /// `<deploy>/conf/`.
    pub fn upload_conf_file(
        &self,
        exec: &dyn Executor,
        cache_name: &str,
        content: &str,
        paths: &DirPaths,
        file_name: &str,
    ) -> Result<()> {
        let cache_file = paths.cache.join(cache_name);
        std::fs::write(&cache_file, content)?;
        let dst = format!("{}/conf/{}", paths.deploy, file_name);
        exec.transfer(&cache_file.to_string_lossy(), &dst, false)?;
        Ok(())
    }
}

/// Implements the identity/directory getters of [`crate::Instance`] by
/// delegating to the `common` field of the surrounding role struct.
macro_rules! delegate_common {
    () => {
        fn component_name(&self) -> &'static str {
            self.common.component
        }

        fn host(&self) -> &str {
            &self.common.host
        }

        fn ssh_port(&self) -> u16 {
            self.common.ssh_port
        }

        fn port(&self) -> u16 {
            self.common.port
        }

        fn deploy_dir(&self) -> &str {
            &self.common.deploy_dir
        }

        fn data_dir(&self) -> Option<&str> {
            self.common.data_dir.as_deref()
        }

        fn log_dir(&self) -> String {
            self.common.resolved_log_dir()
        }

        fn used_ports(&self) -> Vec<u16> {
            self.common.used_ports.clone()
        }

        fn used_dirs(&self) -> Vec<String> {
            self.common.used_dirs.clone()
        }

        fn is_imported(&self) -> bool {
            self.common.imported
        }
    };
}
pub(crate) use delegate_common;

/// `host:client_port` list of the PD group, comma-joined.
pub(crate) fn pd_list(topo: &Topology) -> String {
    topo.pd_endpoints().join(",")
}

/// `http://host:client_port` list of the PD group, comma-joined.
pub(crate) fn pd_urls(topo: &Topology) -> String {
    topo.pd_endpoints()
        .iter()
        .map(|e| format!("http://{}", e))
        .collect::<Vec<_>>()
        .join(",")
}

/// `name=http://host:peer_port` pairs of the PD group, comma-joined.
pub(crate) fn pd_initial_cluster(topo: &Topology) -> String {
    topo.pd_servers
        .iter()
        .map(|pd| format!("{}=http://{}:{}", pd.name, pd.host, pd.peer_port))
        .collect::<Vec<_>>()
        .join(",")
}

/// Probes an HTTP status endpoint, mapping reachability to `Up`/`Down`.
pub(crate) fn status_by_url(host: &str, port: u16, path: &str) -> String {
    let client = match tiops_api::HttpClient::new(
        vec![format!("{}:{}", host, port)],
        STATUS_QUERY_TIMEOUT,
        None,
    ) {
        Ok(c) => c,
        Err(_) => return "ERR".to_string(),
    };
    match client.get_text(path) {
        Ok(_) => "Up".to_string(),
        Err(_) => "Down".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn common(log_dir: Option<&str>) -> Common {
        Common {
            component: "tikv",
            host: "10.0.0.1".to_string(),
            port: 20160,
            ssh_port: 22,
            deploy_dir: "/home/tidb/deploy/tikv-20160".to_string(),
            data_dir: None,
            log_dir: log_dir.map(|s| s.to_string()),
            imported: false,
            used_ports: vec![],
            used_dirs: vec![],
        }
    }

    #[test]
    fn test_log_dir_defaults_under_deploy() {
        assert_eq!(
            common(None).resolved_log_dir(),
            "/home/tidb/deploy/tikv-20160/log"
        );
    }

    #[test]
    fn test_absolute_log_dir_kept() {
        assert_eq!(common(Some("/var/log/tikv")).resolved_log_dir(), "/var/log/tikv");
    }

    #[test]
    fn test_pd_initial_cluster_format() {
        let topo = Topology::from_str(
            "pd_servers:\n  - host: 10.0.0.1\n  - host: 10.0.0.2\n",
        )
        .unwrap();
        assert_eq!(
            pd_initial_cluster(&topo),
            "pd-10.0.0.1-2379=http://10.0.0.1:2380,pd-10.0.0.2-2379=http://10.0.0.2:2380"
        );
    }
}
