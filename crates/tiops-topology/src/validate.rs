//! Load-time invariant checking.
//!
//! A single pass collects every (host, port) and (host, directory) claim
//! in the topology, tagged with the yaml group and field it came from,
//! and fails on the first duplicate naming both sides. Monitored
//! exporter ports are claimed on every known host.

use std::collections::{BTreeSet, HashMap};

use crate::error::{Result, TopologyError};
use crate::spec::Topology;

#[derive(Debug, Clone, Copy)]
struct Claim {
    group: &'static str,
    field: &'static str,
}

#[derive(Default)]
struct Usage {
    ports: HashMap<(String, u16), Claim>,
    dirs: HashMap<(String, String), Claim>,
    hosts: BTreeSet<String>,
}

impl Usage {
    fn claim_port(
        &mut self,
        group: &'static str,
        host: &str,
        field: &'static str,
        port: u16,
    ) -> Result<()> {
        if let Some(prev) = self
            .ports
            .insert((host.to_string(), port), Claim { group, field })
        {
            return Err(TopologyError::PortConflict {
                port,
                host: host.to_string(),
                prev_group: prev.group.to_string(),
                prev_field: prev.field.to_string(),
                group: group.to_string(),
                field: field.to_string(),
            });
        }
        Ok(())
    }

    fn claim_dir(
        &mut self,
        group: &'static str,
        host: &str,
        field: &'static str,
        dir: &str,
    ) -> Result<()> {
        if dir.is_empty() {
            return Ok(());
        }
        if let Some(prev) = self
            .dirs
            .insert((host.to_string(), dir.to_string()), Claim { group, field })
        {
            return Err(TopologyError::DirConflict {
                dir: dir.to_string(),
                host: host.to_string(),
                prev_group: prev.group.to_string(),
                prev_field: prev.field.to_string(),
                group: group.to_string(),
                field: field.to_string(),
            });
        }
        Ok(())
    }

    fn claim_instance(
        &mut self,
        group: &'static str,
        host: &str,
        ports: &[(&'static str, u16)],
        dirs: &[(&'static str, &str)],
    ) -> Result<()> {
        if host.is_empty() {
            return Err(TopologyError::EmptyHost {
                group: group.to_string(),
            });
        }
        self.hosts.insert(host.to_string());
        for (field, dir) in dirs {
            self.claim_dir(group, host, field, dir)?;
        }
        for (field, port) in ports {
            self.claim_port(group, host, field, *port)?;
        }
        Ok(())
    }
}

impl Topology {
    /// Checks the port and directory uniqueness invariants.
    pub fn validate(&self) -> Result<()> {
        let mut usage = Usage::default();

        for s in &self.tidb_servers {
            usage.claim_instance(
                "tidb_servers",
                &s.host,
                &[("port", s.port), ("status_port", s.status_port)],
                &[("deploy_dir", &s.deploy_dir)],
            )?;
        }
        for s in &self.tikv_servers {
            usage.claim_instance(
                "tikv_servers",
                &s.host,
                &[("port", s.port), ("status_port", s.status_port)],
                &[("deploy_dir", &s.deploy_dir), ("data_dir", &s.data_dir)],
            )?;
        }
        for s in &self.pd_servers {
            usage.claim_instance(
                "pd_servers",
                &s.host,
                &[("client_port", s.client_port), ("peer_port", s.peer_port)],
                &[("deploy_dir", &s.deploy_dir), ("data_dir", &s.data_dir)],
            )?;
        }
        for s in &self.tiflash_servers {
            usage.claim_instance(
                "tiflash_servers",
                &s.host,
                &[
                    ("tcp_port", s.tcp_port),
                    ("http_port", s.http_port),
                    ("flash_service_port", s.flash_service_port),
                    ("flash_proxy_port", s.flash_proxy_port),
                    ("flash_proxy_status_port", s.flash_proxy_status_port),
                    ("status_port", s.status_port),
                ],
                &[("deploy_dir", &s.deploy_dir), ("data_dir", &s.data_dir)],
            )?;
        }
        for s in &self.pump_servers {
            usage.claim_instance(
                "pump_servers",
                &s.host,
                &[("port", s.port)],
                &[("deploy_dir", &s.deploy_dir), ("data_dir", &s.data_dir)],
            )?;
        }
        for s in &self.drainer_servers {
            usage.claim_instance(
                "drainer_servers",
                &s.host,
                &[("port", s.port)],
                &[("deploy_dir", &s.deploy_dir), ("data_dir", &s.data_dir)],
            )?;
        }
        for s in &self.monitoring_servers {
            usage.claim_instance(
                "monitoring_servers",
                &s.host,
                &[("port", s.port)],
                &[("deploy_dir", &s.deploy_dir), ("data_dir", &s.data_dir)],
            )?;
        }
        for s in &self.grafana_servers {
            usage.claim_instance(
                "grafana_servers",
                &s.host,
                &[("port", s.port)],
                &[("deploy_dir", &s.deploy_dir)],
            )?;
        }
        for s in &self.alertmanager_servers {
            usage.claim_instance(
                "alertmanager_servers",
                &s.host,
                &[("web_port", s.web_port), ("cluster_port", s.cluster_port)],
                &[("deploy_dir", &s.deploy_dir), ("data_dir", &s.data_dir)],
            )?;
        }

        // The exporters run on every host that carries any instance.
        let hosts: Vec<String> = usage.hosts.iter().cloned().collect();
        for host in &hosts {
            usage.claim_port(
                "monitored",
                host,
                "node_exporter_port",
                self.monitored.node_exporter_port,
            )?;
            usage.claim_port(
                "monitored",
                host,
                "blackbox_exporter_port",
                self.monitored.blackbox_exporter_port,
            )?;
        }

        Ok(())
    }

    /// Every host that carries at least one instance, deduplicated and
    /// in stable order.
    pub fn unique_hosts(&self) -> Vec<String> {
        let mut hosts = BTreeSet::new();
        for c in crate::instance::ComponentKind::start_order() {
            for inst in c.instances(self) {
                hosts.insert(inst.host().to_string());
            }
        }
        hosts.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_small_topology() {
        let topo = Topology::from_str(
            "pd_servers:\n  - host: 10.0.0.1\ntikv_servers:\n  - host: 10.0.0.2\n",
        )
        .unwrap();
        assert!(topo.validate().is_ok());
    }

    #[test]
    fn test_port_conflict_names_both_sides() {
        let err = Topology::from_str(
            "tidb_servers:\n  - host: 10.0.0.1\n    port: 4000\ntikv_servers:\n  - host: 10.0.0.1\n    port: 4000\n",
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("port conflict for '4000'"), "{msg}");
        assert!(msg.contains("tidb_servers:10.0.0.1.port"), "{msg}");
        assert!(msg.contains("tikv_servers:10.0.0.1.port"), "{msg}");
    }

    #[test]
    fn test_dir_conflict_detected() {
        let err = Topology::from_str(
            "tikv_servers:\n  - host: 10.0.0.1\n    port: 20160\n    status_port: 20181\n    deploy_dir: kv\n  - host: 10.0.0.1\n    port: 20161\n    status_port: 20182\n    deploy_dir: kv\n",
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("directory conflict for 'kv'"), "{msg}");
    }

    #[test]
    fn test_same_dir_on_different_hosts_is_fine() {
        let topo = Topology::from_str(
            "tikv_servers:\n  - host: 10.0.0.1\n    deploy_dir: kv\n  - host: 10.0.0.2\n    deploy_dir: kv\n",
        )
        .unwrap();
        assert_eq!(topo.tikv_servers.len(), 2);
    }

    #[test]
    fn test_monitored_port_clash_with_instance() {
        let err = Topology::from_str(
            "tidb_servers:\n  - host: 10.0.0.1\n    port: 9100\n",
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("node_exporter_port"), "{msg}");
    }

    #[test]
    fn test_empty_host_rejected() {
        let err =
            Topology::from_str("tidb_servers:\n  - host: \"\"\n").unwrap_err();
        assert!(matches!(err, TopologyError::EmptyHost { .. }));
    }

    #[test]
    fn test_unique_hosts_sorted_and_deduped() {
        let topo = Topology::from_str(
            "pd_servers:\n  - host: 10.0.0.2\ntikv_servers:\n  - host: 10.0.0.1\ntidb_servers:\n  - host: 10.0.0.2\n",
        )
        .unwrap();
        assert_eq!(topo.unique_hosts(), vec!["10.0.0.1", "10.0.0.2"]);
    }
}
