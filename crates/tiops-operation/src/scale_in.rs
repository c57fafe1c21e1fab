//! Scale-in.
//!
//! Stateful roles leave the cluster asynchronously: TiKV through a PD
//! store deletion that migrates regions in the background, Pump and
//! Drainer through the binlog offline API. Those instances are only
//! marked offline in the topology; everything else is stopped and
//! destroyed synchronously and removed from the topology.

use std::collections::HashMap;
use std::time::Duration;

use tiops_api::{BinlogClient, PdClient};
use tiops_topology::spec::component;
use tiops_topology::Topology;
use tracing::{info, warn};

use crate::action::stop_component;
use crate::destroy::destroy_component;
use crate::error::{OperationError, Result};
use crate::{ExecutorGetter, Options};

const PD_API_TIMEOUT: Duration = Duration::from_secs(10);
const BINLOG_API_TIMEOUT: Duration = Duration::from_secs(5);

/// Removes the nodes named in `options.nodes` from the cluster.
///
/// On return the topology reflects the new desired state: async roles
/// are flagged offline, sync roles are gone. The caller persists the
/// topology and regenerates surviving instances' configs.
pub fn scale_in(
    getter: &dyn ExecutorGetter,
    topo: &mut Topology,
    options: &Options,
) -> Result<()> {
    // Every named node must exist.
    let mut components_of: HashMap<String, &'static str> = HashMap::new();
    topo.iter_instances(|inst| {
        components_of.insert(inst.id(), inst.component_name());
    });
    let mut deleted_per_comp: HashMap<&'static str, usize> = HashMap::new();
    for node in &options.nodes {
        let comp = components_of
            .get(node)
            .ok_or_else(|| OperationError::UnknownNode(node.clone()))?;
        *deleted_per_comp.entry(comp).or_default() += 1;
    }

    // Quorum guards fire before any API call.
    if deleted_per_comp.get(component::PD).copied().unwrap_or(0) == topo.pd_servers.len()
        && !topo.pd_servers.is_empty()
    {
        return Err(OperationError::CannotDeleteAll("PD".to_string()));
    }
    if deleted_per_comp.get(component::TIKV).copied().unwrap_or(0) == topo.tikv_servers.len()
        && !topo.tikv_servers.is_empty()
    {
        return Err(OperationError::CannotDeleteAll("TiKV".to_string()));
    }

    // A surviving PD answers the membership calls.
    let surviving_pds: Vec<String> = topo
        .pd_servers
        .iter()
        .filter(|s| !options.nodes.contains(&format!("{}:{}", s.host, s.client_port)))
        .map(|s| format!("{}:{}", s.host, s.client_port))
        .collect();
    if surviving_pds.is_empty() {
        return Err(OperationError::NoPdAvailable);
    }
    let pd_client = PdClient::new(surviving_pds, PD_API_TIMEOUT, None)?;

    for comp in topo.components_by_start_order() {
        let name = comp.kind.name();
        let doomed: Vec<_> = comp
            .instances()
            .into_iter()
            .filter(|i| options.nodes.contains(&i.id()))
            .collect();

        for inst in doomed {
            match name {
                component::TIKV => {
                    pd_client.del_store(&inst.id())?;
                    info!(store = %inst.id(), "Store requested offline, left for background reclaim");
                }
                component::PD => {
                    let member = topo
                        .pd_servers
                        .iter()
                        .find(|s| s.host == inst.host() && s.client_port == inst.port())
                        .map(|s| s.name.clone())
                        .unwrap_or_default();
                    pd_client.del_pd(&member)?;
                    stop_component(getter, name, std::slice::from_ref(&inst))?;
                    destroy_component(getter, std::slice::from_ref(&inst))?;
                }
                component::PUMP => {
                    let client = BinlogClient::new(
                        vec![inst.id()],
                        BINLOG_API_TIMEOUT,
                        None,
                    )?;
                    if let Err(e) = client.offline_pump(&inst.id()) {
                        warn!(pump = %inst.id(), error = %e, "Binlog offline request failed");
                    }
                }
                component::DRAINER => {
                    let client = BinlogClient::new(
                        vec![inst.id()],
                        BINLOG_API_TIMEOUT,
                        None,
                    )?;
                    if let Err(e) = client.offline_drainer(&inst.id()) {
                        warn!(drainer = %inst.id(), error = %e, "Binlog offline request failed");
                    }
                }
                _ => {
                    stop_component(getter, name, std::slice::from_ref(&inst))?;
                    destroy_component(getter, std::slice::from_ref(&inst))?;
                }
            }
        }
    }

    apply_scale_in(topo, &options.nodes);
    Ok(())
}

/// Flags async-offline roles and removes sync-deleted roles from the
/// topology.
pub fn apply_scale_in(topo: &mut Topology, nodes: &[String]) {
    let gone = |host: &str, port: u16| nodes.contains(&format!("{}:{}", host, port));

    for s in &mut topo.tikv_servers {
        if gone(&s.host, s.port) {
            s.offline = true;
        }
    }
    for s in &mut topo.pump_servers {
        if gone(&s.host, s.port) {
            s.offline = true;
        }
    }
    for s in &mut topo.drainer_servers {
        if gone(&s.host, s.port) {
            s.offline = true;
        }
    }

    topo.pd_servers.retain(|s| !gone(&s.host, s.client_port));
    topo.tidb_servers.retain(|s| !gone(&s.host, s.port));
    topo.tiflash_servers.retain(|s| !gone(&s.host, s.tcp_port));
    topo.monitoring_servers.retain(|s| !gone(&s.host, s.port));
    topo.grafana_servers.retain(|s| !gone(&s.host, s.port));
    topo.alertmanager_servers
        .retain(|s| !gone(&s.host, s.web_port));
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoExecutors;
    impl ExecutorGetter for NoExecutors {
        fn get(&self, _host: &str) -> Option<std::sync::Arc<dyn tiops_executor::Executor>> {
            None
        }
    }

    fn three_pd_three_kv() -> Topology {
        Topology::from_str(
            "pd_servers:\n  - host: 10.0.0.1\n  - host: 10.0.0.2\n  - host: 10.0.0.3\ntikv_servers:\n  - host: 10.0.0.1\n  - host: 10.0.0.2\n  - host: 10.0.0.3\n",
        )
        .unwrap()
    }

    #[test]
    fn test_unknown_node_is_fatal() {
        let mut topo = three_pd_three_kv();
        let err = scale_in(
            &NoExecutors,
            &mut topo,
            &Options {
                nodes: vec!["10.9.9.9:20160".to_string()],
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, OperationError::UnknownNode(_)));
    }

    /// Quorum guard fires before any API call, so no executors and no
    /// PD are needed for it to trigger.
    #[test]
    fn test_deleting_all_pds_rejected() {
        let mut topo = three_pd_three_kv();
        let before = topo.clone();
        let err = scale_in(
            &NoExecutors,
            &mut topo,
            &Options {
                nodes: vec![
                    "10.0.0.1:2379".to_string(),
                    "10.0.0.2:2379".to_string(),
                    "10.0.0.3:2379".to_string(),
                ],
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "cannot delete all PD servers");
        assert_eq!(topo, before, "topology must be unchanged");
    }

    #[test]
    fn test_deleting_all_tikvs_rejected() {
        let mut topo = three_pd_three_kv();
        let err = scale_in(
            &NoExecutors,
            &mut topo,
            &Options {
                nodes: vec![
                    "10.0.0.1:20160".to_string(),
                    "10.0.0.2:20160".to_string(),
                    "10.0.0.3:20160".to_string(),
                ],
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "cannot delete all TiKV servers");
    }

    #[test]
    fn test_apply_marks_tikv_offline_and_removes_tidb() {
        let mut topo = Topology::from_str(
            "pd_servers:\n  - host: 10.0.0.1\ntikv_servers:\n  - host: 10.0.0.2\n  - host: 10.0.0.3\ntidb_servers:\n  - host: 10.0.0.4\n",
        )
        .unwrap();
        apply_scale_in(
            &mut topo,
            &["10.0.0.2:20160".to_string(), "10.0.0.4:4000".to_string()],
        );

        assert!(topo.tikv_servers[0].offline);
        assert!(!topo.tikv_servers[1].offline);
        assert_eq!(topo.tikv_servers.len(), 2, "offline tikv stays in topology");
        assert!(topo.tidb_servers.is_empty(), "sync role is removed");
    }
}
