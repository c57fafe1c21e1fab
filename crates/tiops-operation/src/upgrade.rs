//! Rolling upgrade.
//!
//! Components are walked in start order. PD instances holding
//! leadership resign it first; TiKV stores get their region leaders
//! evicted before the restart. `--force` skips both and trades
//! stability for speed.

use std::time::Duration;

use tiops_api::PdClient;
use tiops_topology::spec::component;
use tiops_topology::{Instance, Topology};
use tracing::{info, warn};

use crate::action::{start_component, stop_component};
use crate::error::Result;
use crate::{filter_components, filter_instances, ExecutorGetter, Options};

const PD_API_TIMEOUT: Duration = Duration::from_secs(5);

/// Upgrades the selected instances in place.
///
/// The binaries are expected to have been swapped on disk already; this
/// procedure only sequences the restarts. The caller rewrites the
/// cluster meta version after every component succeeded.
pub fn upgrade(getter: &dyn ExecutorGetter, topo: &Topology, options: &Options) -> Result<()> {
    let components = filter_components(topo.components_by_start_order(), &options.roles);
    let pd_endpoints = topo.pd_endpoints();

    for comp in components {
        let instances = filter_instances(comp.instances(), &options.nodes);
        if instances.is_empty() {
            continue;
        }

        if !options.force && comp.name() == component::PD {
            upgrade_pd_instances(getter, topo, &pd_endpoints, &instances)?;
            continue;
        }
        if !options.force && comp.name() == component::TIKV {
            upgrade_tikv_instances(getter, &pd_endpoints, &instances)?;
            continue;
        }

        stop_component(getter, comp.name(), &instances)?;
        start_component(getter, comp.name(), &instances)?;
    }
    Ok(())
}

/// Restarts PD members one at a time, resigning leadership first when
/// the member being restarted is the current leader.
fn upgrade_pd_instances(
    getter: &dyn ExecutorGetter,
    topo: &Topology,
    pd_endpoints: &[String],
    instances: &[Box<dyn Instance>],
) -> Result<()> {
    for inst in instances {
        let client = PdClient::new(pd_endpoints.to_vec(), PD_API_TIMEOUT, None)?;
        let leader = client.get_leader()?;
        let member_name = topo
            .pd_servers
            .iter()
            .find(|s| s.host == inst.host() && s.client_port == inst.port())
            .map(|s| s.name.clone())
            .unwrap_or_default();

        if leader.name == member_name {
            info!(member = %member_name, "Transferring PD leadership away before restart");
            client.evict_pd_leader()?;
        }

        stop_component(getter, component::PD, std::slice::from_ref(inst))?;
        start_component(getter, component::PD, std::slice::from_ref(inst))?;
    }
    Ok(())
}

/// Restarts TiKV stores one at a time with leader eviction around the
/// restart.
fn upgrade_tikv_instances(
    getter: &dyn ExecutorGetter,
    pd_endpoints: &[String],
    instances: &[Box<dyn Instance>],
) -> Result<()> {
    for inst in instances {
        let client = PdClient::new(pd_endpoints.to_vec(), PD_API_TIMEOUT, None)?;
        let address = inst.id();
        client.evict_store_leader(&address)?;

        stop_component(getter, component::TIKV, std::slice::from_ref(inst))?;
        start_component(getter, component::TIKV, std::slice::from_ref(inst))?;

        // The scheduler would keep the store empty of leaders forever.
        if let Err(e) = client.remove_evict_store_leader(&address) {
            warn!(store = %address, error = %e, "Failed to remove eviction scheduler");
        }
    }
    Ok(())
}
