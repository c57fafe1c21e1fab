//! Start, stop and restart.

use tiops_executor::module::{
    port_started, port_stopped, SystemdAction, SystemdConfig, SystemdModule,
};
use tiops_topology::roles::monitored;
use tiops_topology::spec::component;
use tiops_topology::{Instance, Topology};
use tracing::info;

use crate::error::{OperationError, Result};
use crate::{filter_components, filter_instances, ExecutorGetter};

/// Starts the selected instances, components in start order.
pub fn start(
    getter: &dyn ExecutorGetter,
    topo: &Topology,
    roles: &[String],
    nodes: &[String],
) -> Result<()> {
    for comp in filter_components(topo.components_by_start_order(), roles) {
        let instances = filter_instances(comp.instances(), nodes);
        if instances.is_empty() {
            continue;
        }
        start_component(getter, comp.name(), &instances)?;
    }
    start_monitored(getter, topo)
}

/// Stops the selected instances, components in stop order.
pub fn stop(
    getter: &dyn ExecutorGetter,
    topo: &Topology,
    roles: &[String],
    nodes: &[String],
) -> Result<()> {
    for comp in filter_components(topo.components_by_stop_order(), roles) {
        let instances = filter_instances(comp.instances(), nodes);
        if instances.is_empty() {
            continue;
        }
        stop_component(getter, comp.name(), &instances)?;
    }
    stop_monitored(getter, topo)
}

/// Stops then starts the selected instances.
pub fn restart(
    getter: &dyn ExecutorGetter,
    topo: &Topology,
    roles: &[String],
    nodes: &[String],
) -> Result<()> {
    stop(getter, topo, roles, nodes)?;
    start(getter, topo, roles, nodes)
}

/// Starts a set of instances of one component and waits for their
/// primary ports.
pub fn start_component(
    getter: &dyn ExecutorGetter,
    name: &str,
    instances: &[Box<dyn Instance>],
) -> Result<()> {
    info!(component = name, "Starting component");
    for inst in instances {
        let exec = getter
            .get(inst.host())
            .ok_or_else(|| OperationError::NoExecutor(inst.host().to_string()))?;
        info!(instance = %inst.id(), "Starting instance");

        let module = SystemdModule::new(
            SystemdConfig::new(inst.service_name(), SystemdAction::Start)
                .enabled()
                .reload_daemon(),
        );
        module
            .execute(exec.as_ref())
            .map_err(|e| OperationError::start_failed(name, inst.id(), e.into()))?;
        inst.ready(exec.as_ref())
            .map_err(|e| OperationError::start_failed(name, inst.id(), e.into()))?;
        info!(instance = %inst.id(), "Start instance success");
    }
    Ok(())
}

/// Stops a set of instances of one component and waits for their
/// primary ports to be released.
pub fn stop_component(
    getter: &dyn ExecutorGetter,
    name: &str,
    instances: &[Box<dyn Instance>],
) -> Result<()> {
    info!(component = name, "Stopping component");
    for inst in instances {
        let exec = getter
            .get(inst.host())
            .ok_or_else(|| OperationError::NoExecutor(inst.host().to_string()))?;
        info!(instance = %inst.id(), "Stopping instance");

        let module = SystemdModule::new(SystemdConfig::new(
            inst.service_name(),
            SystemdAction::Stop,
        ));
        module
            .execute(exec.as_ref())
            .map_err(|e| OperationError::stop_failed(name, inst.id(), e.into()))?;
        inst.wait_for_down(exec.as_ref())
            .map_err(|e| OperationError::stop_failed(name, inst.id(), e.into()))?;
        info!(instance = %inst.id(), "Stop instance success");
    }
    Ok(())
}

/// Starts the monitoring agents once per host.
pub fn start_monitored(getter: &dyn ExecutorGetter, topo: &Topology) -> Result<()> {
    for host in topo.unique_hosts() {
        let exec = getter
            .get(&host)
            .ok_or_else(|| OperationError::NoExecutor(host.clone()))?;
        for comp in [component::NODE_EXPORTER, component::BLACKBOX_EXPORTER] {
            let unit = monitored::service_name(&topo.monitored, comp);
            info!(host = %host, unit = %unit, "Starting monitored service");
            SystemdModule::new(
                SystemdConfig::new(unit, SystemdAction::Start)
                    .enabled()
                    .reload_daemon(),
            )
            .execute(exec.as_ref())?;
            port_started(exec.as_ref(), monitored::port_of(&topo.monitored, comp))?;
        }
    }
    Ok(())
}

/// Stops the monitoring agents once per host.
pub fn stop_monitored(getter: &dyn ExecutorGetter, topo: &Topology) -> Result<()> {
    for host in topo.unique_hosts() {
        let exec = getter
            .get(&host)
            .ok_or_else(|| OperationError::NoExecutor(host.clone()))?;
        for comp in [component::NODE_EXPORTER, component::BLACKBOX_EXPORTER] {
            let unit = monitored::service_name(&topo.monitored, comp);
            info!(host = %host, unit = %unit, "Stopping monitored service");
            SystemdModule::new(SystemdConfig::new(unit, SystemdAction::Stop))
                .execute(exec.as_ref())?;
            port_stopped(exec.as_ref(), monitored::port_of(&topo.monitored, comp))?;
        }
    }
    Ok(())
}
