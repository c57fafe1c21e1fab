//! Teardown of instances, monitored agents and whole clusters.

use tiops_topology::roles::monitored;
use tiops_topology::spec::{component, MonitoredOptions};
use tiops_topology::{Instance, Topology};
use tracing::{info, warn};

use crate::error::{OperationError, Result};
use crate::ExecutorGetter;

/// Destroys every instance in stop order and the monitored agents once
/// per host. Instances are expected to be stopped already.
pub fn destroy_cluster(getter: &dyn ExecutorGetter, topo: &Topology) -> Result<()> {
    let mut seen_hosts = std::collections::HashSet::new();

    for comp in topo.components_by_stop_order() {
        let instances = comp.instances();
        if instances.is_empty() {
            continue;
        }
        destroy_component(getter, &instances)?;

        for inst in &instances {
            if seen_hosts.insert(inst.host().to_string()) {
                destroy_monitored(
                    getter,
                    inst.host(),
                    &topo.monitored,
                    inst.is_imported(),
                )?;
            }
        }
    }
    Ok(())
}

/// Removes an instance set's directories and systemd units.
///
/// Imported instances keep their deploy directory: the legacy tooling
/// shared it across components on the same host.
pub fn destroy_component(
    getter: &dyn ExecutorGetter,
    instances: &[Box<dyn Instance>],
) -> Result<()> {
    let Some(first) = instances.first() else {
        return Ok(());
    };
    let name = first.component_name();
    info!(component = name, "Destroying component");

    for inst in instances {
        let exec = getter
            .get(inst.host())
            .ok_or_else(|| OperationError::NoExecutor(inst.host().to_string()))?;
        info!(instance = %inst.id(), "Destroying instance");

        let mut del_paths = Vec::new();
        if let Some(data) = inst.data_dir() {
            del_paths.push(data.to_string());
        }
        del_paths.push(inst.log_dir());
        if inst.is_imported() {
            warn!(
                instance = %inst.instance_name(),
                deploy_dir = %inst.deploy_dir(),
                "Deploy dir not deleted for imported instance"
            );
        } else {
            del_paths.push(inst.deploy_dir().to_string());
        }
        del_paths.push(format!("/etc/systemd/system/{}", inst.service_name()));

        exec.exec(&format!("rm -rf {};", del_paths.join(" ")), None, true)?;
        inst.wait_for_down(exec.as_ref())?;
        info!(instance = %inst.id(), "Destroy instance success");
    }
    Ok(())
}

/// Removes the monitoring agents from one host.
pub fn destroy_monitored(
    getter: &dyn ExecutorGetter,
    host: &str,
    options: &MonitoredOptions,
    imported: bool,
) -> Result<()> {
    let exec = getter
        .get(host)
        .ok_or_else(|| OperationError::NoExecutor(host.to_string()))?;
    info!(host = %host, "Destroying monitored services");

    let mut del_paths = vec![options.data_dir.clone()];
    if imported {
        warn!(
            host = %host,
            deploy_dir = %options.deploy_dir,
            "Monitored deploy dir not deleted for imported host"
        );
    } else {
        del_paths.push(options.deploy_dir.clone());
    }
    for comp in [component::NODE_EXPORTER, component::BLACKBOX_EXPORTER] {
        del_paths.push(format!(
            "/etc/systemd/system/{}",
            monitored::service_name(options, comp)
        ));
    }

    exec.exec(&format!("rm -rf {};", del_paths.join(" ")), None, true)?;

    tiops_executor::module::port_stopped(exec.as_ref(), options.node_exporter_port)?;
    tiops_executor::module::port_stopped(exec.as_ref(), options.blackbox_exporter_port)?;
    info!(host = %host, "Destroy monitored success");
    Ok(())
}
