//! The per-host monitoring agents.
//!
//! node_exporter and blackbox_exporter are not topology instances:
//! every host carrying any instance gets exactly one of each. They
//! still receive a systemd unit and run script like the real roles.

use tiops_executor::Executor;

use crate::error::{Result, TopologyError};
use crate::instance::DirPaths;
use crate::spec::{component, MonitoredOptions};
use crate::template::{
    BlackboxExporterScript, NodeExporterScript, SystemdUnit, BLACKBOX_CONFIG,
};

/// Port of the monitored component `comp` from the options.
pub fn port_of(options: &MonitoredOptions, comp: &str) -> u16 {
    if comp == component::BLACKBOX_EXPORTER {
        options.blackbox_exporter_port
    } else {
        options.node_exporter_port
    }
}

/// Unit name of a monitored component on a host.
pub fn service_name(options: &MonitoredOptions, comp: &str) -> String {
    format!("{}-{}.service", comp, port_of(options, comp))
}

/// Renders and installs the unit, run script and config of one
/// monitored component on one host.
pub fn init_config(
    exec: &dyn Executor,
    comp: &str,
    host: &str,
    options: &MonitoredOptions,
    user: &str,
    paths: &DirPaths,
) -> Result<()> {
    let port = port_of(options, comp);

    // Unit file, staged through /tmp like the role units.
    let unit = SystemdUnit::new(comp, user, paths.deploy.clone()).render()?;
    let cache_file = paths.cache.join(format!("{}-{}-{}.service", comp, host, port));
    std::fs::write(&cache_file, unit)?;
    let staging = format!("/tmp/{}-{}.service", comp, port);
    exec.transfer(&cache_file.to_string_lossy(), &staging, false)?;
    exec.exec(
        &format!("mv {} /etc/systemd/system/{}-{}.service", staging, comp, port),
        None,
        true,
    )?;

    // Run script.
    let script = match comp {
        component::NODE_EXPORTER => NodeExporterScript {
            port,
            deploy_dir: paths.deploy.clone(),
            log_dir: paths.log.clone(),
        }
        .render()?,
        component::BLACKBOX_EXPORTER => BlackboxExporterScript {
            port,
            deploy_dir: paths.deploy.clone(),
            log_dir: paths.log.clone(),
        }
        .render()?,
        other => {
            return Err(TopologyError::render(
                "monitored run script",
                format!("unknown monitored component {}", other),
            ))
        }
    };
    let cache_file = paths.cache.join(format!("run_{}_{}.sh", comp, host));
    std::fs::write(&cache_file, script)?;
    let dst = format!("{}/scripts/run_{}.sh", paths.deploy, comp);
    exec.transfer(&cache_file.to_string_lossy(), &dst, false)?;
    exec.exec(&format!("chmod +x {}", dst), None, false)?;

    // The blackbox exporter ships a probe module config.
    if comp == component::BLACKBOX_EXPORTER {
        let cache_file = paths.cache.join(format!("blackbox_{}.yml", host));
        std::fs::write(&cache_file, BLACKBOX_CONFIG)?;
        let dst = format!("{}/conf/blackbox.yml", paths.deploy);
        exec.transfer(&cache_file.to_string_lossy(), &dst, false)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_names_use_monitored_ports() {
        let options = MonitoredOptions::default();
        assert_eq!(
            service_name(&options, component::NODE_EXPORTER),
            "node_exporter-9100.service"
        );
        assert_eq!(
            service_name(&options, component::BLACKBOX_EXPORTER),
            "blackbox_exporter-9115.service"
        );
    }
}
