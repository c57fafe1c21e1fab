//! Command implementations, one module per subcommand.

pub mod audit;
pub mod check;
pub mod deploy;
pub mod destroy;
pub mod display;
pub mod edit_config;
pub mod exec;
pub mod list;
pub mod patch;
pub mod reload;
pub mod restart;
pub mod scale_in;
pub mod scale_out;
pub mod start;
pub mod stop;
pub mod upgrade;

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use tiops_profile::Profile;
use tiops_task::{HttpMirror, Mirror};
use tiops_topology::spec::component;
use tiops_topology::{abs, DirPaths, Instance, Topology};

/// Target platform of deployed packages.
pub const DEFAULT_OS: &str = "linux";
/// Target architecture of deployed packages.
pub const DEFAULT_ARCH: &str = "amd64";

/// Environment variable overriding the package mirror address.
pub const ENV_MIRRORS: &str = "TIUP_MIRRORS";

const DEFAULT_MIRROR: &str = "https://tiup-mirrors.pingcap.com";

/// The package mirror configured for this invocation.
pub fn mirror() -> Arc<dyn Mirror> {
    let base = std::env::var(ENV_MIRRORS).unwrap_or_else(|_| DEFAULT_MIRROR.to_string());
    Arc::new(HttpMirror::new(base))
}

/// Maps a component to the version that ships with a cluster version.
///
/// The monitoring stack is versioned independently of the database
/// components.
pub fn component_version(comp: &str, cluster_version: &str) -> String {
    match comp {
        component::PROMETHEUS => "v2.8.1".to_string(),
        component::GRAFANA => "v6.1.6".to_string(),
        component::ALERTMANAGER => "v0.17.0".to_string(),
        component::NODE_EXPORTER => "v0.17.0".to_string(),
        component::BLACKBOX_EXPORTER => "v0.12.0".to_string(),
        _ => cluster_version.to_string(),
    }
}

/// Resolves an instance's absolute directory set for config rendering.
pub fn instance_dir_paths(
    profile: &Profile,
    cluster: &str,
    user: &str,
    inst: &dyn Instance,
) -> DirPaths {
    DirPaths {
        deploy: abs(user, inst.deploy_dir()),
        data: inst.data_dir().map(|d| abs(user, d)),
        log: abs(user, &inst.log_dir()),
        cache: profile.cluster_path(cluster, "config"),
    }
}

/// Resolves the monitored agents' absolute directory set on a host.
pub fn monitored_dir_paths(
    profile: &Profile,
    cluster: &str,
    user: &str,
    topo: &Topology,
) -> DirPaths {
    let deploy = abs(user, &topo.monitored.deploy_dir);
    let log = if topo.monitored.log_dir.is_empty() {
        format!("{}/log", deploy)
    } else {
        abs(user, &topo.monitored.log_dir)
    };
    DirPaths {
        deploy,
        data: Some(abs(user, &topo.monitored.data_dir)),
        log,
        cache: profile.cluster_path(cluster, "config"),
    }
}

/// Asks for confirmation on stdin unless `skip` is set.
pub fn confirm_or_abort(prompt: &str, skip: bool) -> Result<()> {
    if skip {
        return Ok(());
    }
    print!("{} [y/N]: ", prompt);
    std::io::stdout().flush().ok();
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("failed to read confirmation")?;
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Ok(()),
        _ => bail!("operation aborted by user"),
    }
}

/// Prints the per-instance table of a topology, for confirmation and
/// display.
pub fn print_topology(topo: &Topology) {
    println!("{:<14} {:<16} {:<24} Directories", "Type", "Host", "Ports");
    topo.iter_instances(|inst| {
        let ports = inst
            .used_ports()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("/");
        println!(
            "{:<14} {:<16} {:<24} {}",
            inst.component_name(),
            inst.host(),
            ports,
            inst.used_dirs().join(",")
        );
    });
}

/// Components that have at least one instance, with their bound
/// versions, for download phases.
pub fn components_to_download(topo: &Topology, cluster_version: &str) -> Vec<(String, String)> {
    let mut list = Vec::new();
    for comp in topo.components_by_start_order() {
        if comp.instances().is_empty() {
            continue;
        }
        list.push((
            comp.name().to_string(),
            component_version(comp.name(), cluster_version),
        ));
    }
    list.push((
        component::NODE_EXPORTER.to_string(),
        component_version(component::NODE_EXPORTER, cluster_version),
    ));
    list.push((
        component::BLACKBOX_EXPORTER.to_string(),
        component_version(component::BLACKBOX_EXPORTER, cluster_version),
    ));
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_version_binding() {
        assert_eq!(component_version("tikv", "v4.0.0"), "v4.0.0");
        assert_eq!(component_version("grafana", "v4.0.0"), "v6.1.6");
        assert_eq!(component_version("node_exporter", "v4.0.0"), "v0.17.0");
    }

    #[test]
    fn test_components_to_download_includes_exporters() {
        let topo = Topology::from_str("pd_servers:\n  - host: 10.0.0.1\n").unwrap();
        let list = components_to_download(&topo, "v4.0.0");
        let names: Vec<&str> = list.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["pd", "node_exporter", "blackbox_exporter"]);
    }
}
