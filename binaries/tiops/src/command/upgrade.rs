//! `tiops upgrade <cluster-name> --version <version>`

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use tiops_operation::{Operation, Options};
use tiops_profile::Profile;
use tiops_task::{Context, Task, TaskBuilder};
use tracing::info;

use super::{
    component_version, components_to_download, confirm_or_abort, instance_dir_paths, mirror,
    DEFAULT_ARCH, DEFAULT_OS,
};

/// Arguments of the upgrade command.
#[derive(Args, Debug)]
pub struct UpgradeArgs {
    /// Name of the cluster.
    pub name: String,
    /// Version to upgrade to.
    #[arg(long)]
    pub version: String,
    /// Only upgrade these roles.
    #[arg(short = 'R', long = "role")]
    pub roles: Vec<String>,
    /// Only upgrade these nodes (`host:port`).
    #[arg(short = 'N', long = "node")]
    pub nodes: Vec<String>,
    /// Skip leader transfer and store eviction; faster but affects
    /// availability.
    #[arg(long)]
    pub force: bool,
    /// Skip the confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Compares two `vX.Y.Z` versions numerically, component-wise.
fn version_newer(current: &str, next: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.trim_start_matches('v')
            .split(|c: char| c == '.' || c == '-')
            .map_while(|p| p.parse().ok())
            .collect()
    };
    parse(next) > parse(current)
}

pub fn run(profile: &Profile, args: &UpgradeArgs) -> Result<()> {
    let mut meta = profile.load_meta(&args.name)?;
    if !version_newer(&meta.version, &args.version) {
        bail!(
            "cannot upgrade from {} to {}: target version must be newer",
            meta.version,
            args.version
        );
    }
    confirm_or_abort(
        &format!(
            "Upgrade cluster `{}` from {} to {}. Continue?",
            args.name, meta.version, args.version
        ),
        args.yes,
    )?;

    let topo = Arc::new(meta.topology.clone());
    let user = meta.user.clone();
    let mirror = mirror();

    let mut builder = TaskBuilder::new()
        .ssh_keyset(
            profile.ssh_key_path(&args.name),
            profile.ssh_pubkey_path(&args.name),
        )
        .cluster_ssh(&meta.topology, user.clone(), None);

    // Fetch the new packages first.
    let download_tasks: Vec<Box<dyn Task>> = components_to_download(&meta.topology, &args.version)
        .into_iter()
        .map(|(comp, ver)| {
            Box::new(
                TaskBuilder::new()
                    .download(
                        comp,
                        ver,
                        DEFAULT_OS,
                        DEFAULT_ARCH,
                        profile.clone(),
                        Arc::clone(&mirror),
                    )
                    .build(),
            ) as Box<dyn Task>
        })
        .collect();
    builder = builder.parallel_step("Download packages", download_tasks);

    // Swap binaries and refresh configs on every selected instance;
    // the rolling restart happens inside the upgrade operation.
    let mut swap_tasks: Vec<Box<dyn Task>> = Vec::new();
    for comp in meta.topology.components_by_start_order() {
        for inst in comp.instances() {
            if !args.roles.is_empty() && !args.roles.contains(&comp.name().to_string()) {
                continue;
            }
            if !args.nodes.is_empty() && !args.nodes.contains(&inst.id()) {
                continue;
            }
            let paths = instance_dir_paths(profile, &args.name, &user, inst.as_ref());
            swap_tasks.push(Box::new(
                TaskBuilder::new()
                    .backup_component(
                        inst.component_name(),
                        meta.version.clone(),
                        inst.host(),
                        paths.deploy.clone(),
                    )
                    .copy_component(
                        inst.component_name(),
                        component_version(inst.component_name(), &args.version),
                        DEFAULT_OS,
                        DEFAULT_ARCH,
                        inst.host(),
                        paths.deploy.clone(),
                        &args.name,
                        profile.clone(),
                    )
                    .init_config(&args.name, user.clone(), inst, Arc::clone(&topo), paths)
                    .build(),
            ));
        }
    }

    let task = builder
        .parallel_step("Swap binaries", swap_tasks)
        .cluster_operate(
            Arc::clone(&topo),
            Operation::Upgrade,
            Options {
                roles: args.roles.clone(),
                nodes: args.nodes.clone(),
                force: args.force,
            },
        )
        .build();
    task.execute(&Context::new())?;

    meta.version = args.version.clone();
    profile.save_meta(&args.name, &meta)?;
    info!(cluster = %args.name, version = %args.version, "Upgraded cluster");
    println!(
        "Upgraded cluster `{}` to {} successfully",
        args.name, args.version
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_comparison() {
        assert!(version_newer("v3.0.0", "v4.0.0"));
        assert!(version_newer("v4.0.0", "v4.0.1"));
        assert!(!version_newer("v4.0.0", "v4.0.0"));
        assert!(!version_newer("v4.1.0", "v4.0.9"));
    }
}
