//! `tiops patch <cluster-name> <package-path>`

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::Args;
use sha1::{Digest, Sha1};
use tiops_operation::{Operation, Options};
use tiops_profile::Profile;
use tiops_task::{Context, Task, TaskBuilder};
use tracing::info;

use super::{confirm_or_abort, instance_dir_paths};

/// Arguments of the patch command.
#[derive(Args, Debug)]
pub struct PatchArgs {
    /// Name of the cluster.
    pub name: String,
    /// Path of the package to install.
    pub package: String,

    /// Only patch these roles.
    #[arg(short = 'R', long = "role")]
    pub roles: Vec<String>,
    /// Only patch these nodes (`host:port`).
    #[arg(short = 'N', long = "node")]
    pub nodes: Vec<String>,
    /// Keep using this package for future scale-out operations.
    #[arg(long)]
    pub overwrite: bool,
    /// Skip leader transfer during the rolling restart.
    #[arg(long)]
    pub force: bool,
    /// Skip the confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

pub fn run(profile: &Profile, args: &PatchArgs) -> Result<()> {
    if args.roles.is_empty() && args.nodes.is_empty() {
        bail!("at least one of --role or --node must be specified");
    }
    if !Path::new(&args.package).exists() {
        bail!("specified package {} does not exist", args.package);
    }
    let meta = profile.load_meta(&args.name)?;

    // Resolve the instances being patched; they must share one role.
    let mut targets = Vec::new();
    for comp in meta.topology.components_by_start_order() {
        if !args.roles.is_empty() && !args.roles.contains(&comp.name().to_string()) {
            continue;
        }
        for inst in comp.instances() {
            if !args.nodes.is_empty() && !args.nodes.contains(&inst.id()) {
                continue;
            }
            targets.push(inst);
        }
    }
    if targets.is_empty() {
        bail!("no instance matched the given --role/--node filters");
    }
    let role = targets[0].component_name().to_string();
    if targets.iter().any(|t| t.component_name() != role) {
        bail!("patching multiple roles at once is not supported");
    }

    confirm_or_abort(
        &format!(
            "This will replace binaries of {} instance(s) of `{}`. Continue?",
            targets.len(),
            args.name
        ),
        args.yes,
    )?;

    let user = meta.user.clone();
    let topo = Arc::new(meta.topology.clone());

    let mut replace_tasks: Vec<Box<dyn Task>> = Vec::new();
    let mut target_ids = Vec::new();
    for inst in targets {
        let paths = instance_dir_paths(profile, &args.name, &user, inst.as_ref());
        target_ids.push(inst.id());
        replace_tasks.push(Box::new(
            TaskBuilder::new()
                .backup_component(
                    inst.component_name(),
                    meta.version.clone(),
                    inst.host(),
                    paths.deploy.clone(),
                )
                .install_package(&args.package, inst.host(), paths.deploy.clone())
                .build(),
        ));
    }

    let task = TaskBuilder::new()
        .ssh_keyset(
            profile.ssh_key_path(&args.name),
            profile.ssh_pubkey_path(&args.name),
        )
        .cluster_ssh(&meta.topology, user, None)
        .parallel_step("Replace packages", replace_tasks)
        .cluster_operate(
            topo,
            Operation::Upgrade,
            Options {
                roles: args.roles.clone(),
                nodes: target_ids,
                force: args.force,
            },
        )
        .build();
    task.execute(&Context::new())?;

    if args.overwrite {
        overwrite_patch(profile, &args.name, &role, &args.package)?;
    }
    info!(cluster = %args.name, role = %role, "Patched cluster");
    println!("Patched cluster `{}` successfully", args.name);
    Ok(())
}

/// Persists the package under the cluster's patch directory and points
/// `<role>.tar.gz` at it so later scale-outs pick it up.
fn overwrite_patch(profile: &Profile, cluster: &str, role: &str, package: &str) -> Result<()> {
    let patch_dir = profile.cluster_path(cluster, "patch");
    std::fs::create_dir_all(&patch_dir)?;

    let bytes = std::fs::read(package)
        .with_context(|| format!("failed to read package {}", package))?;
    let checksum: String = Sha1::digest(&bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();

    let target = patch_dir.join(format!("{}-{}.tar.gz", role, &checksum[..7]));
    std::fs::write(&target, &bytes)?;

    let link = patch_dir.join(format!("{}.tar.gz", role));
    if link.exists() {
        std::fs::remove_file(&link)?;
    }
    std::os::unix::fs::symlink(&target, &link)?;
    info!(role = %role, target = %target.display(), "Recorded patched package");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_patch_writes_checksummed_file_and_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::new(dir.path().join("profile")).unwrap();
        let package = dir.path().join("tikv-hotfix.tar.gz");
        std::fs::write(&package, b"patched-bytes").unwrap();

        overwrite_patch(&profile, "foo", "tikv", package.to_str().unwrap()).unwrap();

        let patch_dir = profile.cluster_path("foo", "patch");
        let link = patch_dir.join("tikv.tar.gz");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        let resolved = std::fs::read(&link).unwrap();
        assert_eq!(resolved, b"patched-bytes");

        // The target name embeds the first seven checksum chars.
        let entries: Vec<String> = std::fs::read_dir(&patch_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(entries.iter().any(|e| e.starts_with("tikv-") && e != "tikv.tar.gz"));
    }
}
