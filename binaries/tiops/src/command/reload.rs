//! `tiops reload <cluster-name>`

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tiops_operation::{Operation, Options};
use tiops_profile::Profile;
use tiops_task::{Context, Task, TaskBuilder};
use tracing::info;

use super::{confirm_or_abort, instance_dir_paths};

/// Arguments of the reload command.
#[derive(Args, Debug)]
pub struct ReloadArgs {
    /// Name of the cluster.
    pub name: String,
    /// Only reload these roles.
    #[arg(short = 'R', long = "role")]
    pub roles: Vec<String>,
    /// Only reload these nodes (`host:port`).
    #[arg(short = 'N', long = "node")]
    pub nodes: Vec<String>,
    /// Skip the confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

pub fn run(profile: &Profile, args: &ReloadArgs) -> Result<()> {
    let meta = profile.load_meta(&args.name)?;
    confirm_or_abort(
        &format!("The cluster `{}` will be restarted to reload configs. Continue?", args.name),
        args.yes,
    )?;

    let user = meta.user.clone();
    let topo = Arc::new(meta.topology.clone());

    let mut regen_tasks: Vec<Box<dyn Task>> = Vec::new();
    for comp in meta.topology.components_by_start_order() {
        for inst in comp.instances() {
            if !args.roles.is_empty() && !args.roles.contains(&comp.name().to_string()) {
                continue;
            }
            if !args.nodes.is_empty() && !args.nodes.contains(&inst.id()) {
                continue;
            }
            let paths = instance_dir_paths(profile, &args.name, &user, inst.as_ref());
            regen_tasks.push(Box::new(
                TaskBuilder::new()
                    .init_config(&args.name, user.clone(), inst, Arc::clone(&topo), paths)
                    .build(),
            ));
        }
    }

    let task = TaskBuilder::new()
        .ssh_keyset(
            profile.ssh_key_path(&args.name),
            profile.ssh_pubkey_path(&args.name),
        )
        .cluster_ssh(&meta.topology, user, None)
        .parallel_step("Refresh configurations", regen_tasks)
        .cluster_operate(
            topo,
            Operation::Restart,
            Options {
                roles: args.roles.clone(),
                nodes: args.nodes.clone(),
                force: false,
            },
        )
        .build();
    task.execute(&Context::new())?;

    info!(cluster = %args.name, "Reloaded cluster");
    println!("Reloaded cluster `{}` successfully", args.name);
    Ok(())
}
