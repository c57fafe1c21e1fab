//! `tiops restart <cluster-name>`

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tiops_operation::{Operation, Options};
use tiops_profile::Profile;
use tiops_task::{Context, Task, TaskBuilder};
use tracing::info;

use super::confirm_or_abort;

/// Arguments of the restart command.
#[derive(Args, Debug)]
pub struct RestartArgs {
    /// Name of the cluster.
    pub name: String,
    /// Only restart these roles.
    #[arg(short = 'R', long = "role")]
    pub roles: Vec<String>,
    /// Only restart these nodes (`host:port`).
    #[arg(short = 'N', long = "node")]
    pub nodes: Vec<String>,
    /// Skip the confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

pub fn run(profile: &Profile, args: &RestartArgs) -> Result<()> {
    let meta = profile.load_meta(&args.name)?;
    confirm_or_abort(
        &format!("The cluster `{}` will be unavailable during restart. Continue?", args.name),
        args.yes,
    )?;
    let topo = Arc::new(meta.topology.clone());

    let task = TaskBuilder::new()
        .ssh_keyset(
            profile.ssh_key_path(&args.name),
            profile.ssh_pubkey_path(&args.name),
        )
        .cluster_ssh(&meta.topology, meta.user.clone(), None)
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

    info!(cluster = %args.name, "Restarted cluster");
    println!("Restarted cluster `{}` successfully", args.name);
    Ok(())
}
