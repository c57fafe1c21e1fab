//! `tiops destroy <cluster-name>`

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tiops_operation::{Operation, Options};
use tiops_profile::Profile;
use tiops_task::{Context, Task, TaskBuilder};
use tracing::info;

use super::confirm_or_abort;

/// Arguments of the destroy command.
#[derive(Args, Debug)]
pub struct DestroyArgs {
    /// Name of the cluster.
    pub name: String,
    /// Skip the confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

pub fn run(profile: &Profile, args: &DestroyArgs) -> Result<()> {
    let meta = profile.load_meta(&args.name)?;
    confirm_or_abort(
        &format!(
            "This will destroy cluster `{}` and all its data. Continue?",
            args.name
        ),
        args.yes,
    )?;
    let topo = Arc::new(meta.topology.clone());

    let task = TaskBuilder::new()
        .ssh_keyset(
            profile.ssh_key_path(&args.name),
            profile.ssh_pubkey_path(&args.name),
        )
        .cluster_ssh(&meta.topology, meta.user.clone(), None)
        .cluster_operate(Arc::clone(&topo), Operation::Stop, Options::default())
        .cluster_operate(topo, Operation::Destroy, Options::default())
        .build();
    task.execute(&Context::new())?;

    profile.remove_cluster(&args.name)?;
    info!(cluster = %args.name, "Destroyed cluster");
    println!("Destroyed cluster `{}` successfully", args.name);
    Ok(())
}
