//! `tiops scale-in <cluster-name> --node <id>...`

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tiops_operation::scale_in::apply_scale_in;
use tiops_operation::{Operation, Options};
use tiops_profile::Profile;
use tiops_task::{Context, Task, TaskBuilder};
use tracing::info;

use super::{confirm_or_abort, instance_dir_paths};

/// Arguments of the scale-in command.
#[derive(Args, Debug)]
pub struct ScaleInArgs {
    /// Name of the cluster.
    pub name: String,
    /// Nodes to remove (`host:port`), repeatable.
    #[arg(short = 'N', long = "node", required = true)]
    pub nodes: Vec<String>,
    /// Skip the confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

pub fn run(profile: &Profile, args: &ScaleInArgs) -> Result<()> {
    let meta = profile.load_meta(&args.name)?;
    confirm_or_abort(
        &format!(
            "This will remove node(s) [{}] from cluster `{}`. Continue?",
            args.nodes.join(", "),
            args.name
        ),
        args.yes,
    )?;

    let topo = Arc::new(meta.topology.clone());
    let user = meta.user.clone();

    // Surviving instances get their configs re-rendered: endpoint
    // lists may have shrunk.
    let mut surviving = meta.topology.clone();
    apply_scale_in(&mut surviving, &args.nodes);
    let surviving_shared = Arc::new(surviving.clone());
    let mut regen_tasks: Vec<Box<dyn Task>> = Vec::new();
    for comp in surviving.components_by_start_order() {
        for inst in comp.instances() {
            if args.nodes.contains(&inst.id()) {
                continue;
            }
            let paths = instance_dir_paths(profile, &args.name, &user, inst.as_ref());
            regen_tasks.push(Box::new(
                TaskBuilder::new()
                    .init_config(
                        &args.name,
                        user.clone(),
                        inst,
                        Arc::clone(&surviving_shared),
                        paths,
                    )
                    .build(),
            ));
        }
    }

    let task = TaskBuilder::new()
        .ssh_keyset(
            profile.ssh_key_path(&args.name),
            profile.ssh_pubkey_path(&args.name),
        )
        .cluster_ssh(&meta.topology, user.clone(), None)
        .cluster_operate(
            topo,
            Operation::ScaleIn,
            Options {
                nodes: args.nodes.clone(),
                ..Default::default()
            },
        )
        .update_meta(
            &args.name,
            meta.clone(),
            args.nodes.clone(),
            profile.clone(),
        )
        .parallel_step("Refresh configurations", regen_tasks)
        .build();
    task.execute(&Context::new())?;

    info!(cluster = %args.name, "Scaled in cluster");
    println!("Scaled cluster `{}` in successfully", args.name);
    Ok(())
}
