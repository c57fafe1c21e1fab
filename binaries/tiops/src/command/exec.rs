//! `tiops exec <cluster-name> --command <cmd>`

use anyhow::Result;
use clap::Args;
use tiops_profile::Profile;
use tiops_task::{Context, Task, TaskBuilder};

/// Arguments of the exec command.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Name of the cluster.
    pub name: String,
    /// The command to run on every host.
    #[arg(long, default_value = "whoami")]
    pub command: String,
    /// Run the command under sudo.
    #[arg(long)]
    pub sudo: bool,
    /// Skip the confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

pub fn run(profile: &Profile, args: &ExecArgs) -> Result<()> {
    let meta = profile.load_meta(&args.name)?;
    let hosts = meta.topology.unique_hosts();

    let mut builder = TaskBuilder::new()
        .ssh_keyset(
            profile.ssh_key_path(&args.name),
            profile.ssh_pubkey_path(&args.name),
        )
        .cluster_ssh(&meta.topology, meta.user.clone(), None);
    for host in &hosts {
        builder = builder.shell(host.clone(), args.command.clone(), args.sudo);
    }

    let ctx = Context::new();
    builder.build().execute(&ctx)?;

    for host in &hosts {
        if let Some(output) = ctx.get_outputs(host) {
            println!("Outputs of `{}` on {}:", args.command, host);
            print!("{}", String::from_utf8_lossy(&output.stdout));
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                eprint!("{}", stderr);
            }
        }
    }
    Ok(())
}
