//! `tiops display <cluster-name>`

use anyhow::Result;
use clap::Args;
use tiops_profile::Profile;

/// Arguments of the display command.
#[derive(Args, Debug)]
pub struct DisplayArgs {
    /// Name of the cluster.
    pub name: String,
}

pub fn run(profile: &Profile, args: &DisplayArgs) -> Result<()> {
    let meta = profile.load_meta(&args.name)?;
    let pd_endpoints = meta.topology.pd_endpoints();

    println!("TiDB Cluster: {}", args.name);
    println!("TiDB Version: {}", meta.version);
    println!(
        "{:<22} {:<14} {:<16} {:<12} {}",
        "ID", "Role", "Host", "Status", "Deploy Dir"
    );
    meta.topology.iter_instances(|inst| {
        println!(
            "{:<22} {:<14} {:<16} {:<12} {}",
            inst.id(),
            inst.component_name(),
            inst.host(),
            inst.status(&pd_endpoints),
            inst.deploy_dir(),
        );
    });
    Ok(())
}
