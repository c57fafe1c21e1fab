//! `tiops edit-config <cluster-name>`

use anyhow::{bail, Context as _, Result};
use clap::Args;
use tiops_profile::Profile;
use tiops_topology::Topology;
use tracing::info;

/// Arguments of the edit-config command.
#[derive(Args, Debug)]
pub struct EditConfigArgs {
    /// Name of the cluster.
    pub name: String,
    /// Skip the confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

pub fn run(profile: &Profile, args: &EditConfigArgs) -> Result<()> {
    let mut meta = profile.load_meta(&args.name)?;

    // Hand the current topology to $EDITOR and read it back.
    let original = meta.topology.to_yaml()?;
    let tmp = profile.cluster_path(&args.name, "topology.yaml.tmp");
    std::fs::write(&tmp, &original)?;

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let status = std::process::Command::new(&editor)
        .arg(&tmp)
        .status()
        .with_context(|| format!("failed to launch editor {}", editor))?;
    if !status.success() {
        let _ = std::fs::remove_file(&tmp);
        bail!("editor exited with {}", status);
    }

    let edited = std::fs::read_to_string(&tmp)?;
    let _ = std::fs::remove_file(&tmp);
    if edited == original {
        println!("The configuration is unchanged");
        return Ok(());
    }

    let new_topo = Topology::from_str(&edited).context("edited topology is invalid")?;

    // Only configuration is editable here; instance membership changes
    // go through scale-in/scale-out.
    copy_instance_configs(&mut meta.topology, &new_topo);
    meta.topology.server_configs = new_topo.server_configs;

    super::confirm_or_abort("Apply the new configuration?", args.yes)?;
    profile.save_meta(&args.name, &meta)?;
    info!(cluster = %args.name, "Updated cluster configuration");
    println!(
        "Updated configuration of `{}`; run `tiops reload {}` to apply",
        args.name, args.name
    );
    Ok(())
}

/// Carries per-instance `config` maps over from the edited topology,
/// matching instances by host and primary port.
fn copy_instance_configs(current: &mut Topology, edited: &Topology) {
    for s in &mut current.tidb_servers {
        if let Some(e) = edited
            .tidb_servers
            .iter()
            .find(|e| e.host == s.host && e.port == s.port)
        {
            s.config = e.config.clone();
        }
    }
    for s in &mut current.tikv_servers {
        if let Some(e) = edited
            .tikv_servers
            .iter()
            .find(|e| e.host == s.host && e.port == s.port)
        {
            s.config = e.config.clone();
        }
    }
    for s in &mut current.pd_servers {
        if let Some(e) = edited
            .pd_servers
            .iter()
            .find(|e| e.host == s.host && e.client_port == s.client_port)
        {
            s.config = e.config.clone();
        }
    }
    for s in &mut current.tiflash_servers {
        if let Some(e) = edited
            .tiflash_servers
            .iter()
            .find(|e| e.host == s.host && e.tcp_port == s.tcp_port)
        {
            s.config = e.config.clone();
            s.learner_config = e.learner_config.clone();
        }
    }
    for s in &mut current.pump_servers {
        if let Some(e) = edited
            .pump_servers
            .iter()
            .find(|e| e.host == s.host && e.port == s.port)
        {
            s.config = e.config.clone();
        }
    }
    for s in &mut current.drainer_servers {
        if let Some(e) = edited
            .drainer_servers
            .iter()
            .find(|e| e.host == s.host && e.port == s.port)
        {
            s.config = e.config.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_copy_instance_configs_matches_by_identity() {
        let mut current = Topology::from_str(
            "tikv_servers:\n  - host: 10.0.0.1\n  - host: 10.0.0.2\n",
        )
        .unwrap();
        let edited = Topology::from_str(
            "tikv_servers:\n  - host: 10.0.0.1\n    config:\n      log-level: debug\n  - host: 10.0.0.2\n",
        )
        .unwrap();

        copy_instance_configs(&mut current, &edited);
        assert_eq!(
            current.tikv_servers[0].config.get("log-level"),
            Some(&json!("debug"))
        );
        assert!(current.tikv_servers[1].config.is_empty());
    }
}
