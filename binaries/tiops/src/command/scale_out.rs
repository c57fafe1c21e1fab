//! `tiops scale-out <cluster-name> <topology.yaml>`

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use tiops_operation::precheck::{check_cluster_conflicts, DirConflictMode};
use tiops_operation::{Operation, Options};
use tiops_profile::Profile;
use tiops_task::{Context, Task, TaskBuilder};
use tiops_topology::Topology;
use tracing::info;

use super::{
    component_version, components_to_download, confirm_or_abort, instance_dir_paths, mirror,
    print_topology, DEFAULT_ARCH, DEFAULT_OS,
};

/// Arguments of the scale-out command.
#[derive(Args, Debug)]
pub struct ScaleOutArgs {
    /// Name of the cluster.
    pub name: String,
    /// Path of the topology file describing the new instances.
    pub topology: String,

    /// System user to log in with for preparing new hosts.
    #[arg(long, default_value = "root")]
    pub user: String,
    /// Path of the SSH identity file of the system user.
    #[arg(short = 'i', long)]
    pub identity_file: Option<String>,
    /// Password of the system user.
    #[arg(long)]
    pub password: Option<String>,
    /// Passphrase of the identity file.
    #[arg(long)]
    pub passphrase: Option<String>,
    /// SSH connection timeout in seconds.
    #[arg(long, default_value_t = 60)]
    pub ssh_timeout: u64,
    /// Skip the confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

pub fn run(profile: &Profile, args: &ScaleOutArgs) -> Result<()> {
    let mut meta = profile.load_meta(&args.name)?;
    let incoming = Topology::from_file(&args.topology)
        .with_context(|| format!("failed to load topology {}", args.topology))?;

    // The combined topology must satisfy every invariant the original
    // had to, before any remote I/O happens.
    let merged = meta.topology.merge(&incoming);
    merged.validate()?;
    check_cluster_conflicts(
        profile,
        &args.name,
        &meta.user,
        &merged,
        DirConflictMode::Exact,
    )?;

    println!("New instances:");
    print_topology(&incoming);
    confirm_or_abort("Do you want to continue?", args.yes)?;

    let mut new_ids = HashSet::new();
    incoming.iter_instances(|inst| {
        new_ids.insert(inst.id());
    });

    let user = meta.user.clone();
    let timeout = Some(Duration::from_secs(args.ssh_timeout));
    let merged_shared = Arc::new(merged.clone());
    let mirror = mirror();

    // Packages for the roles the new instances bring.
    let download_tasks: Vec<Box<dyn Task>> = components_to_download(&incoming, &meta.version)
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

    // Prepare hosts that are new to the cluster.
    let mut known_hosts = HashSet::new();
    meta.topology.iter_hosts(|inst| {
        known_hosts.insert(inst.host().to_string());
    });
    let mut env_init_tasks: Vec<Box<dyn Task>> = Vec::new();
    incoming.iter_hosts(|inst| {
        if known_hosts.contains(inst.host()) {
            return;
        }
        env_init_tasks.push(Box::new(
            TaskBuilder::new()
                .root_ssh(
                    inst.host(),
                    inst.ssh_port(),
                    args.user.clone(),
                    args.password.clone(),
                    args.identity_file.clone(),
                    args.passphrase.clone(),
                    timeout,
                )
                .env_init(inst.host(), user.clone())
                .user_ssh(inst.host(), inst.ssh_port(), user.clone(), timeout)
                .build(),
        ));
    });

    // Deploy the new instances with the scale variant of their config.
    let mut deploy_tasks: Vec<Box<dyn Task>> = Vec::new();
    for comp in merged.components_by_start_order() {
        for inst in comp.instances() {
            if !new_ids.contains(&inst.id()) {
                continue;
            }
            let paths = instance_dir_paths(profile, &args.name, &user, inst.as_ref());
            let mut dirs = vec![
                format!("{}/bin", paths.deploy),
                format!("{}/conf", paths.deploy),
                format!("{}/scripts", paths.deploy),
                paths.log.clone(),
            ];
            if let Some(data) = &paths.data {
                dirs.push(data.clone());
            }
            deploy_tasks.push(Box::new(
                TaskBuilder::new()
                    .mkdir(user.clone(), inst.host(), dirs)
                    .copy_component(
                        inst.component_name(),
                        component_version(inst.component_name(), &meta.version),
                        DEFAULT_OS,
                        DEFAULT_ARCH,
                        inst.host(),
                        paths.deploy.clone(),
                        &args.name,
                        profile.clone(),
                    )
                    .scale_config(
                        &args.name,
                        user.clone(),
                        inst,
                        Arc::clone(&merged_shared),
                        paths,
                    )
                    .build(),
            ));
        }
    }

    // New hosts also get the monitoring agents.
    let mut monitored_tasks: Vec<Box<dyn Task>> = Vec::new();
    let monitored_paths = super::monitored_dir_paths(profile, &args.name, &user, &merged);
    incoming.iter_hosts(|inst| {
        if known_hosts.contains(inst.host()) {
            return;
        }
        for comp in [
            tiops_topology::spec::component::NODE_EXPORTER,
            tiops_topology::spec::component::BLACKBOX_EXPORTER,
        ] {
            let paths = monitored_paths.clone();
            let mut dirs = vec![
                format!("{}/bin", paths.deploy),
                format!("{}/conf", paths.deploy),
                format!("{}/scripts", paths.deploy),
                paths.log.clone(),
            ];
            if let Some(data) = &paths.data {
                dirs.push(data.clone());
            }
            monitored_tasks.push(Box::new(
                TaskBuilder::new()
                    .mkdir(user.clone(), inst.host(), dirs)
                    .copy_component(
                        comp,
                        component_version(comp, &meta.version),
                        DEFAULT_OS,
                        DEFAULT_ARCH,
                        inst.host(),
                        paths.deploy.clone(),
                        &args.name,
                        profile.clone(),
                    )
                    .monitored_config(
                        &args.name,
                        comp,
                        inst.host(),
                        merged.monitored.clone(),
                        user.clone(),
                        paths,
                    )
                    .build(),
            ));
        }
    });

    // Endpoint lists grew: every pre-existing instance re-renders.
    let mut regen_tasks: Vec<Box<dyn Task>> = Vec::new();
    for comp in merged.components_by_start_order() {
        for inst in comp.instances() {
            if new_ids.contains(&inst.id()) {
                continue;
            }
            let paths = instance_dir_paths(profile, &args.name, &user, inst.as_ref());
            regen_tasks.push(Box::new(
                TaskBuilder::new()
                    .init_config(
                        &args.name,
                        user.clone(),
                        inst,
                        Arc::clone(&merged_shared),
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
        .cluster_ssh(&meta.topology, user.clone(), timeout)
        .parallel_step("Download packages", download_tasks)
        .parallel_step("Initialize new hosts", env_init_tasks)
        .parallel_step("Deploy new instances", deploy_tasks)
        .parallel_step("Deploy monitoring agents", monitored_tasks)
        .parallel_step("Refresh configurations", regen_tasks)
        .cluster_operate(
            Arc::clone(&merged_shared),
            Operation::Start,
            Options {
                nodes: new_ids.iter().cloned().collect(),
                ..Default::default()
            },
        )
        .build();
    task.execute(&Context::new())?;

    meta.topology = merged;
    profile.save_meta(&args.name, &meta)?;
    info!(cluster = %args.name, "Scaled out cluster");
    println!("Scaled cluster `{}` out successfully", args.name);
    Ok(())
}
