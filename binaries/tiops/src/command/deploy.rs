//! `tiops deploy <cluster-name> <version> <topology.yaml>`

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use tiops_operation::precheck::{
    check_cluster_conflicts, check_name_available, DirConflictMode,
};
use tiops_operation::PreCheckError;
use tiops_profile::{validate_cluster_name, ClusterMeta, Profile};
use tiops_task::{Context, Task, TaskBuilder};
use tiops_topology::spec::component;
use tiops_topology::Topology;
use tracing::info;

use super::{
    components_to_download, confirm_or_abort, instance_dir_paths, mirror,
    monitored_dir_paths, print_topology, DEFAULT_ARCH, DEFAULT_OS,
};

/// Arguments of the deploy command.
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Name of the new cluster.
    pub name: String,
    /// Cluster version, e.g. v4.0.0.
    pub version: String,
    /// Path of the topology file.
    pub topology: String,

    /// System user to log in with for host preparation.
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
    /// Skip the confirmation of the topology.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

pub fn run(profile: &Profile, args: &DeployArgs) -> Result<()> {
    validate_cluster_name(&args.name)?;
    check_name_available(profile, &args.name)?;

    if args.identity_file.is_none() && args.password.is_none() {
        return Err(PreCheckError::CredentialMissing {
            suggestion: "Specify either an SSH identity file (-i <file>) or a password \
                         (--password <password>) to connect to the hosts."
                .to_string(),
        }
        .into());
    }

    let topo = Topology::from_file(&args.topology)
        .with_context(|| format!("failed to load topology {}", args.topology))?;
    check_cluster_conflicts(
        profile,
        &args.name,
        &topo.global.user,
        &topo,
        DirConflictMode::PrefixContainment,
    )?;

    println!("Cluster name: {}", args.name);
    println!("Cluster version: {}", args.version);
    print_topology(&topo);
    confirm_or_abort("Do you want to continue?", args.yes)?;

    let task = build_deploy_graph(profile, &args.name, &args.version, &topo, args);
    let ctx = Context::new();
    task.execute(&ctx)?;

    profile.save_meta(
        &args.name,
        &ClusterMeta::new(topo.global.user.clone(), args.version.clone(), topo),
    )?;
    info!(cluster = %args.name, "Deployed cluster successfully");
    println!("Deployed cluster `{}` successfully", args.name);
    Ok(())
}

fn build_deploy_graph(
    profile: &Profile,
    cluster: &str,
    version: &str,
    topo: &Topology,
    args: &DeployArgs,
) -> impl Task {
    let mirror = mirror();
    let timeout = Some(Duration::from_secs(args.ssh_timeout));
    let user = topo.global.user.clone();
    let shared_topo = Arc::new(topo.clone());

    // Phase 1: fetch every needed package into the local cache.
    let download_tasks: Vec<Box<dyn Task>> = components_to_download(topo, version)
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

    // Phase 2: prepare every unique host as root, then switch to the
    // deploy user.
    let mut env_init_tasks: Vec<Box<dyn Task>> = Vec::new();
    topo.iter_hosts(|inst| {
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

    // Phase 3: per-instance directories, binaries and configs.
    let mut deploy_tasks: Vec<Box<dyn Task>> = Vec::new();
    for comp in topo.components_by_start_order() {
        for inst in comp.instances() {
            let paths = instance_dir_paths(profile, cluster, &user, inst.as_ref());
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
                        super::component_version(inst.component_name(), version),
                        DEFAULT_OS,
                        DEFAULT_ARCH,
                        inst.host(),
                        paths.deploy.clone(),
                        cluster,
                        profile.clone(),
                    )
                    .init_config(
                        cluster,
                        user.clone(),
                        inst,
                        Arc::clone(&shared_topo),
                        paths,
                    )
                    .build(),
            ));
        }
    }

    // Phase 4: the monitoring agents, once per host per exporter.
    let mut monitored_tasks: Vec<Box<dyn Task>> = Vec::new();
    let monitored_paths = monitored_dir_paths(profile, cluster, &user, topo);
    topo.iter_hosts(|inst| {
        for comp in [component::NODE_EXPORTER, component::BLACKBOX_EXPORTER] {
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
                        super::component_version(comp, version),
                        DEFAULT_OS,
                        DEFAULT_ARCH,
                        inst.host(),
                        paths.deploy.clone(),
                        cluster,
                        profile.clone(),
                    )
                    .monitored_config(
                        cluster,
                        comp,
                        inst.host(),
                        topo.monitored.clone(),
                        user.clone(),
                        paths,
                    )
                    .build(),
            ));
        }
    });

    TaskBuilder::new()
        .ssh_keygen(profile.ssh_key_path(cluster))
        .parallel_step("Download packages", download_tasks)
        .parallel_step("Initialize hosts", env_init_tasks)
        .parallel_step("Deploy instances", deploy_tasks)
        .parallel_step("Deploy monitoring agents", monitored_tasks)
        .build()
}
