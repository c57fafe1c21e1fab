//! `tiops check <topology.yaml>`

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use clap::Args;
use tiops_operation::CheckOptions;
use tiops_task::tasks::CheckKind;
use tiops_task::{Context, Task, TaskBuilder};
use tiops_topology::Topology;

use super::{mirror, DEFAULT_ARCH, DEFAULT_OS};

/// Version of the insight collector package.
const INSIGHT_VERSION: &str = "v0.3.1";
/// Scratch directory the collector runs from.
const CHECK_DIR: &str = "/tmp/tiops-check";

/// Arguments of the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path of the topology file whose hosts are checked.
    pub topology: String,

    /// System user to log in with.
    #[arg(long, default_value = "root")]
    pub user: String,
    /// Path of the SSH identity file of the system user.
    #[arg(short = 'i', long)]
    pub identity_file: Option<String>,
    /// Password of the system user.
    #[arg(long)]
    pub password: Option<String>,
    /// Also check CPU thread counts.
    #[arg(long)]
    pub enable_cpu: bool,
    /// Also check memory sizes.
    #[arg(long)]
    pub enable_mem: bool,
}

pub fn run(args: &CheckArgs) -> Result<()> {
    let topo = Topology::from_file(&args.topology)
        .with_context(|| format!("failed to load topology {}", args.topology))?;
    let options = CheckOptions {
        enable_cpu: args.enable_cpu,
        enable_mem: args.enable_mem,
    };

    let profile = tiops_profile::Profile::from_env()?;
    let timeout = Some(Duration::from_secs(60));

    let mut host_tasks: Vec<Box<dyn Task>> = Vec::new();
    topo.iter_hosts(|inst| {
        host_tasks.push(Box::new(
            TaskBuilder::new()
                .root_ssh(
                    inst.host(),
                    inst.ssh_port(),
                    args.user.clone(),
                    args.password.clone(),
                    args.identity_file.clone(),
                    None,
                    timeout,
                )
                .shell(inst.host(), format!("mkdir -p {}/bin", CHECK_DIR), false)
                .copy_component(
                    "insight",
                    INSIGHT_VERSION,
                    DEFAULT_OS,
                    DEFAULT_ARCH,
                    inst.host(),
                    CHECK_DIR,
                    "",
                    profile.clone(),
                )
                .shell(inst.host(), format!("{}/bin/insight", CHECK_DIR), false)
                .check_sys(inst.host(), args.user.clone(), CheckKind::Insight, options)
                .shell(inst.host(), "cat /etc/security/limits.conf", false)
                .check_sys(inst.host(), args.user.clone(), CheckKind::Limits, options)
                .shell(inst.host(), "sysctl -a", true)
                .check_sys(inst.host(), args.user.clone(), CheckKind::Sysctl, options)
                .shell(
                    inst.host(),
                    "systemctl list-units --type service --all --no-legend",
                    false,
                )
                .check_sys(inst.host(), args.user.clone(), CheckKind::Service, options)
                .rmdir(inst.host(), vec![CHECK_DIR.to_string()])
                .build(),
        ));
    });

    let ctx = Context::new();
    TaskBuilder::new()
        .download(
            "insight",
            INSIGHT_VERSION,
            DEFAULT_OS,
            DEFAULT_ARCH,
            profile.clone(),
            mirror(),
        )
        .parallel_step("Check hosts", host_tasks)
        .build()
        .execute(&ctx)?;

    let mut failures = 0usize;
    for host in ctx.checked_hosts() {
        for result in ctx.get_check_results(&host) {
            match (&result.error, result.is_warning()) {
                (None, _) => println!("{}: [Pass] {}", host, result.name),
                (Some(e), true) => println!("{}: [Warn] {}: {}", host, result.name, e),
                (Some(e), false) => {
                    failures += 1;
                    println!("{}: [Fail] {}: {}", host, result.name, e);
                }
            }
        }
    }
    if failures > 0 {
        bail!("{} check(s) failed", failures);
    }
    println!("All checks passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: CheckArgs,
    }

    #[test]
    fn test_check_flags_parse() {
        let harness =
            Harness::parse_from(["check", "topo.yaml", "--enable-cpu", "--enable-mem"]);
        assert!(harness.args.enable_cpu);
        assert!(harness.args.enable_mem);
        assert_eq!(harness.args.user, "root");
    }
}
