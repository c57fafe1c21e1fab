//! tiops: deploy and operate TiDB clusters over SSH.
//!
//! Every invocation is a one-shot reconciliation: a command loads or
//! parses a topology, compiles a task graph, executes it against a
//! fresh context and persists the resulting metadata. Mutating
//! commands leave an audit entry under the profile directory.

mod audit_log;
mod command;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tiops_profile::{audit, Profile};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use audit_log::AuditBuffer;

/// Environment variable enabling verbose error chains.
const ENV_BACKTRACE: &str = "TIUP_BACKTRACE";
/// Environment variable changing the working directory first.
const ENV_WORK_DIR: &str = "TIUP_WORK_DIR";

#[derive(Parser)]
#[command(
    name = "tiops",
    about = "Deploy and operate TiDB clusters for production",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy a new cluster.
    Deploy(command::deploy::DeployArgs),
    /// Start a deployed cluster.
    Start(command::start::StartArgs),
    /// Stop a running cluster.
    Stop(command::stop::StopArgs),
    /// Restart a cluster.
    Restart(command::restart::RestartArgs),
    /// Destroy a cluster, removing its data.
    Destroy(command::destroy::DestroyArgs),
    /// Upgrade a cluster to a newer version.
    Upgrade(command::upgrade::UpgradeArgs),
    /// Remove nodes from a cluster.
    #[command(name = "scale-in")]
    ScaleIn(command::scale_in::ScaleInArgs),
    /// Add nodes to a cluster.
    #[command(name = "scale-out")]
    ScaleOut(command::scale_out::ScaleOutArgs),
    /// Replace a component's binaries with a local package.
    Patch(command::patch::PatchArgs),
    /// Show a cluster's topology and status.
    Display(command::display::DisplayArgs),
    /// List all clusters of this profile.
    List(command::list::ListArgs),
    /// Show audit log entries.
    Audit(command::audit::AuditArgs),
    /// Edit the cluster configuration.
    #[command(name = "edit-config")]
    EditConfig(command::edit_config::EditConfigArgs),
    /// Regenerate configs and restart the cluster.
    Reload(command::reload::ReloadArgs),
    /// Run a command on every host of a cluster.
    Exec(command::exec::ExecArgs),
    /// Check hosts of a topology before deploying.
    Check(command::check::CheckArgs),
}

impl Command {
    /// Commands that leave an audit entry.
    fn is_audited(&self) -> bool {
        !matches!(
            self,
            Self::Display(_) | Self::List(_) | Self::Audit(_) | Self::Check(_)
        )
    }
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    if let Ok(dir) = std::env::var(ENV_WORK_DIR) {
        if !dir.is_empty() {
            if let Err(e) = std::env::set_current_dir(&dir) {
                eprintln!("Error: cannot enter {}: {}", dir, e);
                return 1;
            }
        }
    }

    let buffer = AuditBuffer::new();
    init_tracing(&buffer);

    let cli = Cli::parse();
    let profile = match Profile::from_env() {
        Ok(profile) => profile,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let result = dispatch(&cli.command, &profile);

    if cli.command.is_audited() {
        let args: Vec<String> = std::env::args().collect();
        if let Err(e) = audit::write(&profile.audit_dir(), &args, &buffer.contents()) {
            eprintln!("Warning: failed to write audit log: {}", e);
        }
    }

    match result {
        Ok(()) => 0,
        Err(e) => {
            render_error(&e);
            1
        }
    }
}

fn init_tracing(buffer: &AuditBuffer) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(buffer.clone()),
        )
        .init();
}

fn dispatch(command: &Command, profile: &Profile) -> Result<()> {
    match command {
        Command::Deploy(args) => command::deploy::run(profile, args),
        Command::Start(args) => command::start::run(profile, args),
        Command::Stop(args) => command::stop::run(profile, args),
        Command::Restart(args) => command::restart::run(profile, args),
        Command::Destroy(args) => command::destroy::run(profile, args),
        Command::Upgrade(args) => command::upgrade::run(profile, args),
        Command::ScaleIn(args) => command::scale_in::run(profile, args),
        Command::ScaleOut(args) => command::scale_out::run(profile, args),
        Command::Patch(args) => command::patch::run(profile, args),
        Command::Display(args) => command::display::run(profile, args),
        Command::List(args) => command::list::run(profile, args),
        Command::Audit(args) => command::audit::run(profile, args),
        Command::EditConfig(args) => command::edit_config::run(profile, args),
        Command::Reload(args) => command::reload::run(profile, args),
        Command::Exec(args) => command::exec::run(profile, args),
        Command::Check(args) => command::check::run(args),
    }
}

fn suggestion_of_task_error(err: &tiops_task::TaskError) -> Option<String> {
    use tiops_task::TaskError;
    match err {
        TaskError::Operation(tiops_operation::OperationError::PreCheck(pre)) => {
            Some(pre.suggestion().to_string())
        }
        TaskError::Child { source, .. } => suggestion_of_task_error(source),
        TaskError::Aggregate(errors) => errors.iter().find_map(suggestion_of_task_error),
        _ => None,
    }
}

/// Finds a pre-check suggestion anywhere in the error chain.
fn find_suggestion(err: &anyhow::Error) -> Option<String> {
    for cause in err.chain() {
        if let Some(task) = cause.downcast_ref::<tiops_task::TaskError>() {
            if let Some(s) = suggestion_of_task_error(task) {
                return Some(s);
            }
        }
        if let Some(tiops_operation::OperationError::PreCheck(pre)) =
            cause.downcast_ref::<tiops_operation::OperationError>()
        {
            return Some(pre.suggestion().to_string());
        }
        if let Some(pre) = cause.downcast_ref::<tiops_operation::PreCheckError>() {
            return Some(pre.suggestion().to_string());
        }
    }
    None
}

/// Prints the failure: pre-check errors get their suggestion, all
/// others get the cause chain, one space of extra indent per level.
fn render_error(err: &anyhow::Error) {
    eprintln!("Error: {}", err);

    if let Some(suggestion) = find_suggestion(err) {
        eprintln!("\n{}", suggestion);
        return;
    }

    let verbose = std::env::var(ENV_BACKTRACE).map(|v| !v.is_empty()).unwrap_or(false);
    let mut indent = String::new();
    for cause in err.chain().skip(1) {
        indent.push(' ');
        eprintln!("{}caused by: {}", indent, cause);
    }
    if verbose {
        eprintln!("\n{:#?}", err);
    }
}
