//! Remote command execution for cluster hosts.
//!
//! Every task that touches a remote machine goes through the [`Executor`]
//! trait: run a command (optionally under sudo), or copy a file in either
//! direction. The production implementation shells out to the OpenSSH
//! client so no agent is required on target nodes; tests substitute a
//! mock that records commands and replays canned output.
//!
//! The crate also carries the low-level host modules built on top of an
//! executor: driving systemd units and waiting for a TCP port to change
//! state.

pub mod error;
pub mod local;
pub mod module;
pub mod retry;
pub mod ssh;

pub use error::{ExecutorError, Result};
pub use local::LocalExecutor;
pub use ssh::{SshConfig, SshExecutor};

/// Output of a remote command: captured stdout and stderr.
pub type Output = (Vec<u8>, Vec<u8>);

/// Uniform interface to a single remote (or local) host.
///
/// Implementations are expected to be cheap to share between threads;
/// the task context caches one executor per host.
pub trait Executor: Send + Sync {
    /// Runs `cmd` on the target, returning captured stdout and stderr.
    ///
    /// The command is always prefixed with `PATH=$PATH:/usr/bin:/usr/sbin`
    /// since login shells on minimal hosts may miss the sbin dirs. When
    /// `sudo` is set the command is wrapped in `sudo -H -u root bash -c`.
    /// Exceeding the configured timeout surfaces as
    /// [`ExecutorError::Timeout`], not as a failed command.
    fn exec(&self, cmd: &str, stdin: Option<&[u8]>, sudo: bool) -> Result<Output>;

    /// Copies a file between the local machine and the target.
    ///
    /// Uploads `src` to `dst` on the target by default; with `download`
    /// set, copies the remote `src` to the local `dst`, creating missing
    /// parent directories on the local side.
    fn transfer(&self, src: &str, dst: &str, download: bool) -> Result<()>;

    /// The host this executor is bound to.
    fn host(&self) -> &str;
}

pub(crate) const PATH_PREFIX: &str = "PATH=$PATH:/usr/bin:/usr/sbin";

/// Wraps a command for execution, applying the PATH prefix and sudo.
pub(crate) fn wrap_command(cmd: &str, sudo: bool) -> String {
    let cmd = if sudo {
        format!("sudo -H -u root bash -c \"{}\"", cmd)
    } else {
        cmd.to_string()
    };
    format!("{} {}", PATH_PREFIX, cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_command_plain() {
        assert_eq!(
            wrap_command("ls /tmp", false),
            "PATH=$PATH:/usr/bin:/usr/sbin ls /tmp"
        );
    }

    #[test]
    fn test_wrap_command_sudo() {
        assert_eq!(
            wrap_command("systemctl daemon-reload", true),
            "PATH=$PATH:/usr/bin:/usr/sbin sudo -H -u root bash -c \"systemctl daemon-reload\""
        );
    }
}
