use std::time::Duration;

use thiserror::Error;

/// Result type for executor operations.
pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Errors raised while talking to a remote host.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Could not establish the SSH connection.
    #[error("failed to connect to {host}:{port}: {reason}")]
    Connect {
        /// The target host.
        host: String,
        /// The SSH port.
        port: u16,
        /// Why the connection failed.
        reason: String,
    },

    /// The remote command exited non-zero with output on stderr.
    #[error("cmd: '{cmd}' on {host}:{port}, stderr: {stderr}")]
    CommandFailed {
        /// The target host.
        host: String,
        /// The SSH port.
        port: u16,
        /// The command that failed.
        cmd: String,
        /// Captured stderr.
        stderr: String,
    },

    /// The remote command exited non-zero without anything on stderr.
    #[error("cmd: '{cmd}' failed on {host}:{port}")]
    CommandExit {
        /// The target host.
        host: String,
        /// The SSH port.
        port: u16,
        /// The command that failed.
        cmd: String,
    },

    /// The command did not complete within the configured timeout.
    ///
    /// This is deliberately distinct from a non-zero exit: callers treat
    /// a timeout as "unknown outcome", not as failure output.
    #[error("timed out after {timeout:?} running '{cmd}' on {host}")]
    Timeout {
        /// The target host.
        host: String,
        /// The command that was running.
        cmd: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// A file transfer failed.
    #[error("failed to transfer {src} -> {dst} on {host}: {reason}")]
    Transfer {
        /// The target host.
        host: String,
        /// Source path.
        src: String,
        /// Destination path.
        dst: String,
        /// Why the transfer failed.
        reason: String,
    },

    /// Waiting for a port state change timed out.
    #[error("timed out waiting for port {port} to be {state}")]
    PortWait {
        /// The polled port.
        port: u16,
        /// The desired state, `started` or `stopped`.
        state: String,
    },

    /// Local I/O error while preparing an operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    /// Creates a connect error.
    pub fn connect(host: impl Into<String>, port: u16, reason: impl Into<String>) -> Self {
        Self::Connect {
            host: host.into(),
            port,
            reason: reason.into(),
        }
    }

    /// Creates a transfer error.
    pub fn transfer(
        host: impl Into<String>,
        src: impl Into<String>,
        dst: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Transfer {
            host: host.into(),
            src: src.into(),
            dst: dst.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error is a per-command timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
