//! SSH transport backed by the OpenSSH client binaries.
//!
//! Shelling out to `ssh`/`scp` keeps the target side agent-free and lets
//! the operator's own ssh config (jump hosts, ciphers) apply unchanged.
//! Password authentication is delegated to `sshpass` when requested.

use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{ExecutorError, Result};
use crate::{wrap_command, Executor, Output};

/// Default timeout for a single remote command.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum time to wait for the TCP connection to establish.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Poll interval while waiting for a child process to exit.
const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Configuration needed to establish an SSH connection.
#[derive(Debug, Clone, Default)]
pub struct SshConfig {
    /// Hostname of the SSH server.
    pub host: String,
    /// Port of the SSH server, 22 when zero.
    pub port: u16,
    /// Username to log in as.
    pub user: String,
    /// Password of the user; delegated to `sshpass`.
    pub password: Option<String>,
    /// Path to the private key file.
    pub key_file: Option<String>,
    /// Passphrase of the private key file.
    pub passphrase: Option<String>,
    /// Per-command timeout; [`DEFAULT_EXEC_TIMEOUT`] when `None`.
    pub timeout: Option<Duration>,
}

/// [`Executor`] implementation speaking to one host over OpenSSH.
pub struct SshExecutor {
    config: SshConfig,
}

impl SshExecutor {
    /// Builds an executor from the given connection config.
    pub fn new(mut config: SshConfig) -> Self {
        if config.port == 0 {
            config.port = 22;
        }
        Self { config }
    }

    fn timeout(&self) -> Duration {
        self.config.timeout.unwrap_or(DEFAULT_EXEC_TIMEOUT)
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.config.user, self.config.host)
    }

    /// Common `ssh`/`scp` options: trust-on-first-use, batch friendly.
    fn base_command(&self, program: &str) -> Command {
        let mut cmd = match &self.config.password {
            Some(password) => {
                let mut c = Command::new("sshpass");
                c.arg("-p").arg(password).arg(program);
                c
            }
            None => Command::new(program),
        };
        cmd.arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", CONNECT_TIMEOUT_SECS));
        if let Some(key) = &self.config.key_file {
            cmd.arg("-i").arg(key);
        }
        cmd
    }

    /// Waits for `child` to finish within `timeout`, killing it on expiry.
    fn wait_with_timeout(&self, mut child: Child, cmd: &str) -> Result<(Output, bool)> {
        let deadline = Instant::now() + self.timeout();
        loop {
            match child.try_wait()? {
                Some(status) => {
                    let out = child.wait_with_output()?;
                    return Ok(((out.stdout, out.stderr), status.success()));
                }
                None => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ExecutorError::Timeout {
                            host: self.config.host.clone(),
                            cmd: cmd.to_string(),
                            timeout: self.timeout(),
                        });
                    }
                    std::thread::sleep(CHILD_POLL_INTERVAL);
                }
            }
        }
    }
}

impl Executor for SshExecutor {
    fn exec(&self, cmd: &str, stdin: Option<&[u8]>, sudo: bool) -> Result<Output> {
        let wrapped = wrap_command(cmd, sudo);
        trace!(host = %self.config.host, cmd = %wrapped, "Running remote command");

        let mut command = self.base_command("ssh");
        command
            .arg("-p")
            .arg(self.config.port.to_string())
            .arg(self.destination())
            .arg("--")
            .arg(&wrapped)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            ExecutorError::connect(&self.config.host, self.config.port, e.to_string())
        })?;

        if let Some(data) = stdin {
            // The write target is the child's pipe; a vanished child shows
            // up as the exit status below, not here.
            if let Some(mut pipe) = child.stdin.take() {
                let _ = pipe.write_all(data);
            }
        }

        let ((stdout, stderr), success) = self.wait_with_timeout(child, &wrapped)?;
        debug!(
            host = %self.config.host,
            ok = success,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "Remote command finished"
        );

        if !success {
            if stderr.is_empty() {
                return Err(ExecutorError::CommandExit {
                    host: self.config.host.clone(),
                    port: self.config.port,
                    cmd: wrapped,
                });
            }
            return Err(ExecutorError::CommandFailed {
                host: self.config.host.clone(),
                port: self.config.port,
                cmd: wrapped,
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            });
        }
        Ok((stdout, stderr))
    }

    fn transfer(&self, src: &str, dst: &str, download: bool) -> Result<()> {
        let (from, to) = if download {
            // Make sure the local target directory exists first.
            if let Some(parent) = Path::new(dst).parent() {
                std::fs::create_dir_all(parent)?;
            }
            (format!("{}:{}", self.destination(), src), dst.to_string())
        } else {
            (src.to_string(), format!("{}:{}", self.destination(), dst))
        };

        let mut command = self.base_command("scp");
        command
            .arg("-P")
            .arg(self.config.port.to_string())
            .arg("-q")
            .arg(&from)
            .arg(&to)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = command.spawn().map_err(|e| {
            ExecutorError::transfer(&self.config.host, src, dst, e.to_string())
        })?;
        let ((_, stderr), success) =
            self.wait_with_timeout(child, &format!("scp {} {}", from, to))?;
        if !success {
            return Err(ExecutorError::transfer(
                &self.config.host,
                src,
                dst,
                String::from_utf8_lossy(&stderr).into_owned(),
            ));
        }
        Ok(())
    }

    fn host(&self) -> &str {
        &self.config.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port() {
        let exec = SshExecutor::new(SshConfig {
            host: "10.0.0.1".to_string(),
            user: "tidb".to_string(),
            ..Default::default()
        });
        assert_eq!(exec.config.port, 22);
        assert_eq!(exec.destination(), "tidb@10.0.0.1");
    }

    #[test]
    fn test_explicit_port_preserved() {
        let exec = SshExecutor::new(SshConfig {
            host: "10.0.0.1".to_string(),
            port: 2222,
            user: "root".to_string(),
            ..Default::default()
        });
        assert_eq!(exec.config.port, 2222);
    }
}
