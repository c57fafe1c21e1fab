//! Plain remote commands: directories, ownership, arbitrary shell.

use tracing::debug;

use crate::context::{Context, HostOutput};
use crate::error::{Result, TaskError};
use crate::task::Task;

/// Creates directories on a host as the deploy user.
pub struct Mkdir {
    user: String,
    host: String,
    dirs: Vec<String>,
}

impl Mkdir {
    /// Creates the task; empty entries in `dirs` are skipped.
    pub fn new(user: impl Into<String>, host: impl Into<String>, dirs: Vec<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            dirs: dirs.into_iter().filter(|d| !d.is_empty()).collect(),
        }
    }
}

impl Task for Mkdir {
    fn execute(&self, ctx: &Context) -> Result<()> {
        let exec = ctx
            .get_executor(&self.host)
            .ok_or_else(|| TaskError::NoExecutor(self.host.clone()))?;
        for dir in &self.dirs {
            debug!(host = %self.host, dir = %dir, "mkdir");
            exec.exec(
                &format!(
                    "sudo -u {user} mkdir -p {dir} && sudo -u {user} chmod 755 {dir}",
                    user = self.user,
                    dir = dir
                ),
                None,
                true,
            )?;
        }
        Ok(())
    }

    fn stringify(&self) -> String {
        format!(
            "Mkdir: host={}, directories='{}'",
            self.host,
            self.dirs.join("','")
        )
    }
}

/// Removes directories on a host.
pub struct Rmdir {
    host: String,
    dirs: Vec<String>,
}

impl Rmdir {
    /// Creates the task; empty entries in `dirs` are skipped.
    pub fn new(host: impl Into<String>, dirs: Vec<String>) -> Self {
        Self {
            host: host.into(),
            dirs: dirs.into_iter().filter(|d| !d.is_empty()).collect(),
        }
    }
}

impl Task for Rmdir {
    fn execute(&self, ctx: &Context) -> Result<()> {
        let exec = ctx
            .get_executor(&self.host)
            .ok_or_else(|| TaskError::NoExecutor(self.host.clone()))?;
        exec.exec(&format!("rm -rf {};", self.dirs.join(" ")), None, true)?;
        Ok(())
    }

    fn stringify(&self) -> String {
        format!(
            "Rmdir: host={}, directories='{}'",
            self.host,
            self.dirs.join("','")
        )
    }
}

/// Transfers ownership of a path to the deploy user.
pub struct Chown {
    user: String,
    host: String,
    path: String,
}

impl Chown {
    /// Creates the task.
    pub fn new(user: impl Into<String>, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            path: path.into(),
        }
    }
}

impl Task for Chown {
    fn execute(&self, ctx: &Context) -> Result<()> {
        let exec = ctx
            .get_executor(&self.host)
            .ok_or_else(|| TaskError::NoExecutor(self.host.clone()))?;
        exec.exec(
            &format!("chown -R {}:{} {}", self.user, self.user, self.path),
            None,
            true,
        )?;
        Ok(())
    }

    fn stringify(&self) -> String {
        format!("Chown: host={}, path={}", self.host, self.path)
    }
}

/// Runs an arbitrary command and stores its output in the context.
pub struct Shell {
    host: String,
    command: String,
    sudo: bool,
}

impl Shell {
    /// Creates the task.
    pub fn new(host: impl Into<String>, command: impl Into<String>, sudo: bool) -> Self {
        Self {
            host: host.into(),
            command: command.into(),
            sudo,
        }
    }
}

impl Task for Shell {
    fn execute(&self, ctx: &Context) -> Result<()> {
        let exec = ctx
            .get_executor(&self.host)
            .ok_or_else(|| TaskError::NoExecutor(self.host.clone()))?;
        match exec.exec(&self.command, None, self.sudo) {
            Ok((stdout, stderr)) => {
                ctx.set_outputs(
                    &self.host,
                    HostOutput {
                        stdout,
                        stderr,
                        ok: true,
                    },
                );
                Ok(())
            }
            Err(e) => {
                ctx.set_outputs(
                    &self.host,
                    HostOutput {
                        stdout: Vec::new(),
                        stderr: e.to_string().into_bytes(),
                        ok: false,
                    },
                );
                Err(e.into())
            }
        }
    }

    fn stringify(&self) -> String {
        format!("Shell: host={}, cmd='{}'", self.host, self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tiops_executor::LocalExecutor;

    #[test]
    fn test_shell_stores_outputs_in_context() {
        let ctx = Context::new();
        ctx.set_executor("localhost", Arc::new(LocalExecutor::new()));

        Shell::new("localhost", "echo captured", false)
            .execute(&ctx)
            .unwrap();

        let out = ctx.get_outputs("localhost").unwrap();
        assert!(out.ok);
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "captured");
    }

    #[test]
    fn test_shell_failure_marks_output_not_ok() {
        let ctx = Context::new();
        ctx.set_executor("localhost", Arc::new(LocalExecutor::new()));

        Shell::new("localhost", "ls /definitely-not-a-dir", false)
            .execute(&ctx)
            .unwrap_err();
        assert!(!ctx.get_outputs("localhost").unwrap().ok);
    }

    #[test]
    fn test_missing_executor_is_an_error() {
        let ctx = Context::new();
        let err = Shell::new("10.0.0.1", "true", false)
            .execute(&ctx)
            .unwrap_err();
        assert!(matches!(err, TaskError::NoExecutor(_)));
    }
}
