//! Interpretation of host check output.

use tiops_operation::check::{
    check_kernel_params, check_services, check_sys_limits, check_system_info,
};
use tiops_operation::{CheckOptions, OperationError};

use crate::context::Context;
use crate::error::{Result, TaskError};
use crate::task::Task;

/// What kind of output sits in the context for this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// JSON from the insight collector.
    Insight,
    /// `/etc/security/limits.conf` content.
    Limits,
    /// `sysctl -a` output.
    Sysctl,
    /// `systemctl list-units` output.
    Service,
}

impl CheckKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Insight => "insight",
            Self::Limits => "limits",
            Self::Sysctl => "sysctl",
            Self::Service => "service",
        }
    }
}

/// Parses the most recent output of a host into check results.
///
/// The raw output is produced by a preceding `Shell` task; this task
/// only interprets what is already in the context.
pub struct CheckSys {
    host: String,
    user: String,
    kind: CheckKind,
    options: CheckOptions,
}

impl CheckSys {
    /// Creates the task.
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        kind: CheckKind,
        options: CheckOptions,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            kind,
            options,
        }
    }
}

impl Task for CheckSys {
    fn execute(&self, ctx: &Context) -> Result<()> {
        let output = ctx.get_outputs(&self.host).ok_or_else(|| {
            TaskError::Operation(OperationError::CheckOutput {
                host: self.host.clone(),
                reason: "no output captured".to_string(),
            })
        })?;
        if output.stdout.is_empty() && !output.stderr.is_empty() {
            return Err(TaskError::Operation(OperationError::CheckOutput {
                host: self.host.clone(),
                reason: String::from_utf8_lossy(&output.stderr).into_owned(),
            }));
        }

        let results = match self.kind {
            CheckKind::Insight => check_system_info(&self.options, &output.stdout),
            CheckKind::Limits => check_sys_limits(&self.options, &self.user, &output.stdout),
            CheckKind::Sysctl => check_kernel_params(&self.options, &output.stdout),
            CheckKind::Service => check_services(&output.stdout),
        };
        ctx.add_check_results(&self.host, results);
        Ok(())
    }

    fn stringify(&self) -> String {
        format!("CheckSys: host={}, type={}", self.host, self.kind.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HostOutput;

    #[test]
    fn test_parses_limits_from_context_output() {
        let ctx = Context::new();
        ctx.set_outputs(
            "10.0.0.1",
            HostOutput {
                stdout: b"tidb soft nofile 1000000\ntidb hard nofile 1000000\ntidb soft stack 10240\n"
                    .to_vec(),
                stderr: vec![],
                ok: true,
            },
        );

        CheckSys::new("10.0.0.1", "tidb", CheckKind::Limits, CheckOptions::default())
            .execute(&ctx)
            .unwrap();

        let results = ctx.get_check_results("10.0.0.1");
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.passed()));
    }

    #[test]
    fn test_stderr_only_output_is_an_error() {
        let ctx = Context::new();
        ctx.set_outputs(
            "10.0.0.1",
            HostOutput {
                stdout: vec![],
                stderr: b"permission denied".to_vec(),
                ok: false,
            },
        );

        let err = CheckSys::new("10.0.0.1", "tidb", CheckKind::Sysctl, CheckOptions::default())
            .execute(&ctx)
            .unwrap_err();
        assert!(err.to_string().contains("permission denied"), "{err}");
    }
}
