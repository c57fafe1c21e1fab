//! In-process executor running commands on the control machine.
//!
//! Used for operations that act on the local host (package inspection,
//! key generation) and as a real transport in tests.

use std::process::{Command, Stdio};

use crate::error::{ExecutorError, Result};
use crate::{Executor, Output};

/// [`Executor`] that runs commands through a local shell.
#[derive(Debug, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    /// Creates a local executor.
    pub fn new() -> Self {
        Self
    }
}

impl Executor for LocalExecutor {
    fn exec(&self, cmd: &str, stdin: Option<&[u8]>, sudo: bool) -> Result<Output> {
        let wrapped = if sudo {
            format!("sudo -H bash -c \"{}\"", cmd)
        } else {
            cmd.to_string()
        };

        let mut command = Command::new("bash");
        command
            .arg("-c")
            .arg(&wrapped)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn()?;
        if let Some(data) = stdin {
            use std::io::Write;
            if let Some(mut pipe) = child.stdin.take() {
                let _ = pipe.write_all(data);
            }
        }

        let out = child.wait_with_output()?;
        if !out.status.success() {
            if out.stderr.is_empty() {
                return Err(ExecutorError::CommandExit {
                    host: "localhost".to_string(),
                    port: 0,
                    cmd: wrapped,
                });
            }
            return Err(ExecutorError::CommandFailed {
                host: "localhost".to_string(),
                port: 0,
                cmd: wrapped,
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
        Ok((out.stdout, out.stderr))
    }

    fn transfer(&self, src: &str, dst: &str, _download: bool) -> Result<()> {
        if let Some(parent) = std::path::Path::new(dst).parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(src, dst).map_err(|e| {
            ExecutorError::transfer("localhost", src, dst, e.to_string())
        })?;
        Ok(())
    }

    fn host(&self) -> &str {
        "localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_captures_stdout() {
        let exec = LocalExecutor::new();
        let (stdout, _) = exec.exec("echo hello", None, false).unwrap();
        assert_eq!(String::from_utf8_lossy(&stdout).trim(), "hello");
    }

    #[test]
    fn test_exec_reads_stdin() {
        let exec = LocalExecutor::new();
        let (stdout, _) = exec.exec("cat", Some(b"piped"), false).unwrap();
        assert_eq!(String::from_utf8_lossy(&stdout), "piped");
    }

    #[test]
    fn test_exec_failure_carries_stderr() {
        let exec = LocalExecutor::new();
        let err = exec.exec("ls /definitely-not-a-dir", None, false).unwrap_err();
        match err {
            ExecutorError::CommandFailed { stderr, .. } => {
                assert!(!stderr.is_empty());
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn test_transfer_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("nested/dst.txt");
        std::fs::write(&src, b"payload").unwrap();

        let exec = LocalExecutor::new();
        exec.transfer(src.to_str().unwrap(), dst.to_str().unwrap(), false)
            .unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"payload");
    }
}
