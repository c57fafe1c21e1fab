//! SSH identity and connection tasks.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tiops_executor::{SshConfig, SshExecutor};
use tracing::{debug, info};

use crate::context::Context;
use crate::error::{Result, TaskError};
use crate::task::{Parallel, Task};

/// Generates the cluster's RSA keypair if absent and activates it.
pub struct SshKeyGen {
    key_path: PathBuf,
}

impl SshKeyGen {
    /// Creates the task for the private key at `key_path`.
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: key_path.into(),
        }
    }

    fn pub_path(&self) -> PathBuf {
        let mut p = self.key_path.as_os_str().to_owned();
        p.push(".pub");
        PathBuf::from(p)
    }
}

impl Task for SshKeyGen {
    fn execute(&self, ctx: &Context) -> Result<()> {
        if !self.key_path.exists() {
            if let Some(parent) = self.key_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            info!(path = %self.key_path.display(), "Generating SSH keypair");
            let status = Command::new("ssh-keygen")
                .arg("-t")
                .arg("rsa")
                .arg("-b")
                .arg("2048")
                .arg("-N")
                .arg("")
                .arg("-q")
                .arg("-f")
                .arg(&self.key_path)
                .status()?;
            if !status.success() {
                return Err(TaskError::Io(std::io::Error::other(format!(
                    "ssh-keygen exited with {}",
                    status
                ))));
            }
        }

        ctx.set_ssh_keys(
            self.key_path.to_string_lossy(),
            self.pub_path().to_string_lossy(),
        );
        Ok(())
    }

    fn stringify(&self) -> String {
        format!("SSHKeyGen: path={}", self.key_path.display())
    }
}

/// Activates an existing SSH identity in the context.
pub struct SshKeySet {
    private: PathBuf,
    public: PathBuf,
}

impl SshKeySet {
    /// Creates the task for the given key pair.
    pub fn new(private: impl Into<PathBuf>, public: impl Into<PathBuf>) -> Self {
        Self {
            private: private.into(),
            public: public.into(),
        }
    }
}

impl Task for SshKeySet {
    fn execute(&self, ctx: &Context) -> Result<()> {
        ctx.set_ssh_keys(
            self.private.to_string_lossy(),
            self.public.to_string_lossy(),
        );
        Ok(())
    }

    fn stringify(&self) -> String {
        format!("SSHKeySet: private={}", self.private.display())
    }
}

/// Binds a root executor to a host, using operator credentials.
pub struct RootSsh {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    key_file: Option<String>,
    passphrase: Option<String>,
    timeout: Option<Duration>,
}

impl RootSsh {
    /// Creates the task.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: Option<String>,
        key_file: Option<String>,
        passphrase: Option<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password,
            key_file,
            passphrase,
            timeout,
        }
    }
}

impl Task for RootSsh {
    fn execute(&self, ctx: &Context) -> Result<()> {
        debug!(host = %self.host, user = %self.user, "Binding root executor");
        let exec = SshExecutor::new(SshConfig {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            key_file: self.key_file.clone(),
            passphrase: self.passphrase.clone(),
            timeout: self.timeout,
        });
        ctx.set_executor(&self.host, Arc::new(exec));
        Ok(())
    }

    fn stringify(&self) -> String {
        format!("RootSSH: user={}, host={}", self.user, self.host)
    }
}

/// Replaces a host's executor with one authenticating as the deploy
/// user via the context's active identity.
pub struct UserSsh {
    host: String,
    ssh_port: u16,
    user: String,
    timeout: Option<Duration>,
}

impl UserSsh {
    /// Creates the task.
    pub fn new(
        host: impl Into<String>,
        ssh_port: u16,
        user: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            host: host.into(),
            ssh_port,
            user: user.into(),
            timeout,
        }
    }
}

impl Task for UserSsh {
    fn execute(&self, ctx: &Context) -> Result<()> {
        let key = ctx.private_key_path().ok_or(TaskError::NoSshKey)?;
        debug!(host = %self.host, user = %self.user, "Binding user executor");
        let exec = SshExecutor::new(SshConfig {
            host: self.host.clone(),
            port: self.ssh_port,
            user: self.user.clone(),
            password: None,
            key_file: Some(key),
            passphrase: None,
            timeout: self.timeout,
        });
        ctx.set_executor(&self.host, Arc::new(exec));
        Ok(())
    }

    fn stringify(&self) -> String {
        format!("UserSSH: user={}, host={}", self.user, self.host)
    }
}

/// Binds a deploy-user executor to every unique host, in parallel.
pub struct ClusterSsh {
    hosts: Vec<(String, u16)>,
    user: String,
    timeout: Option<Duration>,
}

impl ClusterSsh {
    /// Creates the task over `(host, ssh_port)` pairs.
    pub fn new(hosts: Vec<(String, u16)>, user: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            hosts,
            user: user.into(),
            timeout,
        }
    }
}

impl Task for ClusterSsh {
    fn execute(&self, ctx: &Context) -> Result<()> {
        let children: Vec<Box<dyn Task>> = self
            .hosts
            .iter()
            .map(|(host, port)| {
                Box::new(UserSsh::new(host.clone(), *port, self.user.clone(), self.timeout))
                    as Box<dyn Task>
            })
            .collect();
        Parallel::new(children).execute(ctx)
    }

    fn stringify(&self) -> String {
        format!("ClusterSSH: user={}, hosts={}", self.user, self.hosts.len())
    }
}

/// Prepares a host for the deploy user: create the account and
/// authorize the cluster's public key.
pub struct EnvInit {
    host: String,
    deploy_user: String,
}

impl EnvInit {
    /// Creates the task.
    pub fn new(host: impl Into<String>, deploy_user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            deploy_user: deploy_user.into(),
        }
    }
}

impl Task for EnvInit {
    fn execute(&self, ctx: &Context) -> Result<()> {
        let exec = ctx
            .get_executor(&self.host)
            .ok_or_else(|| TaskError::NoExecutor(self.host.clone()))?;
        let pub_key_path = ctx.public_key_path().ok_or(TaskError::NoSshKey)?;
        let pub_key = std::fs::read_to_string(&pub_key_path)?;
        let pub_key = pub_key.trim();

        info!(host = %self.host, user = %self.deploy_user, "Initializing environment");
        exec.exec(
            &format!(
                "id -u {user} > /dev/null 2>&1 || useradd -m -s /bin/bash {user}",
                user = self.deploy_user
            ),
            None,
            true,
        )?;
        exec.exec(
            &format!(
                "su - {} -c 'test -d ~/.ssh || (mkdir -p ~/.ssh && chmod 700 ~/.ssh)'",
                self.deploy_user
            ),
            None,
            true,
        )?;
        exec.exec(
            &format!(
                "su - {user} -c 'grep -qF \"{key}\" ~/.ssh/authorized_keys 2>/dev/null || \
                 echo \"{key}\" >> ~/.ssh/authorized_keys && chmod 600 ~/.ssh/authorized_keys'",
                user = self.deploy_user,
                key = pub_key
            ),
            None,
            true,
        )?;
        Ok(())
    }

    fn stringify(&self) -> String {
        format!("EnvInit: host={}, user={}", self.host, self.deploy_user)
    }
}
