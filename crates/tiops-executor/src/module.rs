//! Host modules: small reusable operations built on an [`Executor`].

use std::time::Duration;

use tracing::debug;

use crate::error::{ExecutorError, Result};
use crate::retry::{retry, RetryOption};
use crate::{Executor, Output};

/// Actions supported by [`SystemdModule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemdAction {
    /// `systemctl start`.
    Start,
    /// `systemctl stop`.
    Stop,
    /// `systemctl restart`.
    Restart,
    /// `systemctl disable`.
    Disable,
}

impl SystemdAction {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Disable => "disable",
        }
    }
}

/// Configuration for [`SystemdModule`].
#[derive(Debug, Clone)]
pub struct SystemdConfig {
    /// Name of the unit to act on, e.g. `tikv-20160.service`.
    pub unit: String,
    /// The action to perform.
    pub action: SystemdAction,
    /// Also `systemctl enable` the unit after the action.
    pub enabled: bool,
    /// Run `systemctl daemon-reload` before the action.
    pub reload_daemon: bool,
}

impl SystemdConfig {
    /// Creates a config for a single action on a unit.
    pub fn new(unit: impl Into<String>, action: SystemdAction) -> Self {
        Self {
            unit: unit.into(),
            action,
            enabled: false,
            reload_daemon: false,
        }
    }

    /// Also enables the unit after the action.
    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// Reloads the systemd daemon before the action.
    pub fn reload_daemon(mut self) -> Self {
        self.reload_daemon = true;
        self
    }
}

/// Drives systemd units on a remote host.
pub struct SystemdModule {
    cmd: String,
}

impl SystemdModule {
    /// Builds the module, assembling the systemctl command line.
    pub fn new(config: SystemdConfig) -> Self {
        let systemctl = "/usr/bin/systemctl";
        let mut cmd = format!("{} {} {}", systemctl, config.action.as_str(), config.unit);
        if config.enabled {
            cmd = format!("{} && {} enable {}", cmd, systemctl, config.unit);
        }
        if config.reload_daemon {
            cmd = format!("{} daemon-reload && {}", systemctl, cmd);
        }
        Self { cmd }
    }

    /// Runs the assembled command under sudo.
    pub fn execute(&self, exec: &dyn Executor) -> Result<Output> {
        exec.exec(&self.cmd, None, true)
    }

    /// The assembled command line, for logging.
    pub fn command(&self) -> &str {
        &self.cmd
    }
}

/// Port states [`WaitFor`] can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// The port is being listened on.
    Started,
    /// The port has been released.
    Stopped,
}

impl PortState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Stopped => "stopped",
        }
    }
}

/// Configuration for [`WaitFor`].
#[derive(Debug, Clone)]
pub struct WaitForConfig {
    /// Port number to poll.
    pub port: u16,
    /// Desired state of the port.
    pub state: PortState,
    /// Sleep between polls, 1s when `None`.
    pub sleep: Option<Duration>,
    /// Overall deadline, 60s when `None`.
    pub timeout: Option<Duration>,
}

/// Polls `ss -ltn` on a host until a port reaches the desired state.
pub struct WaitFor {
    config: WaitForConfig,
}

impl WaitFor {
    /// Creates the module from its config.
    pub fn new(config: WaitForConfig) -> Self {
        Self { config }
    }

    /// Blocks until the condition holds or the deadline passes.
    pub fn execute(&self, exec: &dyn Executor) -> Result<()> {
        let sleep = self.config.sleep.unwrap_or(Duration::from_secs(1));
        let timeout = self.config.timeout.unwrap_or(Duration::from_secs(60));
        // Listening sockets print as e.g. `LISTEN 0 128 *:2379 *:*`, so a
        // trailing space bounds the port number.
        let pattern = format!(":{} ", self.config.port);

        debug!(
            host = %exec.host(),
            port = self.config.port,
            state = self.config.state.as_str(),
            "Waiting for port"
        );

        let satisfied = retry(
            || match exec.exec("ss -ltn", None, false) {
                Ok((stdout, _)) => {
                    let listening =
                        String::from_utf8_lossy(&stdout).contains(&pattern);
                    match self.config.state {
                        PortState::Started => listening,
                        PortState::Stopped => !listening,
                    }
                }
                Err(_) => false,
            },
            RetryOption {
                attempts: usize::MAX,
                delay: sleep,
                timeout,
            },
        );

        if satisfied {
            Ok(())
        } else {
            Err(ExecutorError::PortWait {
                port: self.config.port,
                state: self.config.state.as_str().to_string(),
            })
        }
    }
}

/// Waits until `port` is being listened on.
pub fn port_started(exec: &dyn Executor, port: u16) -> Result<()> {
    WaitFor::new(WaitForConfig {
        port,
        state: PortState::Started,
        sleep: None,
        timeout: None,
    })
    .execute(exec)
}

/// Waits until `port` has been released.
pub fn port_stopped(exec: &dyn Executor, port: u16) -> Result<()> {
    WaitFor::new(WaitForConfig {
        port,
        state: PortState::Stopped,
        sleep: None,
        timeout: None,
    })
    .execute(exec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalExecutor;

    #[test]
    fn test_systemd_command_assembly() {
        let m = SystemdModule::new(SystemdConfig::new("tikv-20160.service", SystemdAction::Start));
        assert_eq!(m.command(), "/usr/bin/systemctl start tikv-20160.service");

        let m = SystemdModule::new(
            SystemdConfig::new("pd-2379.service", SystemdAction::Restart)
                .enabled()
                .reload_daemon(),
        );
        assert_eq!(
            m.command(),
            "/usr/bin/systemctl daemon-reload && /usr/bin/systemctl restart pd-2379.service \
             && /usr/bin/systemctl enable pd-2379.service"
        );
    }

    /// A port nobody listens on reaches `stopped` on the first poll.
    #[test]
    fn test_wait_for_stopped_port() {
        let exec = LocalExecutor::new();
        let w = WaitFor::new(WaitForConfig {
            port: 1,
            state: PortState::Stopped,
            sleep: Some(Duration::from_millis(10)),
            timeout: Some(Duration::from_secs(2)),
        });
        // Skip silently if `ss` is unavailable in the environment.
        if exec.exec("ss -ltn", None, false).is_ok() {
            w.execute(&exec).unwrap();
        }
    }

    #[test]
    fn test_wait_for_timeout_names_port_and_state() {
        let exec = LocalExecutor::new();
        if exec.exec("ss -ltn", None, false).is_err() {
            return;
        }
        let w = WaitFor::new(WaitForConfig {
            port: 1,
            state: PortState::Started,
            sleep: Some(Duration::from_millis(10)),
            timeout: Some(Duration::from_millis(50)),
        });
        let err = w.execute(&exec).unwrap_err();
        assert_eq!(
            err.to_string(),
            "timed out waiting for port 1 to be started"
        );
    }
}
