//! Port state waiting as a task.

use std::time::Duration;

use tiops_executor::module::{PortState, WaitFor, WaitForConfig};

use crate::context::Context;
use crate::error::{Result, TaskError};
use crate::task::Task;

/// Blocks until a port on a host is started or stopped.
pub struct WaitForPort {
    host: String,
    port: u16,
    state: PortState,
    sleep: Option<Duration>,
    timeout: Option<Duration>,
}

impl WaitForPort {
    /// Creates the task with the default 1s poll and 60s deadline.
    pub fn new(host: impl Into<String>, port: u16, state: PortState) -> Self {
        Self {
            host: host.into(),
            port,
            state,
            sleep: None,
            timeout: None,
        }
    }

    /// Overrides the poll interval.
    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = Some(sleep);
        self
    }

    /// Overrides the deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Task for WaitForPort {
    fn execute(&self, ctx: &Context) -> Result<()> {
        let exec = ctx
            .get_executor(&self.host)
            .ok_or_else(|| TaskError::NoExecutor(self.host.clone()))?;
        WaitFor::new(WaitForConfig {
            port: self.port,
            state: self.state,
            sleep: self.sleep,
            timeout: self.timeout,
        })
        .execute(exec.as_ref())?;
        Ok(())
    }

    fn stringify(&self) -> String {
        format!("WaitFor: host={}, port={}", self.host, self.port)
    }
}
