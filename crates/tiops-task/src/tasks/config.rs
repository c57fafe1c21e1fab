//! Configuration distribution tasks.

use std::sync::Arc;

use tiops_topology::roles::monitored;
use tiops_topology::spec::MonitoredOptions;
use tiops_topology::{DirPaths, Instance, Topology};
use tracing::debug;

use crate::context::Context;
use crate::error::{Result, TaskError};
use crate::task::Task;

/// Renders and uploads one instance's systemd unit, run script and
/// configuration files.
pub struct InitConfig {
    cluster: String,
    user: String,
    instance: Box<dyn Instance>,
    topo: Arc<Topology>,
    paths: DirPaths,
    scale: bool,
}

impl InitConfig {
    /// Creates the task for an initial deploy or reload.
    pub fn new(
        cluster: impl Into<String>,
        user: impl Into<String>,
        instance: Box<dyn Instance>,
        topo: Arc<Topology>,
        paths: DirPaths,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            user: user.into(),
            instance,
            topo,
            paths,
            scale: false,
        }
    }

    /// Switches to the scale-out variant of the config (PD joins the
    /// running cluster instead of bootstrapping).
    pub fn for_scale(mut self) -> Self {
        self.scale = true;
        self
    }
}

impl Task for InitConfig {
    fn execute(&self, ctx: &Context) -> Result<()> {
        let exec = ctx
            .get_executor(self.instance.host())
            .ok_or_else(|| TaskError::NoExecutor(self.instance.host().to_string()))?;
        std::fs::create_dir_all(&self.paths.cache)?;

        debug!(
            instance = %self.instance.id(),
            scale = self.scale,
            "Distributing configuration"
        );
        if self.scale {
            self.instance.scale_config(
                exec.as_ref(),
                &self.topo,
                &self.cluster,
                &self.user,
                &self.paths,
            )?;
        } else {
            self.instance.init_config(
                exec.as_ref(),
                &self.topo,
                &self.cluster,
                &self.user,
                &self.paths,
            )?;
        }
        Ok(())
    }

    fn stringify(&self) -> String {
        format!(
            "InitConfig: cluster={}, instance={}",
            self.cluster,
            self.instance.id()
        )
    }
}

/// Renders and uploads the monitoring agents' units and scripts on one
/// host.
pub struct MonitoredConfig {
    cluster: String,
    component: String,
    host: String,
    options: MonitoredOptions,
    user: String,
    paths: DirPaths,
}

impl MonitoredConfig {
    /// Creates the task.
    pub fn new(
        cluster: impl Into<String>,
        component: impl Into<String>,
        host: impl Into<String>,
        options: MonitoredOptions,
        user: impl Into<String>,
        paths: DirPaths,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            component: component.into(),
            host: host.into(),
            options,
            user: user.into(),
            paths,
        }
    }
}

impl Task for MonitoredConfig {
    fn execute(&self, ctx: &Context) -> Result<()> {
        let exec = ctx
            .get_executor(&self.host)
            .ok_or_else(|| TaskError::NoExecutor(self.host.clone()))?;
        std::fs::create_dir_all(&self.paths.cache)?;
        monitored::init_config(
            exec.as_ref(),
            &self.component,
            &self.host,
            &self.options,
            &self.user,
            &self.paths,
        )?;
        Ok(())
    }

    fn stringify(&self) -> String {
        format!(
            "MonitoredConfig: cluster={}, component={}, host={}",
            self.cluster, self.component, self.host
        )
    }
}
