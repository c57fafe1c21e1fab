//! Fluent assembly of task graphs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tiops_executor::module::PortState;
use tiops_operation::{CheckOptions, Operation, Options};
use tiops_profile::{ClusterMeta, Profile};
use tiops_topology::spec::MonitoredOptions;
use tiops_topology::{DirPaths, Instance, Topology};

use crate::mirror::Mirror;
use crate::task::{Parallel, ParallelStepDisplay, Serial, StepDisplay, Task};
use crate::tasks::{
    BackupComponent, CheckKind, CheckSys, Chown, ClusterOperate, ClusterSsh, CopyComponent,
    CopyFile, Download, EnvInit, InitConfig, InstallPackage, Mkdir, MonitoredConfig, RootSsh,
    Rmdir, Shell, SshKeyGen, SshKeySet, UpdateMeta, UserSsh, WaitForPort,
};

/// Accumulates tasks; `build` returns them as one [`Serial`].
#[derive(Default)]
pub struct TaskBuilder {
    tasks: Vec<Box<dyn Task>>,
}

impl TaskBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an already-constructed task.
    pub fn push(mut self, task: Box<dyn Task>) -> Self {
        self.tasks.push(task);
        self
    }

    /// Appends a parallel group; all of it completes before the next
    /// appended task starts.
    pub fn parallel(mut self, children: Vec<Box<dyn Task>>) -> Self {
        self.tasks.push(Box::new(Parallel::new(children)));
        self
    }

    /// Appends a parallel group displayed under one label.
    pub fn parallel_step(mut self, label: impl Into<String>, children: Vec<Box<dyn Task>>) -> Self {
        self.tasks
            .push(Box::new(ParallelStepDisplay::new(label, children)));
        self
    }

    /// Wraps the most recently appended task with a display label.
    pub fn step(mut self, label: impl Into<String>) -> Self {
        if let Some(last) = self.tasks.pop() {
            self.tasks.push(Box::new(StepDisplay::new(last, label)));
        }
        self
    }

    /// Generates (if needed) and activates the cluster SSH keypair.
    pub fn ssh_keygen(self, key_path: impl Into<PathBuf>) -> Self {
        self.push(Box::new(SshKeyGen::new(key_path)))
    }

    /// Activates an existing SSH identity.
    pub fn ssh_keyset(self, private: impl Into<PathBuf>, public: impl Into<PathBuf>) -> Self {
        self.push(Box::new(SshKeySet::new(private, public)))
    }

    /// Binds a root executor using operator credentials.
    #[allow(clippy::too_many_arguments)]
    pub fn root_ssh(
        self,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: Option<String>,
        key_file: Option<String>,
        passphrase: Option<String>,
        timeout: Option<Duration>,
    ) -> Self {
        self.push(Box::new(RootSsh::new(
            host, port, user, password, key_file, passphrase, timeout,
        )))
    }

    /// Binds a deploy-user executor using the active identity.
    pub fn user_ssh(
        self,
        host: impl Into<String>,
        ssh_port: u16,
        user: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        self.push(Box::new(UserSsh::new(host, ssh_port, user, timeout)))
    }

    /// Binds deploy-user executors for every unique host of `topo`.
    pub fn cluster_ssh(
        self,
        topo: &Topology,
        user: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        let mut hosts = Vec::new();
        topo.iter_hosts(|inst| hosts.push((inst.host().to_string(), inst.ssh_port())));
        self.push(Box::new(ClusterSsh::new(hosts, user, timeout)))
    }

    /// Prepares the deploy user on a host.
    pub fn env_init(self, host: impl Into<String>, deploy_user: impl Into<String>) -> Self {
        self.push(Box::new(EnvInit::new(host, deploy_user)))
    }

    /// Creates directories on a host.
    pub fn mkdir(
        self,
        user: impl Into<String>,
        host: impl Into<String>,
        dirs: Vec<String>,
    ) -> Self {
        self.push(Box::new(Mkdir::new(user, host, dirs)))
    }

    /// Removes directories on a host.
    pub fn rmdir(self, host: impl Into<String>, dirs: Vec<String>) -> Self {
        self.push(Box::new(Rmdir::new(host, dirs)))
    }

    /// Transfers ownership of a path to the deploy user.
    pub fn chown(
        self,
        user: impl Into<String>,
        host: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        self.push(Box::new(Chown::new(user, host, path)))
    }

    /// Runs a command, keeping its output in the context.
    pub fn shell(self, host: impl Into<String>, command: impl Into<String>, sudo: bool) -> Self {
        self.push(Box::new(Shell::new(host, command, sudo)))
    }

    /// Ensures a package is cached locally and verified.
    pub fn download(
        self,
        component: impl Into<String>,
        version: impl Into<String>,
        os: impl Into<String>,
        arch: impl Into<String>,
        profile: Profile,
        mirror: Arc<dyn Mirror>,
    ) -> Self {
        self.push(Box::new(Download::new(
            component, version, os, arch, profile, mirror,
        )))
    }

    /// Ships a cached component package to a host.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_component(
        self,
        component: impl Into<String>,
        version: impl Into<String>,
        os: impl Into<String>,
        arch: impl Into<String>,
        host: impl Into<String>,
        deploy_dir: impl Into<String>,
        cluster: impl Into<String>,
        profile: Profile,
    ) -> Self {
        self.push(Box::new(CopyComponent::new(
            component, version, os, arch, host, deploy_dir, cluster, profile,
        )))
    }

    /// Uploads one local file.
    pub fn copy_file(
        self,
        src: impl Into<PathBuf>,
        host: impl Into<String>,
        dst: impl Into<String>,
    ) -> Self {
        self.push(Box::new(CopyFile::new(src, host, dst)))
    }

    /// Snapshots a host's binaries.
    pub fn backup_component(
        self,
        component: impl Into<String>,
        version: impl Into<String>,
        host: impl Into<String>,
        deploy_dir: impl Into<String>,
    ) -> Self {
        self.push(Box::new(BackupComponent::new(
            component, version, host, deploy_dir,
        )))
    }

    /// Uploads a local package and extracts it in place.
    pub fn install_package(
        self,
        package: impl Into<PathBuf>,
        host: impl Into<String>,
        deploy_dir: impl Into<String>,
    ) -> Self {
        self.push(Box::new(InstallPackage::new(package, host, deploy_dir)))
    }

    /// Renders and uploads one instance's configuration set.
    pub fn init_config(
        self,
        cluster: impl Into<String>,
        user: impl Into<String>,
        instance: Box<dyn Instance>,
        topo: Arc<Topology>,
        paths: DirPaths,
    ) -> Self {
        self.push(Box::new(InitConfig::new(cluster, user, instance, topo, paths)))
    }

    /// Like `init_config` but with the scale-out config variant.
    pub fn scale_config(
        self,
        cluster: impl Into<String>,
        user: impl Into<String>,
        instance: Box<dyn Instance>,
        topo: Arc<Topology>,
        paths: DirPaths,
    ) -> Self {
        self.push(Box::new(
            InitConfig::new(cluster, user, instance, topo, paths).for_scale(),
        ))
    }

    /// Renders and uploads the monitoring agents' configuration.
    pub fn monitored_config(
        self,
        cluster: impl Into<String>,
        component: impl Into<String>,
        host: impl Into<String>,
        options: MonitoredOptions,
        user: impl Into<String>,
        paths: DirPaths,
    ) -> Self {
        self.push(Box::new(MonitoredConfig::new(
            cluster, component, host, options, user, paths,
        )))
    }

    /// Parses a host's captured output into check results.
    pub fn check_sys(
        self,
        host: impl Into<String>,
        user: impl Into<String>,
        kind: CheckKind,
        options: CheckOptions,
    ) -> Self {
        self.push(Box::new(CheckSys::new(host, user, kind, options)))
    }

    /// Invokes an orchestrator procedure.
    pub fn cluster_operate(self, topo: Arc<Topology>, op: Operation, options: Options) -> Self {
        self.push(Box::new(ClusterOperate::new(topo, op, options)))
    }

    /// Persists updated cluster metadata.
    pub fn update_meta(
        self,
        cluster: impl Into<String>,
        meta: ClusterMeta,
        deleted_nodes: Vec<String>,
        profile: Profile,
    ) -> Self {
        self.push(Box::new(UpdateMeta::new(
            cluster,
            meta,
            deleted_nodes,
            profile,
        )))
    }

    /// Waits for a port to reach a state on a host.
    pub fn wait_for_port(self, host: impl Into<String>, port: u16, state: PortState) -> Self {
        self.push(Box::new(WaitForPort::new(host, port, state)))
    }

    /// Finishes the graph as a single serial task.
    pub fn build(self) -> Serial {
        Serial::new(self.tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    /// Phases never interleave: `parallel(A).parallel(B)` finishes all
    /// of A before any of B starts.
    #[test]
    fn test_builder_phases_are_sequential() {
        use crate::task::test_support::Probe;
        use std::sync::{Arc, Mutex};

        let log = Arc::new(Mutex::new(Vec::new()));
        let (a1, _, _) = Probe::new("a1", false, Arc::clone(&log));
        let (a2, _, _) = Probe::new("a2", false, Arc::clone(&log));
        let (b1, _, _) = Probe::new("b1", false, Arc::clone(&log));

        let graph = TaskBuilder::new()
            .parallel(vec![a1, a2])
            .parallel(vec![b1])
            .build();
        graph.execute(&Context::new()).unwrap();

        let log = log.lock().unwrap();
        let b_pos = log.iter().position(|l| l == "execute b1").unwrap();
        assert!(log[..b_pos].contains(&"execute a1".to_string()));
        assert!(log[..b_pos].contains(&"execute a2".to_string()));
    }

    #[test]
    fn test_step_wraps_last_task() {
        let graph = TaskBuilder::new()
            .shell("h", "true", false)
            .step("Run smoke command")
            .build();
        assert!(graph.stringify().contains("Run smoke command"));
    }
}
