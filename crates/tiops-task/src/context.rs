//! The shared execution context.
//!
//! One [`Context`] lives for one invocation. It caches executors per
//! host, keeps the latest remote outputs and check results per host,
//! and holds the active SSH identity. Host-keyed maps use a
//! reader-writer discipline: readers never block each other, writers
//! are exclusive.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tiops_executor::Executor;
use tiops_operation::{CheckResult, ExecutorGetter};

use crate::event::EventBus;

/// Captured output of the most recent remote command on a host.
#[derive(Debug, Clone, Default)]
pub struct HostOutput {
    /// Captured stdout.
    pub stdout: Vec<u8>,
    /// Captured stderr.
    pub stderr: Vec<u8>,
    /// Whether the command succeeded.
    pub ok: bool,
}

/// Process-wide state shared by every task of one invocation.
#[derive(Default)]
pub struct Context {
    executors: RwLock<HashMap<String, Arc<dyn Executor>>>,
    outputs: RwLock<HashMap<String, HostOutput>>,
    check_results: RwLock<HashMap<String, Vec<CheckResult>>>,
    ssh_keys: RwLock<Option<(String, String)>>,
    bus: EventBus,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// The executor bound to `host`, if one was established.
    pub fn get_executor(&self, host: &str) -> Option<Arc<dyn Executor>> {
        let executors = self.executors.read().unwrap_or_else(|e| e.into_inner());
        executors.get(host).cloned()
    }

    /// Binds `exec` to `host`, replacing any previous executor
    /// atomically.
    pub fn set_executor(&self, host: &str, exec: Arc<dyn Executor>) {
        let mut executors = self.executors.write().unwrap_or_else(|e| e.into_inner());
        executors.insert(host.to_string(), exec);
    }

    /// The latest stored output for `host`.
    pub fn get_outputs(&self, host: &str) -> Option<HostOutput> {
        let outputs = self.outputs.read().unwrap_or_else(|e| e.into_inner());
        outputs.get(host).cloned()
    }

    /// Stores the latest output for `host`.
    pub fn set_outputs(&self, host: &str, output: HostOutput) {
        let mut outputs = self.outputs.write().unwrap_or_else(|e| e.into_inner());
        outputs.insert(host.to_string(), output);
    }

    /// The accumulated check results for `host`.
    pub fn get_check_results(&self, host: &str) -> Vec<CheckResult> {
        let results = self.check_results.read().unwrap_or_else(|e| e.into_inner());
        results.get(host).cloned().unwrap_or_default()
    }

    /// Appends check results for `host`.
    pub fn add_check_results(&self, host: &str, mut new: Vec<CheckResult>) {
        let mut results = self.check_results.write().unwrap_or_else(|e| e.into_inner());
        results.entry(host.to_string()).or_default().append(&mut new);
    }

    /// Every host with stored check results, sorted.
    pub fn checked_hosts(&self) -> Vec<String> {
        let results = self.check_results.read().unwrap_or_else(|e| e.into_inner());
        let mut hosts: Vec<String> = results.keys().cloned().collect();
        hosts.sort();
        hosts
    }

    /// Sets the active SSH identity (private and public key paths).
    pub fn set_ssh_keys(&self, private: impl Into<String>, public: impl Into<String>) {
        let mut keys = self.ssh_keys.write().unwrap_or_else(|e| e.into_inner());
        *keys = Some((private.into(), public.into()));
    }

    /// The active private key path, if an identity was set.
    pub fn private_key_path(&self) -> Option<String> {
        let keys = self.ssh_keys.read().unwrap_or_else(|e| e.into_inner());
        keys.as_ref().map(|(private, _)| private.clone())
    }

    /// The active public key path, if an identity was set.
    pub fn public_key_path(&self) -> Option<String> {
        let keys = self.ssh_keys.read().unwrap_or_else(|e| e.into_inner());
        keys.as_ref().map(|(_, public)| public.clone())
    }

    /// The progress event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }
}

impl ExecutorGetter for Context {
    fn get(&self, host: &str) -> Option<Arc<dyn Executor>> {
        self.get_executor(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiops_executor::LocalExecutor;

    #[test]
    fn test_executor_replacement_is_atomic() {
        let ctx = Context::new();
        assert!(ctx.get_executor("10.0.0.1").is_none());

        ctx.set_executor("10.0.0.1", Arc::new(LocalExecutor::new()));
        assert!(ctx.get_executor("10.0.0.1").is_some());

        // Replacing swaps the executor for that host only.
        ctx.set_executor("10.0.0.1", Arc::new(LocalExecutor::new()));
        let executors = ctx.executors.read().unwrap();
        assert_eq!(executors.len(), 1);
    }

    #[test]
    fn test_outputs_are_per_host() {
        let ctx = Context::new();
        ctx.set_outputs(
            "a",
            HostOutput {
                stdout: b"one".to_vec(),
                stderr: vec![],
                ok: true,
            },
        );
        ctx.set_outputs(
            "b",
            HostOutput {
                stdout: b"two".to_vec(),
                stderr: vec![],
                ok: false,
            },
        );

        assert_eq!(ctx.get_outputs("a").unwrap().stdout, b"one");
        assert!(!ctx.get_outputs("b").unwrap().ok);
        assert!(ctx.get_outputs("c").is_none());
    }

    #[test]
    fn test_ssh_identity_round_trip() {
        let ctx = Context::new();
        assert!(ctx.private_key_path().is_none());
        ctx.set_ssh_keys("/p/id_rsa", "/p/id_rsa.pub");
        assert_eq!(ctx.private_key_path().as_deref(), Some("/p/id_rsa"));
        assert_eq!(ctx.public_key_path().as_deref(), Some("/p/id_rsa.pub"));
    }
}
