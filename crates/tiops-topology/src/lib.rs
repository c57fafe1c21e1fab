//! The canonical in-memory representation of a cluster.
//!
//! A topology file describes the desired cluster: global defaults, the
//! monitored-agent configuration, and one ordered group of instance
//! specifications per component role. This crate owns:
//!
//! - parsing and defaulting (`spec`), in the deterministic order the
//!   rest of the system relies on;
//! - the load-time invariant checker (`validate`) for host/port and
//!   host/directory uniqueness;
//! - the role modules (`roles`) exposing every instance through the
//!   [`Instance`] capability trait, in fixed start order;
//! - the configuration compositor (`config`): dotted-key flattening,
//!   global/instance merge, TOML rendering and binary self-check;
//! - the on-host artifacts (`template`): systemd units and run scripts.

pub mod config;
pub mod error;
pub mod instance;
pub mod roles;
pub mod spec;
pub mod template;
pub mod validate;

pub use error::{Result, TopologyError};
pub use instance::{Component, ComponentKind, DirPaths, Instance};
pub use spec::{
    GlobalOptions, MonitoredOptions, ServerConfigs, Topology, FULL_COMPONENT_ORDER,
};

/// Anchors a possibly relative path to the deploy user's home directory.
///
/// Topology files may use relative deploy/data/log dirs; they are
/// resolved against `/home/<user>/` at the point of use and never
/// rewritten inside the topology itself.
pub fn abs(user: &str, path: &str) -> String {
    let path = path.trim();
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/home/{}/{}", user, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abs_anchors_relative() {
        assert_eq!(abs("tidb", "deploy/pd-2379"), "/home/tidb/deploy/pd-2379");
    }

    #[test]
    fn test_abs_keeps_absolute() {
        assert_eq!(abs("tidb", "/data/pd"), "/data/pd");
    }
}
