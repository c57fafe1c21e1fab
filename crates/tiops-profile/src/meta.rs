//! The persisted per-cluster state record.

use serde::{Deserialize, Serialize};
use tiops_topology::Topology;

/// Version stamp written into new metadata files.
pub const OPS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything tiops knows about a deployed cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMeta {
    /// The user components run as on the target hosts.
    pub user: String,
    /// The deployed cluster version.
    pub version: String,
    /// tiops version that last wrote this file.
    #[serde(default)]
    pub ops_ver: String,
    /// The cluster topology.
    pub topology: Topology,
}

impl ClusterMeta {
    /// Creates a metadata record stamped with the current tool version.
    pub fn new(user: impl Into<String>, version: impl Into<String>, topology: Topology) -> Self {
        Self {
            user: user.into(),
            version: version.into(),
            ops_ver: OPS_VERSION.to_string(),
            topology,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_shape() {
        let topo = Topology::from_str("pd_servers:\n  - host: 10.0.0.1\n").unwrap();
        let meta = ClusterMeta::new("tidb", "v4.0.0", topo);
        let yaml = serde_yaml::to_string(&meta).unwrap();
        assert!(yaml.contains("user: tidb"));
        assert!(yaml.contains("version: v4.0.0"));
        assert!(yaml.contains("ops_ver:"));
        assert!(yaml.contains("topology:"));
    }
}
