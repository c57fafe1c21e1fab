//! Metadata persistence.

use tiops_operation::scale_in::apply_scale_in;
use tiops_profile::{ClusterMeta, Profile};
use tracing::info;

use crate::context::Context;
use crate::error::Result;
use crate::task::Task;

/// Persists updated cluster metadata, applying scale-in markings for
/// the removed nodes first.
pub struct UpdateMeta {
    cluster: String,
    meta: ClusterMeta,
    deleted_nodes: Vec<String>,
    profile: Profile,
}

impl UpdateMeta {
    /// Creates the task. `deleted_nodes` may be empty for plain saves.
    pub fn new(
        cluster: impl Into<String>,
        meta: ClusterMeta,
        deleted_nodes: Vec<String>,
        profile: Profile,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            meta,
            deleted_nodes,
            profile,
        }
    }
}

impl Task for UpdateMeta {
    fn execute(&self, _ctx: &Context) -> Result<()> {
        let mut meta = self.meta.clone();
        if !self.deleted_nodes.is_empty() {
            apply_scale_in(&mut meta.topology, &self.deleted_nodes);
        }
        info!(cluster = %self.cluster, "Updating cluster metadata");
        self.profile.save_meta(&self.cluster, &meta)?;
        Ok(())
    }

    fn stringify(&self) -> String {
        format!("UpdateMeta: cluster={}", self.cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiops_topology::Topology;

    #[test]
    fn test_scale_in_marks_offline_and_keeps_node_in_meta() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::new(dir.path()).unwrap();
        let topo = Topology::from_str(
            "pd_servers:\n  - host: 10.0.0.1\ntikv_servers:\n  - host: 10.0.0.1\n  - host: 10.0.0.2\n  - host: 10.0.0.3\n",
        )
        .unwrap();
        let meta = ClusterMeta::new("tidb", "v4.0.0", topo);

        UpdateMeta::new(
            "foo",
            meta,
            vec!["10.0.0.2:20160".to_string()],
            profile.clone(),
        )
        .execute(&Context::new())
        .unwrap();

        let saved = profile.load_meta("foo").unwrap();
        assert_eq!(saved.topology.tikv_servers.len(), 3);
        let t2 = saved
            .topology
            .tikv_servers
            .iter()
            .find(|s| s.host == "10.0.0.2")
            .unwrap();
        assert!(t2.offline, "scaled-in TiKV must be marked offline, not removed");
    }
}
