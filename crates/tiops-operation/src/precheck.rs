//! Pre-checks that reject an operation before any remote side effect.
//!
//! Deploying or scaling out must not collide with any other cluster
//! managed from this profile: no (host, port) pair and no (host,
//! directory) pair may coincide with an existing cluster's claims.
//! Directories compare after anchoring relative paths to the owning
//! cluster's deploy user home.

use tiops_profile::Profile;
use tiops_topology::{abs, Topology};
use tracing::debug;

use crate::error::{PreCheckError, Result};

/// How directories are compared across clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirConflictMode {
    /// Conflict when one directory equals the other.
    Exact,
    /// Conflict when either directory is a prefix of the other. Used
    /// by initial deploys, where nesting a new cluster under an
    /// existing one is as fatal as sharing the directory.
    PrefixContainment,
}

#[derive(Debug)]
struct Claimed {
    cluster: String,
    component: String,
    host: String,
    ports: Vec<u16>,
    dirs: Vec<String>,
}

fn collect(cluster: &str, user: &str, topo: &Topology) -> Vec<Claimed> {
    let mut entries = Vec::new();
    topo.iter_instances(|inst| {
        entries.push(Claimed {
            cluster: cluster.to_string(),
            component: inst.component_name().to_string(),
            host: inst.host().to_string(),
            ports: inst.used_ports(),
            dirs: inst
                .used_dirs()
                .iter()
                .map(|d| abs(user, d))
                .collect(),
        });
    });
    entries
}

fn dirs_conflict(a: &str, b: &str, mode: DirConflictMode) -> bool {
    match mode {
        DirConflictMode::Exact => a == b,
        DirConflictMode::PrefixContainment => {
            a == b
                || a.starts_with(&format!("{}/", b.trim_end_matches('/')))
                || b.starts_with(&format!("{}/", a.trim_end_matches('/')))
        }
    }
}

/// Rejects the cluster name when metadata already exists for it.
pub fn check_name_available(profile: &Profile, name: &str) -> Result<()> {
    if profile.cluster_exists(name) {
        return Err(PreCheckError::NameDuplicate {
            name: name.to_string(),
            suggestion: format!(
                "Cluster name '{}' is duplicated, please specify another cluster name",
                name
            ),
        }
        .into());
    }
    Ok(())
}

/// Checks the candidate topology against every other cluster on disk.
///
/// `cluster` is the cluster being deployed or scaled; its own existing
/// meta (if any) is skipped so scale-out does not conflict with itself.
pub fn check_cluster_conflicts(
    profile: &Profile,
    cluster: &str,
    user: &str,
    topo: &Topology,
    dir_mode: DirConflictMode,
) -> Result<()> {
    let current = collect(cluster, user, topo);

    for other in profile.list_clusters()? {
        if other == cluster {
            continue;
        }
        let meta = profile.load_meta(&other)?;
        let existing = collect(&other, &meta.user, &meta.topology);
        debug!(cluster = %other, entries = existing.len(), "Checking conflicts against cluster");

        for cur in &current {
            for old in &existing {
                if cur.host != old.host {
                    continue;
                }
                for port in &cur.ports {
                    if old.ports.contains(port) {
                        return Err(PreCheckError::PortConflict {
                            port: *port,
                            host: cur.host.clone(),
                            exist_cluster: old.cluster.clone(),
                            suggestion: port_suggestion(cur, old, *port),
                        }
                        .into());
                    }
                }
                for dir in &cur.dirs {
                    for old_dir in &old.dirs {
                        if dirs_conflict(dir, old_dir, dir_mode) {
                            return Err(PreCheckError::DirConflict {
                                dir: dir.clone(),
                                host: cur.host.clone(),
                                exist_cluster: old.cluster.clone(),
                                suggestion: dir_suggestion(cur, old, dir, old_dir),
                            }
                            .into());
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn port_suggestion(cur: &Claimed, old: &Claimed, port: u16) -> String {
    format!(
        "The port you specified in the topology file is:\n  \
         Port:      {port}\n  \
         Component: {} {}\n\n\
         It conflicts to a port in the existing cluster:\n  \
         Existing Cluster Name: {}\n  \
         Existing Port:         {port}\n  \
         Existing Component:    {} {}\n\n\
         Please change to use another port or another host.",
        cur.component, cur.host, old.cluster, old.component, old.host
    )
}

fn dir_suggestion(cur: &Claimed, old: &Claimed, dir: &str, old_dir: &str) -> String {
    format!(
        "The directory you specified in the topology file is:\n  \
         Directory: {dir}\n  \
         Component: {} {}\n\n\
         It conflicts to a directory in the existing cluster:\n  \
         Existing Cluster Name: {}\n  \
         Existing Directory:    {old_dir}\n  \
         Existing Component:    {} {}\n\n\
         Please change to use another directory or another host.",
        cur.component, cur.host, old.cluster, old.component, old.host
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationError;
    use tiops_profile::ClusterMeta;

    fn profile_with_cluster_a() -> (tempfile::TempDir, Profile) {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::new(dir.path().join("profile")).unwrap();
        let topo = Topology::from_str("tikv_servers:\n  - host: 10.0.0.5\n").unwrap();
        profile
            .save_meta("a", &ClusterMeta::new("tidb", "v4.0.0", topo))
            .unwrap();
        (dir, profile)
    }

    /// A new cluster claiming 10.0.0.5:20160 must be rejected with a
    /// suggestion naming the existing cluster, port and host.
    #[test]
    fn test_cross_cluster_port_conflict() {
        let (_dir, profile) = profile_with_cluster_a();
        let topo_b = Topology::from_str(
            "tikv_servers:\n  - host: 10.0.0.5\n    deploy_dir: /other/deploy\n    data_dir: /other/data\n",
        )
        .unwrap();

        let err = check_cluster_conflicts(
            &profile,
            "b",
            "tidb",
            &topo_b,
            DirConflictMode::Exact,
        )
        .unwrap_err();

        let OperationError::PreCheck(pre) = err else {
            panic!("expected a pre-check error");
        };
        assert!(pre.is_port_conflict());
        let suggestion = pre.suggestion();
        assert!(suggestion.contains("20160"), "{suggestion}");
        assert!(suggestion.contains("10.0.0.5"), "{suggestion}");
        assert!(suggestion.contains("Existing Cluster Name: a"), "{suggestion}");
    }

    #[test]
    fn test_cross_cluster_dir_conflict_exact() {
        let (_dir, profile) = profile_with_cluster_a();
        // Different ports but the same default dirs on the same host.
        let topo_b = Topology::from_str(
            "tikv_servers:\n  - host: 10.0.0.5\n    port: 30160\n    status_port: 30180\n",
        )
        .unwrap();

        let err = check_cluster_conflicts(
            &profile,
            "b",
            "tidb",
            &topo_b,
            DirConflictMode::Exact,
        )
        .unwrap_err();
        assert!(err.is_precheck());
        assert!(err.to_string().contains("directory conflict"), "{err}");
    }

    /// Prefix containment (deploy mode) also rejects nesting under an
    /// existing cluster's directory; exact mode does not.
    #[test]
    fn test_prefix_containment_only_in_deploy_mode() {
        let (_dir, profile) = profile_with_cluster_a();
        let topo_b = Topology::from_str(
            "tikv_servers:\n  - host: 10.0.0.5\n    port: 30160\n    status_port: 30180\n    deploy_dir: /home/tidb/deploy/tikv-20160/nested\n    data_dir: /b/data\n",
        )
        .unwrap();

        assert!(check_cluster_conflicts(
            &profile,
            "b",
            "tidb",
            &topo_b,
            DirConflictMode::Exact
        )
        .is_ok());

        let err = check_cluster_conflicts(
            &profile,
            "b",
            "tidb",
            &topo_b,
            DirConflictMode::PrefixContainment,
        )
        .unwrap_err();
        assert!(err.is_precheck());
    }

    #[test]
    fn test_different_host_never_conflicts() {
        let (_dir, profile) = profile_with_cluster_a();
        let topo_b = Topology::from_str("tikv_servers:\n  - host: 10.0.0.6\n").unwrap();
        assert!(check_cluster_conflicts(
            &profile,
            "b",
            "tidb",
            &topo_b,
            DirConflictMode::PrefixContainment
        )
        .is_ok());
    }

    #[test]
    fn test_own_cluster_is_skipped() {
        let (_dir, profile) = profile_with_cluster_a();
        let topo = profile.load_meta("a").unwrap().topology;
        // Scaling cluster `a` against its own claims must pass.
        assert!(check_cluster_conflicts(
            &profile,
            "a",
            "tidb",
            &topo,
            DirConflictMode::Exact
        )
        .is_ok());
    }

    #[test]
    fn test_name_duplicate_detected() {
        let (_dir, profile) = profile_with_cluster_a();
        assert!(check_name_available(&profile, "a").is_err());
        assert!(check_name_available(&profile, "b").is_ok());
    }
}
