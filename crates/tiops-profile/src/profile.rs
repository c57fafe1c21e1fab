//! Profile directory layout and cluster state accessors.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ProfileError, Result};
use crate::meta::ClusterMeta;
use crate::ENV_DATA_DIR;

/// Name of the per-cluster metadata file.
pub const META_FILE: &str = "meta.yaml";

const CLUSTERS_DIR: &str = "clusters";
const PACKAGES_DIR: &str = "packages";
const AUDIT_DIR: &str = "audit";

/// Handle to the on-disk profile.
#[derive(Debug, Clone)]
pub struct Profile {
    root: PathBuf,
}

impl Profile {
    /// Opens the profile at an explicit root, creating it if missing.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Opens the profile rooted by the environment.
    ///
    /// `TIUP_COMPONENT_DATA_DIR` wins when set; otherwise the per-user
    /// default under `$HOME` is used.
    pub fn from_env() -> Result<Self> {
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            if !dir.is_empty() {
                return Self::new(dir);
            }
        }
        let home = std::env::var("HOME")
            .map_err(|_| ProfileError::NoProfileDir("$HOME is not set".to_string()))?;
        Self::new(
            Path::new(&home)
                .join(".tiup")
                .join("storage")
                .join("cluster"),
        )
    }

    /// The profile root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A path under the profile root.
    pub fn path(&self, sub: impl AsRef<Path>) -> PathBuf {
        self.root.join(sub)
    }

    /// The shared package cache directory.
    pub fn packages_dir(&self) -> PathBuf {
        self.root.join(PACKAGES_DIR)
    }

    /// The audit log directory.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join(AUDIT_DIR)
    }

    /// A path under a cluster's state directory.
    pub fn cluster_path(&self, cluster: &str, sub: impl AsRef<Path>) -> PathBuf {
        self.root.join(CLUSTERS_DIR).join(cluster).join(sub)
    }

    /// The cluster's state directory itself.
    pub fn cluster_dir(&self, cluster: &str) -> PathBuf {
        self.root.join(CLUSTERS_DIR).join(cluster)
    }

    /// Path of the cluster's private SSH key.
    pub fn ssh_key_path(&self, cluster: &str) -> PathBuf {
        self.cluster_path(cluster, "ssh/id_rsa")
    }

    /// Path of the cluster's public SSH key.
    pub fn ssh_pubkey_path(&self, cluster: &str) -> PathBuf {
        self.cluster_path(cluster, "ssh/id_rsa.pub")
    }

    /// Path of a cached package tarball.
    pub fn package_path(&self, name: &str, version: &str, os: &str, arch: &str) -> PathBuf {
        self.packages_dir()
            .join(format!("{}-{}-{}-{}.tar.gz", name, version, os, arch))
    }

    /// True when the cluster has metadata on disk.
    pub fn cluster_exists(&self, cluster: &str) -> bool {
        self.cluster_path(cluster, META_FILE).exists()
    }

    /// Names of every cluster with metadata, sorted.
    pub fn list_clusters(&self) -> Result<Vec<String>> {
        let dir = self.root.join(CLUSTERS_DIR);
        let mut names = Vec::new();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.cluster_exists(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Loads a cluster's metadata.
    pub fn load_meta(&self, cluster: &str) -> Result<ClusterMeta> {
        let path = self.cluster_path(cluster, META_FILE);
        if !path.exists() {
            return Err(ProfileError::ClusterNotFound(cluster.to_string()));
        }
        let doc = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&doc)?)
    }

    /// Persists a cluster's metadata, creating its directory tree.
    pub fn save_meta(&self, cluster: &str, meta: &ClusterMeta) -> Result<()> {
        let dir = self.cluster_dir(cluster);
        std::fs::create_dir_all(&dir)?;
        let doc = serde_yaml::to_string(meta)?;
        let path = dir.join(META_FILE);
        debug!(cluster = %cluster, path = %path.display(), "Saving cluster meta");
        std::fs::write(path, doc)?;
        Ok(())
    }

    /// Removes a cluster's entire state directory.
    pub fn remove_cluster(&self, cluster: &str) -> Result<()> {
        let dir = self.cluster_dir(cluster);
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiops_topology::Topology;

    fn test_profile() -> (tempfile::TempDir, Profile) {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::new(dir.path().join("profile")).unwrap();
        (dir, profile)
    }

    fn small_meta() -> ClusterMeta {
        let topo = Topology::from_str("pd_servers:\n  - host: 10.0.0.1\n").unwrap();
        ClusterMeta::new("tidb", "v4.0.0", topo)
    }

    #[test]
    fn test_save_and_load_meta_round_trip() {
        let (_dir, profile) = test_profile();
        let meta = small_meta();
        profile.save_meta("foo", &meta).unwrap();

        assert!(profile.cluster_exists("foo"));
        let loaded = profile.load_meta("foo").unwrap();
        assert_eq!(loaded.user, "tidb");
        assert_eq!(loaded.version, "v4.0.0");
        assert_eq!(loaded.topology, meta.topology);
    }

    #[test]
    fn test_meta_lands_in_clusters_subdir() {
        let (_dir, profile) = test_profile();
        profile.save_meta("foo", &small_meta()).unwrap();
        assert!(profile.path("clusters/foo/meta.yaml").exists());
    }

    #[test]
    fn test_list_clusters_only_counts_meta() {
        let (_dir, profile) = test_profile();
        profile.save_meta("a", &small_meta()).unwrap();
        std::fs::create_dir_all(profile.cluster_dir("stray")).unwrap();
        assert_eq!(profile.list_clusters().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_load_missing_cluster_fails() {
        let (_dir, profile) = test_profile();
        assert!(matches!(
            profile.load_meta("nope"),
            Err(ProfileError::ClusterNotFound(_))
        ));
    }

    #[test]
    fn test_package_path_scheme() {
        let (_dir, profile) = test_profile();
        let p = profile.package_path("tikv", "v4.0.0", "linux", "amd64");
        assert!(p.ends_with("packages/tikv-v4.0.0-linux-amd64.tar.gz"));
    }
}
