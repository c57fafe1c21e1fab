//! The local profile: everything tiops persists between invocations.
//!
//! The profile directory is rooted by `TIUP_COMPONENT_DATA_DIR` when
//! set, otherwise `$HOME/.tiup/storage/cluster`. Under it live the
//! per-cluster state directories, the shared package cache and the
//! audit log:
//!
//! ```text
//! <profile>/
//!   clusters/<name>/
//!     meta.yaml            # ClusterMeta
//!     ssh/id_rsa[.pub]     # per-cluster SSH identity
//!     config/              # rendered config cache
//!     ansible-backup/      # legacy inventory backup for imports
//!     patch/               # patched packages
//!     cache/               # scratch space
//!   packages/              # content-addressed tarball cache
//!   audit/                 # one file per invocation
//! ```

pub mod audit;
pub mod error;
pub mod meta;
pub mod profile;

pub use error::{ProfileError, Result};
pub use meta::ClusterMeta;
pub use profile::Profile;

/// Environment variable overriding the profile root.
pub const ENV_DATA_DIR: &str = "TIUP_COMPONENT_DATA_DIR";

/// Validates a cluster name: non-empty, portable characters only.
pub fn validate_cluster_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(ProfileError::InvalidClusterName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_name_validation() {
        assert!(validate_cluster_name("prod-cluster_1.2").is_ok());
        assert!(validate_cluster_name("").is_err());
        assert!(validate_cluster_name("has space").is_err());
        assert!(validate_cluster_name("slash/name").is_err());
    }
}
