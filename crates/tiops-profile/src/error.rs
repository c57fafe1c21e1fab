use thiserror::Error;

/// Result type for profile operations.
pub type Result<T> = std::result::Result<T, ProfileError>;

/// Errors raised by the profile store.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The profile root could not be determined.
    #[error("cannot determine profile directory: {0}")]
    NoProfileDir(String),

    /// A cluster name contains characters that do not survive as a
    /// directory name.
    #[error("invalid cluster name '{0}'")]
    InvalidClusterName(String),

    /// The named cluster has no metadata on disk.
    #[error("cluster '{0}' does not exist")]
    ClusterNotFound(String),

    /// Cluster metadata failed to (de)serialize.
    #[error("failed to read or write cluster metadata: {0}")]
    Meta(#[from] serde_yaml::Error),

    /// An audit id did not decode.
    #[error("invalid audit id '{0}'")]
    InvalidAuditId(String),

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
