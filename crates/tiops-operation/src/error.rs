use thiserror::Error;

/// Result type for lifecycle procedures.
pub type Result<T> = std::result::Result<T, OperationError>;

/// A failure rejected before any remote side effect.
///
/// Pre-check errors carry a remediation suggestion and suppress the
/// debug dump the other errors trigger.
#[derive(Debug, Error)]
pub enum PreCheckError {
    /// A cluster with this name already has metadata.
    #[error("cluster name '{name}' is duplicated")]
    NameDuplicate {
        /// The duplicated name.
        name: String,
        /// Remediation hint.
        suggestion: String,
    },

    /// A port collides with another cluster's instance.
    #[error("port conflict for '{port}' on host '{host}' with cluster '{exist_cluster}'")]
    PortConflict {
        /// The conflicting port.
        port: u16,
        /// The shared host.
        host: String,
        /// The cluster already claiming the port.
        exist_cluster: String,
        /// Remediation hint.
        suggestion: String,
    },

    /// A directory collides with another cluster's instance.
    #[error("directory conflict for '{dir}' on host '{host}' with cluster '{exist_cluster}'")]
    DirConflict {
        /// The conflicting directory.
        dir: String,
        /// The shared host.
        host: String,
        /// The cluster already claiming the directory.
        exist_cluster: String,
        /// Remediation hint.
        suggestion: String,
    },

    /// Neither an identity file nor a password was supplied.
    #[error("SSH credentials are unspecified")]
    CredentialMissing {
        /// Remediation hint.
        suggestion: String,
    },
}

impl PreCheckError {
    /// The user-facing remediation text.
    pub fn suggestion(&self) -> &str {
        match self {
            Self::NameDuplicate { suggestion, .. }
            | Self::PortConflict { suggestion, .. }
            | Self::DirConflict { suggestion, .. }
            | Self::CredentialMissing { suggestion } => suggestion,
        }
    }

    /// True for a cross-cluster port conflict.
    pub fn is_port_conflict(&self) -> bool {
        matches!(self, Self::PortConflict { .. })
    }

    /// True for a cross-cluster directory conflict.
    pub fn is_dir_conflict(&self) -> bool {
        matches!(self, Self::DirConflict { .. })
    }
}

/// Errors raised by the lifecycle procedures.
#[derive(Debug, Error)]
pub enum OperationError {
    /// No executor was established for a host the procedure needs.
    #[error("no executor initialized for host {0}")]
    NoExecutor(String),

    /// Starting an instance failed.
    #[error("failed to start {component} {id}: {source}")]
    StartFailed {
        /// The component being started.
        component: String,
        /// The instance id.
        id: String,
        /// The underlying failure.
        #[source]
        source: Box<OperationError>,
    },

    /// Stopping an instance failed.
    #[error("failed to stop {component} {id}: {source}")]
    StopFailed {
        /// The component being stopped.
        component: String,
        /// The instance id.
        id: String,
        /// The underlying failure.
        #[source]
        source: Box<OperationError>,
    },

    /// A node id named on the command line is not in the topology.
    #[error("cannot find node id '{0}' in topology")]
    UnknownNode(String),

    /// The operation would remove every instance of a quorum role.
    #[error("cannot delete all {0} servers")]
    CannotDeleteAll(String),

    /// Scale-in needs at least one surviving PD to talk to.
    #[error("cannot find available PD instance")]
    NoPdAvailable,

    /// A pre-check rejected the operation.
    #[error(transparent)]
    PreCheck(#[from] PreCheckError),

    /// A control-plane API call failed.
    #[error(transparent)]
    Api(#[from] tiops_api::ApiError),

    /// A remote command failed.
    #[error(transparent)]
    Executor(#[from] tiops_executor::ExecutorError),

    /// Config rendering or distribution failed.
    #[error(transparent)]
    Topology(#[from] tiops_topology::TopologyError),

    /// Reading other clusters' metadata failed.
    #[error(transparent)]
    Profile(#[from] tiops_profile::ProfileError),

    /// Host check produced unusable output.
    #[error("error getting check output of {host}: {reason}")]
    CheckOutput {
        /// The checked host.
        host: String,
        /// What was wrong.
        reason: String,
    },
}

impl OperationError {
    /// True when the error rejected the operation before any remote
    /// side effect; callers print the suggestion instead of a debug
    /// dump.
    pub fn is_precheck(&self) -> bool {
        matches!(self, Self::PreCheck(_))
    }

    pub(crate) fn start_failed(component: &str, id: String, source: OperationError) -> Self {
        Self::StartFailed {
            component: component.to_string(),
            id,
            source: Box::new(source),
        }
    }

    pub(crate) fn stop_failed(component: &str, id: String, source: OperationError) -> Self {
        Self::StopFailed {
            component: component.to_string(),
            id,
            source: Box::new(source),
        }
    }
}
