use thiserror::Error;

/// Result type for task execution.
pub type Result<T> = std::result::Result<T, TaskError>;

/// Errors raised while executing a task graph.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Sentinel returned by tasks that cannot undo themselves.
    #[error("unsupported rollback")]
    UnsupportedRollback,

    /// A task needed an executor that was never established.
    #[error("no executor initialized for host {0}")]
    NoExecutor(String),

    /// No SSH identity was set in the context.
    #[error("no SSH identity set in context")]
    NoSshKey,

    /// A child task failed; the message carries the child's stable
    /// string form as prefix.
    #[error("{task}: {source}")]
    Child {
        /// The failing task's string form.
        task: String,
        /// The failure itself.
        #[source]
        source: Box<TaskError>,
    },

    /// Several parallel children failed.
    #[error("{} parallel tasks failed: {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<TaskError>),

    /// A downloaded package did not match its checksum sidecar.
    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The package file.
        file: String,
        /// Checksum from the sidecar.
        expected: String,
        /// Checksum of the file content.
        actual: String,
    },

    /// A package the task needs is not in the local cache.
    #[error("package {0} not found in cache, download it first")]
    PackageNotFound(String),

    /// Fetching from the mirror failed.
    #[error("failed to download {file} from mirror: {reason}")]
    Download {
        /// The requested file.
        file: String,
        /// Why the download failed.
        reason: String,
    },

    /// A remote command or transfer failed.
    #[error(transparent)]
    Executor(#[from] tiops_executor::ExecutorError),

    /// A lifecycle procedure failed.
    #[error(transparent)]
    Operation(#[from] tiops_operation::OperationError),

    /// Config rendering or validation failed.
    #[error(transparent)]
    Topology(#[from] tiops_topology::TopologyError),

    /// Profile store access failed.
    #[error(transparent)]
    Profile(#[from] tiops_profile::ProfileError),

    /// A control-plane API call failed.
    #[error(transparent)]
    Api(#[from] tiops_api::ApiError),

    /// Local I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_errors(errors: &[TaskError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl TaskError {
    /// Wraps `source` with the failing task's string form.
    pub fn child(task: impl Into<String>, source: TaskError) -> Self {
        Self::Child {
            task: task.into(),
            source: Box::new(source),
        }
    }

    /// True for the rollback sentinel.
    pub fn is_unsupported_rollback(&self) -> bool {
        matches!(self, Self::UnsupportedRollback)
    }

    /// True when any error in the tree is a pre-check rejection.
    pub fn is_precheck(&self) -> bool {
        match self {
            Self::Operation(op) => op.is_precheck(),
            Self::Child { source, .. } => source.is_precheck(),
            Self::Aggregate(errors) => errors.iter().any(|e| e.is_precheck()),
            _ => false,
        }
    }
}
