use thiserror::Error;

/// Result type for topology operations.
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors raised while loading, validating or rendering a topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The YAML document could not be parsed, or contained unknown keys.
    #[error("failed to parse topology: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A group entry is missing its `host` field.
    #[error("`{group}` contains an empty host field")]
    EmptyHost {
        /// The yaml key of the offending group.
        group: String,
    },

    /// Two instances claim the same port on one host.
    #[error(
        "port conflict for '{port}' between '{prev_group}:{host}.{prev_field}' \
         and '{group}:{host}.{field}'"
    )]
    PortConflict {
        /// The conflicting port.
        port: u16,
        /// The shared host.
        host: String,
        /// Group yaml key of the earlier claim.
        prev_group: String,
        /// Field yaml key of the earlier claim.
        prev_field: String,
        /// Group yaml key of the later claim.
        group: String,
        /// Field yaml key of the later claim.
        field: String,
    },

    /// Two instances claim the same directory on one host.
    #[error(
        "directory conflict for '{dir}' between '{prev_group}:{host}.{prev_field}' \
         and '{group}:{host}.{field}'"
    )]
    DirConflict {
        /// The conflicting directory.
        dir: String,
        /// The shared host.
        host: String,
        /// Group yaml key of the earlier claim.
        prev_group: String,
        /// Field yaml key of the earlier claim.
        prev_field: String,
        /// Group yaml key of the later claim.
        group: String,
        /// Field yaml key of the later claim.
        field: String,
    },

    /// A rendered configuration was rejected by the component binary.
    #[error("config check failed for {component}: {reason}")]
    ConfigCheck {
        /// The component whose binary rejected the config.
        component: String,
        /// The failure output.
        reason: String,
    },

    /// Template rendering failed.
    #[error("failed to render {what}: {reason}")]
    Render {
        /// What was being rendered.
        what: String,
        /// The renderer's failure.
        reason: String,
    },

    /// Converting a merged config map to TOML failed.
    #[error("failed to encode configuration as TOML: {0}")]
    TomlEncode(String),

    /// A remote step of config distribution failed.
    #[error(transparent)]
    Executor(#[from] tiops_executor::ExecutorError),

    /// Local I/O while staging configs failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TopologyError {
    /// Creates a render error.
    pub fn render(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Render {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Creates a config-check error.
    pub fn config_check(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigCheck {
            component: component.into(),
            reason: reason.into(),
        }
    }
}
