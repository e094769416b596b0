//! Configuration error types

use std::path::PathBuf;

use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that reject a configuration load
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File or folder could not be read
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML syntax or schema error, including invalid patterns and durations
    #[error("failed to parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Module defined in more than one file
    #[error("module '{name}' from '{path}' already exists")]
    DuplicateModule { name: String, path: PathBuf },

    /// Target defined in more than one file
    #[error("target '{name}' from '{path}' already exists")]
    DuplicateTarget { name: String, path: PathBuf },
}
