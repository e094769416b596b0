//! Scrape error types

use std::time::Duration;

use thiserror::Error;
use tikmon_device::PoolError;

use crate::registry::RegistryError;

/// Result type for scrape operations
pub type ScrapeResult<T> = Result<T, ScrapeError>;

/// Errors that fail a whole scrape
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The device answered with a trap, or the command could not be sent
    #[error("command '{command}' failed: {message}")]
    CommandFault { command: String, message: String },

    /// The command tree did not complete in time
    #[error("command '{command}' not completed after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    /// No session to the device
    #[error(transparent)]
    Connection(#[from] PoolError),

    /// Request without a target
    #[error("target parameter missing")]
    TargetMissing,

    #[error("target '{0}' not found")]
    TargetNotFound(String),

    #[error("module '{0}' not found")]
    ModuleNotFound(String),

    /// Exposition failed
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
