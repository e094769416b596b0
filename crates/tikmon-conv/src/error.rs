//! Error types for value decoding

use thiserror::Error;

use crate::types::ParamType;

/// Errors that can occur while decoding a single field
#[derive(Debug, Error)]
pub enum ConvError {
    /// Value is not a number after unit stripping
    #[error("invalid number: '{0}'")]
    InvalidNumber(String),

    /// Value does not match the `1w2d3h4m5s` format
    #[error("invalid timespan: '{0}'")]
    InvalidTimespan(String),

    /// Value does not match the `MMM/dd/yyyy HH:mm:ss` format
    #[error("invalid datetime: '{0}'")]
    InvalidDateTime(String),

    /// No enum mapping matched and no fallback is configured
    #[error("no enum mapping for '{0}'")]
    UnmappedEnum(String),

    /// The parameter type cannot produce the requested kind of value
    #[error("parameter type {0} cannot be decoded as a number")]
    NotNumeric(ParamType),

    /// Regex in a remap or enum rule failed to compile
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Result type for decode operations
pub type ConvResult<T> = Result<T, ConvError>;
