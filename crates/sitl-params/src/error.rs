//! Error types for parameter handling.

use thiserror::Error;

/// Errors that can occur when setting parameters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParamError {
    /// A `NAME=VALUE` string had no `=`.
    #[error("please specify parameter as NAME=VALUE, got '{0}'")]
    MissingSeparator(String),

    /// No parameter is registered under this name.
    #[error("unknown parameter {0}")]
    UnknownParam(String),

    /// The value could not be interpreted as a number.
    #[error("unable to set parameter {name}: '{value}' is not a number")]
    InvalidValue {
        /// Parameter name.
        name: String,
        /// The text that failed to parse.
        value: String,
    },
}

/// Result type for parameter operations.
pub type Result<T> = std::result::Result<T, ParamError>;
