//! Error types for the bridge.

use thiserror::Error;

/// Errors that can occur while running the bridge.
#[derive(Debug, Error)]
pub enum SitlError {
    /// A socket could not be created, connected or bound.
    #[error("{what} failed on {addr}: {source}")]
    SocketSetup {
        /// The operation that failed.
        what: &'static str,
        /// Address involved.
        addr: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The process that launched us has gone away.
    #[error("parent process {pid} exited")]
    ParentExited {
        /// Parent pid captured at startup.
        pid: u32,
    },

    /// A peripheral simulator produced an impossible actuator value.
    #[error("bad input servo value ({value}) on channel {channel} from {peripheral}")]
    InvalidActuatorValue {
        /// Peripheral name.
        peripheral: String,
        /// Channel index.
        channel: usize,
        /// Offending value.
        value: u16,
    },

    /// Parameter error.
    #[error("Parameter error: {0}")]
    Param(#[from] sitl_params::ParamError),

    /// Wire format error.
    #[error("Wire error: {0}")]
    Wire(#[from] sitl_wire::WireError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SitlError {
    /// Whether this error must terminate the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SitlError::SocketSetup { .. }
                | SitlError::ParentExited { .. }
                | SitlError::InvalidActuatorValue { .. }
        )
    }
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, SitlError>;
