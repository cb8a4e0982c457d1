//! Error types for Fleetshell.
//!
//! Each subsystem has its own error enum; [`Error`] wraps them for callers
//! that cross subsystem boundaries (configuration loading, the CLI, the API
//! server).

use std::path::PathBuf;
use thiserror::Error;

use crate::connection::ConnectionError;
use crate::store::StoreError;

/// Result type alias for Fleetshell operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Fleetshell.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// Talking to a remote host failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    // ========================================================================
    // Storage Errors
    // ========================================================================
    /// Host store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A configuration file could not be read or parsed.
    #[error("Failed to load config file '{path}': {message}")]
    ConfigLoad {
        /// Path to the config file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a config load error.
    pub fn config_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::ConfigLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the error means the remote transport is unusable.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, Error::Connection(e) if e.is_connection_level())
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Connection(e) if e.is_connection_level() => 3,
            Error::Connection(_) => 2,
            Error::Store(StoreError::NotFound(_)) => 4,
            Error::ConfigLoad { .. } | Error::InvalidConfig(_) => 5,
            _ => 1,
        }
    }
}
