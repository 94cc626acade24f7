//! Error types for autobuild-state

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or persisting build state
#[derive(Error, Debug)]
pub enum StateError {
    /// Reading or writing the state file failed
    #[error("State file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The state file exists but is not a valid branch mapping
    #[error("Failed to parse state file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_yaml::Error> for StateError {
    fn from(err: serde_yaml::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Result type for state operations
pub type StateResult<T> = std::result::Result<T, StateError>;
