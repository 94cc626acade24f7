//! Error types for autobuild operations

use std::path::PathBuf;

use autobuild_state::StateError;
use thiserror::Error;

/// An external command could not be run or did not succeed.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command has no program to execute
    #[error("Command is empty")]
    Empty,

    /// The program could not be started
    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully
    #[error("`{command}` exited with {}", exit_description(.code))]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The program did not finish within the configured timeout
    #[error("`{command}` timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Posting the notification failed.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// The webhook answered with something other than 200
    #[error("Webhook returned status {0}")]
    Status(u16),

    /// The request never got a response
    #[error("Webhook request failed: {0}")]
    Http(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Http(err.to_string())
    }
}

/// Required configuration is missing or malformed. Fatal for the whole run.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required environment variable is not set
    #[error("Environment variable {0} is not set")]
    MissingEnv(String),

    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// A config value is unusable
    #[error("Invalid config value for {field}: {message}")]
    Invalid { field: String, message: String },
}

/// Umbrella error for autobuild operations.
#[derive(Error, Debug)]
pub enum AutobuildError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    /// Git produced output we could not interpret
    #[error("Unexpected git output: {0}")]
    Git(String),
}

/// Result type for autobuild operations
pub type Result<T> = std::result::Result<T, AutobuildError>;
