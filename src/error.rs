//! Error types for configuration loading, driver invocation and the
//! container runtime.
//!
//! Only [`RuntimeError::Gone`] is ever recovered from locally; everything
//! else terminates the process.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::network::ValidationErrors;

/// Failure while expanding `$VAR` references in a single string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpolationError {
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("required variable unset: {0}")]
    RequiredVariableUnset(String),

    #[error("invalid interpolation syntax in \"{template}\" at offset {offset}")]
    InvalidSyntax { template: String, offset: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration at {path}: {message}")]
    Syntax { path: String, message: String },

    #[error("interpolating {path}: {source}")]
    Interpolation {
        path: String,
        #[source]
        source: InterpolationError,
    },

    #[error("network config parsing errors:\n{0}")]
    Validation(ValidationErrors),

    #[error("no network config specified (use --network-file or 'x-network' in a compose file)")]
    NoNetworkConfig,

    #[error("container id could not be identified")]
    ContainerId,
}

/// A network-mutation helper could not be run or reported failure.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("spawning {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command failed (exit code {}): {command}\n{stderr}", .code.map_or("none".to_string(), |c| c.to_string()))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The container vanished (404) or is not running (409).
    #[error("container {0} is gone")]
    Gone(String),

    #[error("container runtime: {0}")]
    Api(String),

    #[error("container event stream closed")]
    StreamClosed,
}

impl RuntimeError {
    pub fn is_gone(&self) -> bool {
        matches!(self, RuntimeError::Gone(_))
    }
}

impl From<bollard::errors::Error> for RuntimeError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404 | 409,
                message,
            } => RuntimeError::Gone(message),
            other => RuntimeError::Api(other.to_string()),
        }
    }
}

/// Failure in the `wait` and `copy` container helpers.
#[derive(Debug, Error)]
pub enum HelperError {
    #[error("invalid TCP address '{0}' (expected HOST:PORT)")]
    TcpAddress(String),

    #[error("not a directory: '{0}'")]
    NotADirectory(PathBuf),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

/// Top-level failure of a conlink run.
#[derive(Debug, Error)]
pub enum ConlinkError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("timed out waiting for containers: {}", .unconnected.join(", "))]
    Timeout { unconnected: Vec<String> },

    #[error("topology builder exited with {0}")]
    Builder(ExitStatus),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConlinkError>;
