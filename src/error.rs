//! Error types for the monitoring engine

use std::fmt;

/// Result type alias for engine operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors that can surface at the engine boundary
///
/// Collector, callback and recovery failures are never returned through this type:
/// they are absorbed by the engine and logged. What remains are configuration problems
/// and scheduler control errors.
#[derive(Debug)]
pub enum MonitorError {
    /// Configuration values are out of range
    InvalidConfig(String),

    /// Configuration could not be parsed
    Parse(String),

    /// I/O error (config file access, etc.)
    Io(std::io::Error),

    /// No recovery action is registered under this name
    UnknownAction(String),

    /// The scheduler is not running
    SchedulerStopped,

    /// The background worker went away while handling a request
    WorkerFailed(String),

    /// A monitoring tick aborted before committing its results
    TickFailed(String),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            MonitorError::Parse(msg) => write!(f, "failed to parse configuration: {}", msg),
            MonitorError::Io(err) => write!(f, "I/O error: {}", err),
            MonitorError::UnknownAction(name) => write!(f, "unknown recovery action: {}", name),
            MonitorError::SchedulerStopped => write!(f, "monitor scheduler is not running"),
            MonitorError::WorkerFailed(msg) => write!(f, "monitor worker failed: {}", msg),
            MonitorError::TickFailed(msg) => write!(f, "monitoring tick failed: {}", msg),
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitorError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        MonitorError::Io(err)
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for MonitorError {
    fn from(err: toml::de::Error) -> Self {
        MonitorError::Parse(err.to_string())
    }
}
