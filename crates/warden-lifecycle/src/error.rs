//! Error types for the lifecycle coordinator

use thiserror::Error;

/// Result type alias for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Errors that can occur in the lifecycle coordinator
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The owning worker is no longer running
    #[error("Lifecycle worker stopped")]
    WorkerStopped,
}

impl From<serde_json::Error> for LifecycleError {
    fn from(e: serde_json::Error) -> Self {
        LifecycleError::Serialization(e.to_string())
    }
}
