//! Unified error types for svnharvest

use thiserror::Error;

/// Unified error type for all svnharvest operations
#[derive(Error, Debug)]
pub enum HarvestError {
    // Subprocess errors
    /// The tool could not be started or exited unsuccessfully.
    ///
    /// `output` holds whatever the tool printed, usually its own diagnostic.
    #[error("cannot {operation} {path}: {message}")]
    Execution {
        operation: String,
        path: String,
        message: String,
        output: String,
    },

    #[error("svn executor error: {0}")]
    Svn(String),

    // Decoding errors
    #[error("cannot parse XML: {excerpt}: {reason}")]
    Decode { excerpt: String, reason: String },

    // Input errors
    #[error("Invalid repository location: {0}")]
    InvalidLocation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Export pipeline errors
    #[error("Export notifier failed: {0}")]
    Notifier(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl HarvestError {
    /// Captured tool output attached to an execution failure, if any
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Execution { output, .. } => Some(output.as_str()),
            _ => None,
        }
    }
}

/// Result type alias using HarvestError
pub type Result<T> = std::result::Result<T, HarvestError>;
