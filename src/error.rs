//! Error handling for the upload manager
//!
//! This module defines the error types used throughout the library.
//! Transfer errors never reach the caller of `upload`; they are settled
//! at the task boundary and only show up in logs and session counters.

use thiserror::Error;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, UploadError>;

/// Error types that can occur while scheduling or running uploads
#[derive(Error, Debug)]
pub enum UploadError {
    /// Invalid parameter
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// A remote path could not be normalized
    #[error("Invalid path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// A target path collides with a tracked file or directory
    #[error("Path conflict at '{path}'")]
    PathConflict { path: String },

    /// A transport operation failed
    #[error("Transport operation failed: {operation} - {message}")]
    Transport { operation: String, message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Manager lifecycle error
    #[error("Upload manager error: {message}")]
    ManagerError { message: String },

    /// Operation was cancelled
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UploadError {
    /// Create a new invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        UploadError::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid path error
    pub fn invalid_path(path: impl Into<String>, message: impl Into<String>) -> Self {
        UploadError::InvalidPath {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new path conflict error
    pub fn path_conflict(path: impl Into<String>) -> Self {
        UploadError::PathConflict { path: path.into() }
    }

    /// Create a new transport error
    pub fn transport_error(operation: impl Into<String>, message: impl Into<String>) -> Self {
        UploadError::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        UploadError::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new manager error
    pub fn manager_error(message: impl Into<String>) -> Self {
        UploadError::ManagerError {
            message: message.into(),
        }
    }

    /// Create a new cancelled error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        UploadError::Cancelled {
            operation: operation.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled { .. })
    }
}
