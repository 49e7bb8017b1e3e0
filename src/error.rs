//! Error types and handling infrastructure for unifile.
//!
//! This module provides a centralized error handling system using `thiserror` for
//! custom error types. All recoverable failures are reported through [`Result`];
//! the library never terminates the process on caller misuse or I/O trouble.
//!
//! ## Design Principles
//!
//! - **User-friendly messages**: Errors should provide actionable feedback
//! - **Context preservation**: Include relevant information for debugging
//! - **Consistency**: Standardized Result type across all modules

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for unifile operations.
///
/// This enum covers all possible error conditions that can occur while opening,
/// reading, writing and closing plain or compressed file handles.
#[derive(Error, Debug)]
pub enum UnifileError {
    /// File system related errors (file not found, permission denied, etc.)
    #[error("File operation failed: {message}")]
    FileError {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// File not found specifically (common case for user feedback)
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Path exists but is not a regular file
    #[error("Path is not a regular file: {path}")]
    NotAFile { path: PathBuf },

    /// Permission denied accessing file
    #[error("Permission denied accessing file: {path}")]
    PermissionDenied { path: PathBuf },

    /// Compression stream errors (corrupt header, codec failure, finalization failure)
    #[error("Compression error: {message}")]
    CompressionError { message: String },

    /// Operation issued against a handle opened in the opposite mode
    #[error("Cannot {operation} a handle opened for {mode}")]
    WrongMode {
        operation: &'static str,
        mode: &'static str,
    },

    /// Operation issued against a handle that was already closed
    #[error("Cannot {operation}: handle is closed")]
    Closed { operation: &'static str },

    /// Invalid argument supplied by the caller (bad record geometry, zero-length buffer)
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Generic error for cases not covered by specific variants
    #[error("Operation failed: {message}")]
    Other { message: String },
}

/// Standard Result type for unifile operations.
///
/// This type alias provides a consistent error handling interface across
/// all modules in the unifile codebase.
pub type Result<T> = std::result::Result<T, UnifileError>;

impl UnifileError {
    /// Create a FileError from an io::Error with additional context
    pub fn file_error(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileError {
            message: message.into(),
            source,
        }
    }

    /// Create a CompressionError with a descriptive message
    pub fn compression(message: impl Into<String>) -> Self {
        Self::CompressionError {
            message: message.into(),
        }
    }

    /// Create a WrongMode error for an operation issued in the wrong direction
    pub fn wrong_mode(operation: &'static str, mode: &'static str) -> Self {
        Self::WrongMode { operation, mode }
    }

    /// Create a Closed error for an operation on an already-closed handle
    pub fn closed(operation: &'static str) -> Self {
        Self::Closed { operation }
    }

    /// Create an InvalidArgument error with a descriptive message
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a generic Other error with a descriptive message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

// Automatic conversion from io::Error to UnifileError
impl From<std::io::Error> for UnifileError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => {
                // For NotFound, we lose the specific path context here,
                // but it can be added at the call site using FileNotFound
                Self::FileError {
                    message: "File not found".to_string(),
                    source: err,
                }
            }
            std::io::ErrorKind::PermissionDenied => Self::FileError {
                message: "Permission denied".to_string(),
                source: err,
            },
            _ => Self::FileError {
                message: "IO operation failed".to_string(),
                source: err,
            },
        }
    }
}
