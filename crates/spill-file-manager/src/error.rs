//! Error types for the spill file manager.

use std::path::PathBuf;

/// Result type for spill file operations.
pub type Result<T> = std::result::Result<T, SpillFileError>;

/// Errors that can occur while managing spill files.
#[derive(Debug, thiserror::Error)]
pub enum SpillFileError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File name rejected - spill files are flat names inside the sandbox
    #[error("Invalid spill file name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// File not found in the spill directory
    #[error("Spill file not found: {name}")]
    FileNotFound { name: String },

    /// Directory creation failed
    #[error("Failed to create spill directory: {path:?} - {source}")]
    DirectoryCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Permissions error
    #[error("Permission denied: {operation} on {path:?}")]
    Permission { operation: String, path: PathBuf },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}
