//! Storage error handling
//!
//! Provides typed errors for storage operations with descriptive messages
//! and recovery suggestions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create data directory
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Disk is full or quota exceeded
    #[error(
        "Disk full or quota exceeded while writing to '{path}'. Free up disk space and try again."
    )]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read file
    #[error("Failed to read '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write file
    #[error("Failed to write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File not found (when expected to exist)
    #[error("File not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Atomic write failed during rename
    #[error("Atomic write failed: could not rename '{from}' to '{to}': {source}")]
    AtomicWriteFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The medium refused a write for a reason other than a file error
    #[error("Write to '{key}' rejected: {reason}")]
    WriteRejected { key: String, reason: String },

    /// The remote store refused access for this user
    #[error("Access denied for user '{user_id}': {reason}")]
    Unauthorized { user_id: String, reason: String },

    /// The remote store could not be reached
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking storage task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind (permission, disk full, etc.)
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path,
                source: error,
            },
            io::ErrorKind::NotFound => StorageError::NotFound { path },
            _ if is_disk_full_error(&error) => StorageError::DiskFull {
                path,
                source: error,
            },
            _ => StorageError::WriteError {
                path,
                source: error,
            },
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::DiskFull { .. }
                | StorageError::PermissionDenied { .. }
                | StorageError::Unavailable(_)
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::DiskFull { .. } => Some("Free up disk space and try again."),
            StorageError::PermissionDenied { .. } => {
                Some("Check file and directory permissions. You may need to run with different permissions or change ownership.")
            }
            StorageError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            StorageError::Unauthorized { .. } => Some("Sign in again and retry."),
            StorageError::Unavailable(_) => {
                Some("Your sections are still available locally. Try signing in again later.")
            }
            _ => None,
        }
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
