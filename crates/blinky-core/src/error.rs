//! Facade-level errors

use thiserror::Error;

use crate::storage::StorageError;

/// Errors returned by `SectionStore`
#[derive(Error, Debug)]
pub enum StoreError {
    /// A backend operation failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A sign-in or sign-out is still being applied
    #[error("Another sign-in or sign-out is still in progress; try again once it finishes")]
    TransitionInProgress,
}

impl StoreError {
    /// Check if retrying later may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            StoreError::Storage(e) => e.is_recoverable(),
            StoreError::TransitionInProgress => true,
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StoreError::Storage(e) => e.recovery_suggestion(),
            StoreError::TransitionInProgress => Some("Wait for the current sign-in to finish."),
        }
    }
}

/// Result type for facade operations
pub type StoreResult<T> = Result<T, StoreError>;
