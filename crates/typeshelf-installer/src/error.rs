//! # Installer Error Types
//!
//! Errors raised inside the registry installer.
//!
//! These never cross the [`crate::FontInstaller`] boundary: the installer logs
//! them and answers `FontApiResult::Failure`, so storage only ever sees a
//! per-font outcome.

use std::path::PathBuf;

use thiserror::Error;

/// Installer operation errors.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// Writing or deleting a user-scope font file failed.
    ///
    /// ## When This Occurs
    /// - Font directory is missing or read-only
    /// - Disk full
    #[error("Font file I/O failed for {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The OS refused the registration or release.
    #[error("Font system rejected {operation} for {uid}")]
    Rejected { operation: String, uid: String },

    /// The blocking task running the OS call panicked or was cancelled.
    #[error("Blocking task failed: {0}")]
    TaskFailed(String),
}

impl InstallerError {
    /// Creates a Rejected error for a given operation and font.
    pub fn rejected(operation: impl Into<String>, uid: impl Into<String>) -> Self {
        InstallerError::Rejected {
            operation: operation.into(),
            uid: uid.into(),
        }
    }
}

impl From<tokio::task::JoinError> for InstallerError {
    fn from(err: tokio::task::JoinError) -> Self {
        InstallerError::TaskFailed(err.to_string())
    }
}

/// Result type for installer operations.
pub type InstallerResult<T> = Result<T, InstallerError>;
