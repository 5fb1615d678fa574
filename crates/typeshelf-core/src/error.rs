//! # Error Types
//!
//! Domain-specific error types for typeshelf-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  typeshelf-core errors (this file)                                     │
//! │  └── CoreError        - Rejected payloads                              │
//! │                                                                         │
//! │  typeshelf-installer errors (separate crate)                           │
//! │  └── InstallerError   - Font file I/O failures                         │
//! │                                                                         │
//! │  typeshelf-sync errors (separate crate)                                │
//! │  └── SyncError        - Transport, channel and state machine failures  │
//! │                                                                         │
//! │  Flow: CoreError → SyncError → caller                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while turning wire payloads into catalog entities.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required identifier is missing or empty.
    ///
    /// ## When This Occurs
    /// - A font description arrives without a `uid`
    /// - A font description arrives without a family name
    #[error("{field} is required")]
    MissingIdentifier { field: String },

    /// A URL in a font description could not be parsed.
    #[error("{field} is not a valid URL ({value}): {reason}")]
    InvalidUrl {
        field: String,
        value: String,
        reason: String,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
