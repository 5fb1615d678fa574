//! # Sync Error Types
//!
//! Error types for connection and storage operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  InvalidPayload         │ │
//! │  │  ConfigLoad     │  │  Timeout        │  │  Serialization          │ │
//! │  │  ConfigSave     │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │    Storage      │  │   State Machine                             │  │
//! │  │                 │  │                                             │  │
//! │  │  FontRejected   │  │  InvalidTransition    RefreshPending        │  │
//! │  │  LoadFailed     │  │  ShuttingDown                               │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use typeshelf_core::CoreError;

use crate::state::ConnectionState;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all connection and storage failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid client configuration.
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Failed to open the transport.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation timed out.
    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// A payload did not match the expected shape.
    #[error("Invalid payload for {event}: {reason}")]
    InvalidPayload { event: String, reason: String },

    /// Failed to serialize a payload.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// A font description could not become a catalog font.
    #[error("Font rejected: {0}")]
    FontRejected(#[from] CoreError),

    /// Font bytes could not be fetched.
    #[error("Failed to load font {uid}: {reason}")]
    LoadFailed { uid: String, reason: String },

    // =========================================================================
    // State Machine Errors
    // =========================================================================
    /// The requested action is not allowed in the current state.
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: ConnectionState,
    },

    /// A refresh was requested and has not been taken up yet.
    #[error("A catalog update is already pending")]
    RefreshPending,

    /// The connection acceptor is gone.
    #[error("Connection is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if this error is recoverable and the operation can be retried.
    ///
    /// ## Retryable Errors
    /// - Connection failures (network issues)
    /// - Timeouts
    /// - Failed downloads
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionFailed(_) | SyncError::Timeout(_) | SyncError::LoadFailed { .. }
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::ConnectionFailed("network error".into()).is_retryable());
        assert!(SyncError::Timeout(60).is_retryable());

        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!SyncError::InvalidTransition {
            action: "update catalog",
            state: ConnectionState::Idle,
        }
        .is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::InvalidTransition {
            action: "update catalog",
            state: ConnectionState::Idle,
        };
        assert_eq!(err.to_string(), "Cannot update catalog while idle");

        let err = SyncError::InvalidPayload {
            event: "font:activation".into(),
            reason: "missing field `uid`".into(),
        };
        assert!(err.to_string().contains("font:activation"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_core_error_conversion() {
        let err: SyncError = CoreError::MissingIdentifier {
            field: "uid".into(),
        }
        .into();
        assert!(matches!(err, SyncError::FontRejected(_)));
    }
}
