//! # typeshelf-sync: Sync Core for Typeshelf
//!
//! This crate keeps the fonts installed on this machine in step with the
//! user's subscription on the catalog service.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Core Architecture                           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    Connection (state machine)                    │  │
//! │  │                                                                  │  │
//! │  │  Idle ─► Authenticating ─► Connected ─► UpdatingCatalog ─►      │  │
//! │  │  Running, with Reconnecting whenever the transport drops        │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ChannelTransport│  │  UserChannel   │  │     FontStorage        │    │
//! │  │  (external)    │  │ CatalogChannel │  │                        │    │
//! │  │                │  │                │  │ Collection events ──►  │    │
//! │  │ open / auth /  │  │ typed inbound  │  │ installer calls on the │    │
//! │  │ channel(topic) │  │ + outbound     │  │ ProcessingAgent        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  NOTIFICATIONS (ConnectionEventEmitter):                               │
//! │  • state changes            • sign-in established / failed            │
//! │  • catalog update finished  • reconnection started                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`connection`] - The `Connection` state machine and its emitter trait
//! - [`state`] - `ConnectionState` and the transition allow-list
//! - [`transport`] - `ChannelTransport` / `BroadcastChannel` capabilities
//! - [`channel`] - Typed user and catalog channels
//! - [`protocol`] - Topic and event names
//! - [`storage`] - `FontStorage` reconciliation and the report gate
//! - [`processing`] - Bounded-concurrency `ProcessingAgent`
//! - [`config`] - Client configuration (TOML + environment)
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use typeshelf_core::FamilyCollection;
//! use typeshelf_sync::{ClientConfig, Connection, FontStorage};
//!
//! let config = ClientConfig::load_or_default(None);
//! let storage = FontStorage::new(
//!     Arc::new(FamilyCollection::new()),
//!     installer,
//!     loader,
//!     &config.storage,
//! );
//! let connection = Connection::new(transport, storage, config.connection.clone());
//!
//! connection.connect("ada@example.com", "secret");
//! connection.wait_for_state(ConnectionState::Connected).await?;
//! connection.update_catalog()?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod processing;
pub mod protocol;
pub mod state;
pub mod storage;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use channel::{CatalogChannel, CatalogChannelEvent, UserChannel, UserChannelEvent};
pub use config::{ClientConfig, ConnectionSettings, StorageSettings};
pub use connection::{Connection, ConnectionEventEmitter, NoOpEmitter};
pub use error::{SyncError, SyncResult};
pub use processing::{ProcessingAgent, ProcessingEvent};
pub use state::ConnectionState;
pub use storage::{FontLoader, FontStorage, ReportKind, StorageReport};
pub use transport::{
    Authentication, BroadcastChannel, ChannelReply, ChannelTransport, EventHandler,
    TransportEvent,
};
