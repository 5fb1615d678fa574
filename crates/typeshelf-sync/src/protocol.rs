//! # Channel Protocol
//!
//! Topic and event names exchanged with the catalog service.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Channel Protocol                                 │
//! │                                                                         │
//! │  USER CHANNEL (users:<uid>)                                            │
//! │  ──────────────────────────                                            │
//! │  server ───► font:activation      { uid }                              │
//! │  server ───► font:deactivation    { uid }                              │
//! │  server ───► update:complete                                           │
//! │  client ───► update:request                                            │
//! │  client ───► ready                                                     │
//! │  client ───► disconnect           { reason }                           │
//! │  client ───► font:installation-success / -failure       { uid }        │
//! │  client ───► font:uninstallation-success / -failure     { uid }        │
//! │                                                                         │
//! │  CATALOG CHANNEL (catalog)                                             │
//! │  ─────────────────────────                                             │
//! │  server ───► font:description     FontDescription                      │
//! │  server ───► font:deletion        { uid }                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Payloads are plain JSON objects; events without a payload carry none.
//! ```json
//! { "uid": "f-123" }
//! ```

/// Default topic of the shared catalog channel.
pub const DEFAULT_CATALOG_TOPIC: &str = "catalog";

/// Prefix of the per-user channel topic.
pub const USER_TOPIC_PREFIX: &str = "users:";

/// Builds the topic of a user's private channel.
pub fn user_topic(uid: &str) -> String {
    format!("{}{}", USER_TOPIC_PREFIX, uid)
}

// =============================================================================
// User Channel Events
// =============================================================================

pub const FONT_ACTIVATION: &str = "font:activation";
pub const FONT_DEACTIVATION: &str = "font:deactivation";
pub const UPDATE_COMPLETE: &str = "update:complete";

pub const DISCONNECT: &str = "disconnect";
pub const UPDATE_REQUEST: &str = "update:request";
pub const READY: &str = "ready";

pub const FONT_INSTALLATION_SUCCESS: &str = "font:installation-success";
pub const FONT_INSTALLATION_FAILURE: &str = "font:installation-failure";
pub const FONT_UNINSTALLATION_SUCCESS: &str = "font:uninstallation-success";
pub const FONT_UNINSTALLATION_FAILURE: &str = "font:uninstallation-failure";

// =============================================================================
// Catalog Channel Events
// =============================================================================

pub const FONT_DESCRIPTION: &str = "font:description";
pub const FONT_DELETION: &str = "font:deletion";
