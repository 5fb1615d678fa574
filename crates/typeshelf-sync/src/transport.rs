//! # Channel Transport
//!
//! The capabilities the connection needs from the wire. The concrete
//! transport (socket library, HTTP client) lives outside this crate and is
//! handed to [`crate::Connection`] as `Arc<dyn ChannelTransport>`.
//!
//! ## Transport Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Channel Transport                                 │
//! │                                                                         │
//! │  authenticate(email, password) ──► Granted(UserData) | Rejected        │
//! │  set_auth_token(token)                                                 │
//! │  open() ──► TransportEvent::Opened                                     │
//! │     ...                                                                 │
//! │  (network drop) ──► TransportEvent::Closed                             │
//! │  open() ──► TransportEvent::Opened                                     │
//! │                                                                         │
//! │  channel(topic) ──► BroadcastChannel                                   │
//! │     on(event, handler) / off(event)                                    │
//! │     join() / leave() ──► Accepted | Rejected(reason)                   │
//! │     send(event, payload)                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;
use typeshelf_core::UserData;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Transport Types
// =============================================================================

/// Callback registered for one channel event. Receives the raw payload
/// (`Value::Null` when the event carries none).
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Lifecycle signal of the underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Closed,
}

/// Remote answer to a join or leave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelReply {
    Accepted,
    Rejected(String),
}

impl ChannelReply {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ChannelReply::Accepted)
    }
}

/// Outcome of a credential exchange.
#[derive(Debug, Clone)]
pub enum Authentication {
    Granted(UserData),
    Rejected(String),
}

// =============================================================================
// Traits
// =============================================================================

/// A named, joinable topic.
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    fn topic(&self) -> &str;

    async fn join(&self) -> SyncResult<ChannelReply>;

    async fn leave(&self) -> SyncResult<ChannelReply>;

    /// Registers the handler for `event`, replacing any previous one.
    fn on(&self, event: &str, handler: EventHandler);

    /// Removes the handler for `event`.
    fn off(&self, event: &str);

    async fn send(&self, event: &str, payload: Option<Value>) -> SyncResult<()>;
}

/// The connection to the catalog service.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Opens (or re-opens) the connection.
    async fn open(&self) -> SyncResult<()>;

    /// Returns the channel for `topic`.
    fn channel(&self, topic: &str) -> Arc<dyn BroadcastChannel>;

    /// Lifecycle signals. Each call returns an independent receiver.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Token presented on every (re)connection.
    fn set_auth_token(&self, token: &str);

    fn auth_token(&self) -> Option<String>;

    /// Exchanges credentials for a user session.
    async fn authenticate(&self, email: &str, password: &str) -> SyncResult<Authentication>;
}

// =============================================================================
// Typed Helpers
// =============================================================================

/// Wraps a typed callback so it can be registered with [`BroadcastChannel::on`].
///
/// Payloads that do not deserialize into `T` are logged and dropped.
pub fn typed_handler<T, F>(event: &'static str, callback: F) -> EventHandler
where
    T: DeserializeOwned,
    F: Fn(T) + Send + Sync + 'static,
{
    Arc::new(move |payload: Value| match decode_payload::<T>(event, payload) {
        Ok(value) => callback(value),
        Err(err) => warn!(error = %err, "Dropping malformed payload"),
    })
}

/// Decodes the payload of `event` into `T`.
pub fn decode_payload<T>(event: &str, payload: Value) -> SyncResult<T>
where
    T: DeserializeOwned,
{
    serde_json::from_value(payload).map_err(|err| SyncError::InvalidPayload {
        event: event.to_string(),
        reason: err.to_string(),
    })
}

/// Wraps a callback for an event without payload.
pub fn unit_handler<F>(callback: F) -> EventHandler
where
    F: Fn() + Send + Sync + 'static,
{
    Arc::new(move |_payload: Value| callback())
}

/// Serializes `payload` and sends it as `event`.
pub async fn send_typed<T>(channel: &dyn BroadcastChannel, event: &str, payload: &T) -> SyncResult<()>
where
    T: Serialize + Sync,
{
    let value = serde_json::to_value(payload)?;
    channel.send(event, Some(value)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use typeshelf_core::FontId;

    #[test]
    fn test_typed_handler_decodes_payload() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = typed_handler::<FontId, _>("font:activation", move |id| {
            sink.lock().unwrap().push(id.uid);
        });

        handler(serde_json::json!({ "uid": "f1" }));
        handler(serde_json::json!({ "unexpected": true }));
        handler(Value::Null);

        assert_eq!(*seen.lock().unwrap(), vec!["f1".to_string()]);
    }

    #[test]
    fn test_decode_payload_names_the_event() {
        let err = decode_payload::<FontId>("font:deletion", serde_json::json!({ "id": 7 }))
            .unwrap_err();
        match err {
            SyncError::InvalidPayload { event, reason } => {
                assert_eq!(event, "font:deletion");
                assert!(reason.contains("uid"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unit_handler_ignores_payload() {
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let handler = unit_handler(move || *counter.lock().unwrap() += 1);

        handler(Value::Null);
        handler(serde_json::json!({ "anything": 1 }));

        assert_eq!(*hits.lock().unwrap(), 2);
    }

    #[test]
    fn test_channel_reply() {
        assert!(ChannelReply::Accepted.is_accepted());
        assert!(!ChannelReply::Rejected("nope".into()).is_accepted());
    }
}
