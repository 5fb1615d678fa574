//! # Typed Channels
//!
//! Wrappers over [`BroadcastChannel`] that speak the catalog protocol.
//!
//! ## Handler Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Channel Wrapper                                 │
//! │                                                                         │
//! │  join()                                                                │
//! │    1. on(event, handler) for every inbound event                       │
//! │    2. channel.join()                                                   │
//! │                                                                         │
//! │  inbound payload ──► typed handler ──► wrapper EventPublisher          │
//! │                                          │                              │
//! │                                          ├──► Running handlers          │
//! │                                          └──► UpdatingCatalog handlers  │
//! │                                                                         │
//! │  leave()                                                               │
//! │    1. off(event) for every inbound event                               │
//! │    2. channel.leave()                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! States subscribe to the wrapper's publisher, never to the transport, so
//! entering or leaving a state does not touch channel registrations.

use std::sync::Arc;

use tracing::{debug, info};
use typeshelf_core::{Disconnect, EventPublisher, FontDescription, FontId};

use crate::error::SyncResult;
use crate::protocol;
use crate::storage::{ReportKind, StorageReport};
use crate::transport::{
    send_typed, typed_handler, unit_handler, BroadcastChannel, ChannelReply, ChannelTransport,
};

// =============================================================================
// User Channel
// =============================================================================

/// Inbound events of the user channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserChannelEvent {
    FontActivation(FontId),
    FontDeactivation(FontId),
    UpdateComplete,
}

/// The signed-in user's private channel (`users:<uid>`).
pub struct UserChannel {
    channel: Arc<dyn BroadcastChannel>,
    events: Arc<EventPublisher<UserChannelEvent>>,
}

impl UserChannel {
    pub fn new(transport: &dyn ChannelTransport, uid: &str) -> Self {
        UserChannel {
            channel: transport.channel(&protocol::user_topic(uid)),
            events: Arc::new(EventPublisher::new()),
        }
    }

    pub fn topic(&self) -> &str {
        self.channel.topic()
    }

    /// Inbound events, republished after decoding.
    pub fn events(&self) -> &EventPublisher<UserChannelEvent> {
        &self.events
    }

    pub async fn join(&self) -> SyncResult<ChannelReply> {
        let events = self.events.clone();
        self.channel.on(
            protocol::FONT_ACTIVATION,
            typed_handler(protocol::FONT_ACTIVATION, move |id: FontId| {
                events.publish(&UserChannelEvent::FontActivation(id))
            }),
        );

        let events = self.events.clone();
        self.channel.on(
            protocol::FONT_DEACTIVATION,
            typed_handler(protocol::FONT_DEACTIVATION, move |id: FontId| {
                events.publish(&UserChannelEvent::FontDeactivation(id))
            }),
        );

        let events = self.events.clone();
        self.channel.on(
            protocol::UPDATE_COMPLETE,
            unit_handler(move || events.publish(&UserChannelEvent::UpdateComplete)),
        );

        let reply = self.channel.join().await?;
        info!(topic = %self.topic(), ?reply, "Joined user channel");
        Ok(reply)
    }

    pub async fn leave(&self) -> SyncResult<ChannelReply> {
        self.channel.off(protocol::FONT_ACTIVATION);
        self.channel.off(protocol::FONT_DEACTIVATION);
        self.channel.off(protocol::UPDATE_COMPLETE);

        let reply = self.channel.leave().await?;
        info!(topic = %self.topic(), ?reply, "Left user channel");
        Ok(reply)
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    pub async fn send_disconnect(&self, reason: &str) -> SyncResult<()> {
        send_typed(
            self.channel.as_ref(),
            protocol::DISCONNECT,
            &Disconnect {
                reason: reason.to_string(),
            },
        )
        .await
    }

    /// Asks the server to push the full catalog and the activation states.
    pub async fn request_update(&self) -> SyncResult<()> {
        self.channel.send(protocol::UPDATE_REQUEST, None).await
    }

    /// Acknowledges a completed catalog update.
    pub async fn send_ready(&self) -> SyncResult<()> {
        self.channel.send(protocol::READY, None).await
    }

    pub async fn send_report(&self, report: &StorageReport) -> SyncResult<()> {
        let event = report_event(report);
        debug!(uid = %report.uid, event, "Sending font report");
        send_typed(self.channel.as_ref(), event, &FontId::new(report.uid.clone())).await
    }
}

fn report_event(report: &StorageReport) -> &'static str {
    match (report.kind, report.success) {
        (ReportKind::Installation, true) => protocol::FONT_INSTALLATION_SUCCESS,
        (ReportKind::Installation, false) => protocol::FONT_INSTALLATION_FAILURE,
        (ReportKind::Uninstallation, true) => protocol::FONT_UNINSTALLATION_SUCCESS,
        (ReportKind::Uninstallation, false) => protocol::FONT_UNINSTALLATION_FAILURE,
    }
}

// =============================================================================
// Catalog Channel
// =============================================================================

/// Inbound events of the catalog channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogChannelEvent {
    FontDescription(FontDescription),
    FontDeletion(FontId),
}

/// The shared catalog channel.
pub struct CatalogChannel {
    channel: Arc<dyn BroadcastChannel>,
    events: Arc<EventPublisher<CatalogChannelEvent>>,
}

impl CatalogChannel {
    pub fn new(transport: &dyn ChannelTransport, topic: &str) -> Self {
        CatalogChannel {
            channel: transport.channel(topic),
            events: Arc::new(EventPublisher::new()),
        }
    }

    pub fn topic(&self) -> &str {
        self.channel.topic()
    }

    pub fn events(&self) -> &EventPublisher<CatalogChannelEvent> {
        &self.events
    }

    pub async fn join(&self) -> SyncResult<ChannelReply> {
        let events = self.events.clone();
        self.channel.on(
            protocol::FONT_DESCRIPTION,
            typed_handler(protocol::FONT_DESCRIPTION, move |desc: FontDescription| {
                events.publish(&CatalogChannelEvent::FontDescription(desc))
            }),
        );

        let events = self.events.clone();
        self.channel.on(
            protocol::FONT_DELETION,
            typed_handler(protocol::FONT_DELETION, move |id: FontId| {
                events.publish(&CatalogChannelEvent::FontDeletion(id))
            }),
        );

        let reply = self.channel.join().await?;
        info!(topic = %self.topic(), ?reply, "Joined catalog channel");
        Ok(reply)
    }

    pub async fn leave(&self) -> SyncResult<ChannelReply> {
        self.channel.off(protocol::FONT_DESCRIPTION);
        self.channel.off(protocol::FONT_DELETION);

        let reply = self.channel.leave().await?;
        info!(topic = %self.topic(), ?reply, "Left catalog channel");
        Ok(reply)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use serde_json::json;
    use std::sync::Mutex;
    use typeshelf_installer::InstallationScope;

    fn recorded<E: Clone + Send + 'static>(publisher: &EventPublisher<E>) -> Arc<Mutex<Vec<E>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        publisher.subscribe(move |event: &E| sink.lock().unwrap().push(event.clone()));
        log
    }

    #[tokio::test]
    async fn test_user_channel_dispatches_after_join() {
        let transport = MockTransport::new();
        let user = UserChannel::new(&transport, "42");
        let log = recorded(user.events());
        let channel = transport.mock_channel("users:42");

        channel.deliver(protocol::FONT_ACTIVATION, json!({ "uid": "f1" }));
        assert!(log.lock().unwrap().is_empty());

        assert_eq!(user.join().await.unwrap(), ChannelReply::Accepted);
        channel.deliver(protocol::FONT_ACTIVATION, json!({ "uid": "f1" }));
        channel.deliver(protocol::FONT_DEACTIVATION, json!({ "uid": "f2" }));
        channel.deliver(protocol::UPDATE_COMPLETE, serde_json::Value::Null);
        channel.deliver(protocol::FONT_ACTIVATION, json!({ "bogus": 1 }));

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                UserChannelEvent::FontActivation(FontId::new("f1")),
                UserChannelEvent::FontDeactivation(FontId::new("f2")),
                UserChannelEvent::UpdateComplete,
            ]
        );
    }

    #[tokio::test]
    async fn test_no_handler_fires_after_leave() {
        let transport = MockTransport::new();
        let user = UserChannel::new(&transport, "42");
        let log = recorded(user.events());
        let channel = transport.mock_channel("users:42");

        user.join().await.unwrap();
        user.leave().await.unwrap();
        channel.deliver(protocol::UPDATE_COMPLETE, serde_json::Value::Null);

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(channel.joins(), 1);
        assert_eq!(channel.leaves(), 1);
    }

    #[tokio::test]
    async fn test_user_channel_outbound() {
        let transport = MockTransport::new();
        let user = UserChannel::new(&transport, "42");
        let channel = transport.mock_channel("users:42");

        user.request_update().await.unwrap();
        user.send_ready().await.unwrap();
        user.send_disconnect("logout").await.unwrap();
        user.send_report(&StorageReport {
            uid: "f1".into(),
            scope: InstallationScope::User,
            kind: ReportKind::Uninstallation,
            success: false,
        })
        .await
        .unwrap();

        assert_eq!(
            channel.sent(),
            vec![
                (protocol::UPDATE_REQUEST.to_string(), None),
                (protocol::READY.to_string(), None),
                (protocol::DISCONNECT.to_string(), Some(json!({ "reason": "logout" }))),
                (
                    protocol::FONT_UNINSTALLATION_FAILURE.to_string(),
                    Some(json!({ "uid": "f1" }))
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_catalog_channel_dispatch() {
        let transport = MockTransport::new();
        let catalog = CatalogChannel::new(&transport, "catalog");
        let log = recorded(catalog.events());
        let channel = transport.mock_channel("catalog");

        catalog.join().await.unwrap();
        channel.deliver(
            protocol::FONT_DESCRIPTION,
            json!({
                "uid": "f1",
                "family": "Arial",
                "style": "Regular",
                "download_url": "https://fonts.example.com/f1",
                "preview_url": "https://fonts.example.com/f1.png"
            }),
        );
        channel.deliver(protocol::FONT_DELETION, json!({ "uid": "f1" }));

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert!(matches!(&log[0], CatalogChannelEvent::FontDescription(d) if d.family == "Arial"));
        assert_eq!(log[1], CatalogChannelEvent::FontDeletion(FontId::new("f1")));
    }

    #[tokio::test]
    async fn test_rejected_join_is_returned() {
        let transport = MockTransport::new();
        let channel = transport.mock_channel("catalog");
        channel.reject_joins("unauthorized");

        let catalog = CatalogChannel::new(&transport, "catalog");
        assert_eq!(
            catalog.join().await.unwrap(),
            ChannelReply::Rejected("unauthorized".into())
        );
    }
}
