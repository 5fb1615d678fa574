//! Test doubles for the transport, installer and loader.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use typeshelf_core::{Font, FontDescription, UserData};
use typeshelf_installer::{FontApiResult, FontInstaller, InstallationScope};

use crate::error::{SyncError, SyncResult};
use crate::storage::FontLoader;
use crate::transport::{
    Authentication, BroadcastChannel, ChannelReply, ChannelTransport, EventHandler, TransportEvent,
};

pub fn description(uid: &str, family: &str, style: &str) -> FontDescription {
    FontDescription {
        uid: uid.to_string(),
        family: family.to_string(),
        style: style.to_string(),
        sort_rank: 0,
        download_url: format!("https://fonts.example.com/{}", uid),
        preview_url: format!("https://fonts.example.com/{}.png", uid),
        family_preview_url: None,
    }
}

pub fn user_data() -> UserData {
    UserData {
        uid: "42".into(),
        auth_token: "token-42".into(),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: "ada@example.com".into(),
        account_url: None,
        support_url: None,
    }
}

/// Polls `condition` until it holds, panicking after five seconds.
pub async fn eventually<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

// =============================================================================
// Mock Channel
// =============================================================================

pub struct MockChannel {
    topic: String,
    handlers: Mutex<HashMap<String, EventHandler>>,
    sent: Mutex<Vec<(String, Option<Value>)>>,
    joins: AtomicUsize,
    leaves: AtomicUsize,
    join_reply: Mutex<ChannelReply>,
}

impl MockChannel {
    fn new(topic: &str) -> Self {
        MockChannel {
            topic: topic.to_string(),
            handlers: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            joins: AtomicUsize::new(0),
            leaves: AtomicUsize::new(0),
            join_reply: Mutex::new(ChannelReply::Accepted),
        }
    }

    /// Simulates an inbound server event.
    pub fn deliver(&self, event: &str, payload: Value) {
        let handler = self.handlers.lock().unwrap().get(event).cloned();
        if let Some(handler) = handler {
            handler(payload);
        }
    }

    pub fn reject_joins(&self, reason: &str) {
        *self.join_reply.lock().unwrap() = ChannelReply::Rejected(reason.to_string());
    }

    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub fn leaves(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(String, Option<Value>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_events(&self) -> Vec<String> {
        self.sent().into_iter().map(|(event, _)| event).collect()
    }

    pub fn has_handler(&self, event: &str) -> bool {
        self.handlers.lock().unwrap().contains_key(event)
    }
}

#[async_trait]
impl BroadcastChannel for MockChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn join(&self) -> SyncResult<ChannelReply> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        Ok(self.join_reply.lock().unwrap().clone())
    }

    async fn leave(&self) -> SyncResult<ChannelReply> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        Ok(ChannelReply::Accepted)
    }

    fn on(&self, event: &str, handler: EventHandler) {
        self.handlers.lock().unwrap().insert(event.to_string(), handler);
    }

    fn off(&self, event: &str) {
        self.handlers.lock().unwrap().remove(event);
    }

    async fn send(&self, event: &str, payload: Option<Value>) -> SyncResult<()> {
        self.sent.lock().unwrap().push((event.to_string(), payload));
        Ok(())
    }
}

// =============================================================================
// Mock Transport
// =============================================================================

enum AuthScript {
    Grant(UserData),
    Reject(String),
    Fail,
}

pub struct MockTransport {
    channels: Mutex<HashMap<String, Arc<MockChannel>>>,
    events: broadcast::Sender<TransportEvent>,
    token: Mutex<Option<String>>,
    auth: Mutex<AuthScript>,
    authentications: AtomicUsize,
    opens: AtomicUsize,
    failing_opens: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        MockTransport {
            channels: Mutex::new(HashMap::new()),
            events,
            token: Mutex::new(None),
            auth: Mutex::new(AuthScript::Grant(user_data())),
            authentications: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            failing_opens: AtomicUsize::new(0),
        }
    }

    /// The channel `channel(topic)` hands out.
    pub fn mock_channel(&self, topic: &str) -> Arc<MockChannel> {
        self.channels
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(MockChannel::new(topic)))
            .clone()
    }

    pub fn reject_credentials(&self, reason: &str) {
        *self.auth.lock().unwrap() = AuthScript::Reject(reason.to_string());
    }

    pub fn fail_authentication(&self) {
        *self.auth.lock().unwrap() = AuthScript::Fail;
    }

    pub fn fail_next_opens(&self, count: usize) {
        self.failing_opens.store(count, Ordering::SeqCst);
    }

    /// Simulates a lifecycle signal from the wire.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn authentications(&self) -> usize {
        self.authentications.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelTransport for MockTransport {
    async fn open(&self) -> SyncResult<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_opens.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_opens.store(failing - 1, Ordering::SeqCst);
            return Err(SyncError::ConnectionFailed("unreachable".into()));
        }
        self.emit(TransportEvent::Opened);
        Ok(())
    }

    fn channel(&self, topic: &str) -> Arc<dyn BroadcastChannel> {
        self.mock_channel(topic)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    fn set_auth_token(&self, token: &str) {
        *self.token.lock().unwrap() = Some(token.to_string());
    }

    fn auth_token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    async fn authenticate(&self, _email: &str, _password: &str) -> SyncResult<Authentication> {
        self.authentications.fetch_add(1, Ordering::SeqCst);
        match &*self.auth.lock().unwrap() {
            AuthScript::Grant(user) => Ok(Authentication::Granted(user.clone())),
            AuthScript::Reject(reason) => Ok(Authentication::Rejected(reason.clone())),
            AuthScript::Fail => Err(SyncError::ConnectionFailed("auth endpoint down".into())),
        }
    }
}

// =============================================================================
// Mock Installer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstallerCall {
    Install(String, InstallationScope),
    Uninstall(String, InstallationScope),
}

/// Installer that tracks scopes in memory. Scripted results win over the
/// tracked state.
pub struct MockInstaller {
    calls: Mutex<Vec<InstallerCall>>,
    scripted: Mutex<HashMap<InstallerCall, FontApiResult>>,
    installed: Mutex<HashSet<(String, InstallationScope)>>,
}

impl MockInstaller {
    pub fn new() -> Self {
        MockInstaller {
            calls: Mutex::new(Vec::new()),
            scripted: Mutex::new(HashMap::new()),
            installed: Mutex::new(HashSet::new()),
        }
    }

    pub fn script_install(&self, uid: &str, scope: InstallationScope, result: FontApiResult) {
        self.scripted
            .lock()
            .unwrap()
            .insert(InstallerCall::Install(uid.to_string(), scope), result);
    }

    pub fn script_uninstall(&self, uid: &str, scope: InstallationScope, result: FontApiResult) {
        self.scripted
            .lock()
            .unwrap()
            .insert(InstallerCall::Uninstall(uid.to_string(), scope), result);
    }

    pub fn calls(&self) -> Vec<InstallerCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FontInstaller for MockInstaller {
    fn installation_scope(&self, uid: &str) -> InstallationScope {
        let installed = self.installed.lock().unwrap();
        InstallationScope::from_flags(
            installed.contains(&(uid.to_string(), InstallationScope::Process)),
            installed.contains(&(uid.to_string(), InstallationScope::User)),
        )
    }

    async fn install(&self, uid: &str, scope: InstallationScope, _data: Vec<u8>) -> FontApiResult {
        let call = InstallerCall::Install(uid.to_string(), scope);
        self.calls.lock().unwrap().push(call.clone());
        if let Some(result) = self.scripted.lock().unwrap().get(&call) {
            return *result;
        }
        if self.installed.lock().unwrap().insert((uid.to_string(), scope)) {
            FontApiResult::Success
        } else {
            FontApiResult::Noop
        }
    }

    async fn uninstall(&self, uid: &str, scope: InstallationScope) -> FontApiResult {
        let call = InstallerCall::Uninstall(uid.to_string(), scope);
        self.calls.lock().unwrap().push(call.clone());
        if let Some(result) = self.scripted.lock().unwrap().get(&call) {
            return *result;
        }
        if self.installed.lock().unwrap().remove(&(uid.to_string(), scope)) {
            FontApiResult::Success
        } else {
            FontApiResult::Noop
        }
    }
}

// =============================================================================
// Mock Loader
// =============================================================================

pub struct MockLoader {
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl MockLoader {
    pub fn new() -> Self {
        MockLoader {
            failing: Mutex::new(HashSet::new()),
            delay: Mutex::new(None),
        }
    }

    pub fn fail(&self, uid: &str) {
        self.failing.lock().unwrap().insert(uid.to_string());
    }

    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl FontLoader for MockLoader {
    async fn load(&self, font: &Font) -> SyncResult<Vec<u8>> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(font.uid()) {
            return Err(SyncError::LoadFailed {
                uid: font.uid().to_string(),
                reason: "404".into(),
            });
        }
        Ok(b"font-bytes".to_vec())
    }
}
