//! # Connection
//!
//! Owns the transport, the user session and the two typed channels, and
//! sequences sign-in, catalog refresh and reconnection.
//!
//! ## Acceptor Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Connection Architecture                          │
//! │                                                                         │
//! │  connect() / update_catalog()      state tasks       transport watcher  │
//! │          │                              │                   │           │
//! │          └──────────────┬───────────────┴───────────────────┘           │
//! │                         ▼                                               │
//! │              mpsc::unbounded<Transition>                                │
//! │                         │                                               │
//! │                         ▼                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                       Acceptor task                              │  │
//! │  │                                                                  │  │
//! │  │  1. current.can_transition_to(target)?   no ──► drop request     │  │
//! │  │  2. teardown old state (stop, or abort if unfinished)            │  │
//! │  │  3. watch::send_replace(target) + emitter.emit_state(target)     │  │
//! │  │  4. enter target: subscribe handlers, spawn its start work       │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  OBSERVATION:                                                          │
//! │  ────────────                                                          │
//! │  subscribe_state()  - watch::Receiver<ConnectionState>                 │
//! │  ConnectionEventEmitter - established / validation failure /           │
//! │                           catalog update finished / reconnecting       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the acceptor ever replaces the active state, so a state's teardown
//! always completes before the next state's start work begins.
//!
//! ## State Work
//! ```text
//! Authenticating   transport.authenticate ──► Granted: session ──► Connected
//!                                         └─► Rejected/Err: emit ──► Idle
//! Connected        join catalog + user; after Reconnecting ──► UpdatingCatalog
//! UpdatingCatalog  gate closed, data handlers on, update:request
//!                  update:complete ──► wait installer idle ──► ready
//!                  ──► gate open ──► Running
//! Running          data handlers on, emit catalog update finished
//! Reconnecting     transport.open every retry interval until Opened ──► Connected
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use typeshelf_core::{SubscriptionId, UserData};

use crate::channel::{CatalogChannel, CatalogChannelEvent, UserChannel, UserChannelEvent};
use crate::config::ConnectionSettings;
use crate::error::{SyncError, SyncResult};
use crate::state::ConnectionState;
use crate::storage::{FontStorage, StorageReport};
use crate::transport::{Authentication, ChannelReply, ChannelTransport, TransportEvent};

/// Reason sent with the `disconnect` event.
const DISCONNECT_REASON: &str = "client_disconnect";

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives connection notifications (implemented by the UI layer).
pub trait ConnectionEventEmitter: Send + Sync {
    /// The active state changed.
    fn emit_state(&self, state: ConnectionState);

    /// Sign-in succeeded and the session exists.
    fn emit_established(&self, user: &UserData);

    /// Sign-in failed with the given server or transport message.
    fn emit_validation_failure(&self, message: &str);

    /// The catalog is in sync and live updates are being applied.
    fn emit_catalog_update_finished(&self);

    /// The transport dropped and re-opening has begun.
    fn emit_reconnecting(&self);
}

/// No-op event emitter for testing and headless use.
pub struct NoOpEmitter;

impl ConnectionEventEmitter for NoOpEmitter {
    fn emit_state(&self, _state: ConnectionState) {}
    fn emit_established(&self, _user: &UserData) {}
    fn emit_validation_failure(&self, _message: &str) {}
    fn emit_catalog_update_finished(&self) {}
    fn emit_reconnecting(&self) {}
}

// =============================================================================
// Session
// =============================================================================

/// A request handed to the acceptor.
enum Transition {
    Authenticate { email: String, password: String },
    /// A catalog refresh asked for through `update_catalog`.
    Refresh,
    To(ConnectionState),
}

impl Transition {
    fn target(&self) -> ConnectionState {
        match self {
            Transition::Authenticate { .. } => ConnectionState::Authenticating,
            Transition::Refresh => ConnectionState::UpdatingCatalog,
            Transition::To(state) => *state,
        }
    }
}

#[derive(Clone)]
struct Channels {
    user: Arc<UserChannel>,
    catalog: Arc<CatalogChannel>,
}

/// Everything that exists only while signed in.
struct Session {
    user: UserData,
    channels: Channels,
    storage: FontStorage,
    report_link: SubscriptionId,
    forwarder: JoinHandle<()>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.storage.reports().unsubscribe(self.report_link);
        self.forwarder.abort();
    }
}

struct Shared {
    transport: Arc<dyn ChannelTransport>,
    storage: FontStorage,
    emitter: Arc<dyn ConnectionEventEmitter>,
    settings: ConnectionSettings,
    state: watch::Sender<ConnectionState>,
    session: RwLock<Option<Session>>,
    requests: mpsc::UnboundedSender<Transition>,
    /// Set while a `Transition::Refresh` sits in the acceptor's inbox.
    refresh_pending: AtomicBool,
    runtime: Handle,
}

impl Shared {
    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn request(&self, target: ConnectionState) {
        if self.requests.send(Transition::To(target)).is_err() {
            debug!(%target, "Acceptor gone, dropping transition");
        }
    }

    fn channels(&self) -> Option<Channels> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.channels.clone())
    }

    fn connection_retry_interval(&self) -> Duration {
        Duration::from_secs(self.settings.connection_retry_interval_secs)
    }

    /// Stores the token, builds the channels and starts forwarding reports.
    async fn establish(&self, user: UserData) {
        self.transport.set_auth_token(&user.auth_token);
        if let Err(err) = self.transport.open().await {
            warn!(error = %err, "Transport open failed after sign-in");
        }

        let channels = Channels {
            user: Arc::new(UserChannel::new(self.transport.as_ref(), &user.uid)),
            catalog: Arc::new(CatalogChannel::new(
                self.transport.as_ref(),
                &self.settings.catalog_topic,
            )),
        };

        let (report_tx, mut report_rx) = mpsc::unbounded_channel::<StorageReport>();
        let report_link = self.storage.reports().subscribe(move |report| {
            let _ = report_tx.send(report.clone());
        });
        let channel = channels.user.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(report) = report_rx.recv().await {
                if let Err(err) = channel.send_report(&report).await {
                    warn!(uid = %report.uid, error = %err, "Failed to forward font report");
                }
            }
        });

        let session = Session {
            user: user.clone(),
            channels,
            storage: self.storage.clone(),
            report_link,
            forwarder,
        };
        let previous = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(session);
        drop(previous);

        info!(uid = %user.uid, email = %user.email, "Session established");
        self.emitter.emit_established(&user);
    }
}

// =============================================================================
// Active State
// =============================================================================

enum Link {
    User(Arc<UserChannel>, SubscriptionId),
    Catalog(Arc<CatalogChannel>, SubscriptionId),
}

impl Link {
    fn release(&self) {
        match self {
            Link::User(channel, id) => {
                channel.events().unsubscribe(*id);
            }
            Link::Catalog(channel, id) => {
                channel.events().unsubscribe(*id);
            }
        }
    }
}

/// The running instance of one state: its start work and its subscriptions.
struct ActiveState {
    state: ConnectionState,
    task: Option<JoinHandle<()>>,
    links: Vec<Link>,
    /// Set by UpdatingCatalog once the gate has been reopened.
    synchronized: Option<Arc<AtomicBool>>,
}

impl ActiveState {
    fn passive(state: ConnectionState) -> Self {
        ActiveState {
            state,
            task: None,
            links: Vec::new(),
            synchronized: None,
        }
    }

    fn spawned(state: ConnectionState, task: JoinHandle<()>) -> Self {
        ActiveState {
            state,
            task: Some(task),
            links: Vec::new(),
            synchronized: None,
        }
    }

    fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Graceful teardown.
    fn stop(self) {
        debug!(state = %self.state, "Stopping state");
    }

    /// Forced teardown of a state superseded before it completed.
    fn abort(self, storage: &FontStorage) {
        let interrupted = self
            .synchronized
            .as_ref()
            .is_some_and(|done| !done.load(Ordering::SeqCst));
        if interrupted {
            storage.abort_synchronization();
        }
        debug!(state = %self.state, "Aborting state");
        self.stop();
    }

    fn retire(self, storage: &FontStorage) {
        if self.is_finished() {
            self.stop();
        } else {
            self.abort(storage);
        }
    }
}

impl Drop for ActiveState {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        for link in self.links.drain(..) {
            link.release();
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// The connection state machine.
///
/// Must be created inside a tokio runtime; its commands may then be called
/// from any thread. Dropping it stops every task it spawned.
pub struct Connection {
    shared: Arc<Shared>,
    acceptor: JoinHandle<()>,
    watcher: JoinHandle<()>,
}

impl Connection {
    /// Creates an idle connection.
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        storage: FontStorage,
        settings: ConnectionSettings,
    ) -> Self {
        Self::with_emitter(transport, storage, settings, Arc::new(NoOpEmitter))
    }

    /// Creates an idle connection with a custom event emitter.
    pub fn with_emitter(
        transport: Arc<dyn ChannelTransport>,
        storage: FontStorage,
        settings: ConnectionSettings,
        emitter: Arc<dyn ConnectionEventEmitter>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (requests, inbox) = mpsc::unbounded_channel();
        let transport_events = transport.subscribe();
        let runtime = Handle::current();

        let shared = Arc::new(Shared {
            transport,
            storage,
            emitter,
            settings,
            state,
            session: RwLock::new(None),
            requests,
            refresh_pending: AtomicBool::new(false),
            runtime: runtime.clone(),
        });

        let acceptor = runtime.spawn(accept(shared.clone(), inbox));
        let watcher = runtime.spawn(watch_transport(shared.clone(), transport_events));

        Connection {
            shared,
            acceptor,
            watcher,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.current_state()
    }

    /// Observes state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Resolves once the connection is in `state`.
    ///
    /// Transient states may be skipped by a watch receiver; prefer waiting
    /// on states the connection rests in.
    pub async fn wait_for_state(&self, state: ConnectionState) -> SyncResult<()> {
        let mut receiver = self.shared.state.subscribe();
        receiver
            .wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .map_err(|_| SyncError::ShuttingDown)
    }

    /// The signed-in user, if any.
    pub fn user(&self) -> Option<UserData> {
        self.shared
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.user.clone())
    }

    pub fn user_channel(&self) -> Option<Arc<UserChannel>> {
        self.shared.channels().map(|channels| channels.user)
    }

    pub fn catalog_channel(&self) -> Option<Arc<CatalogChannel>> {
        self.shared.channels().map(|channels| channels.catalog)
    }

    pub fn storage(&self) -> &FontStorage {
        &self.shared.storage
    }

    /// Spacing the caller should keep between sign-in attempts.
    pub fn authentication_retry_interval(&self) -> Duration {
        Duration::from_secs(self.shared.settings.authentication_retry_interval_secs)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Starts signing in. Ignored unless the connection is idle.
    pub fn connect(&self, email: &str, password: &str) {
        let current = self.state();
        if !current.can_transition_to(ConnectionState::Authenticating) {
            debug!(state = %current, "Ignoring connect");
            return;
        }

        let request = Transition::Authenticate {
            email: email.to_string(),
            password: password.to_string(),
        };
        if self.shared.requests.send(request).is_err() {
            debug!("Acceptor gone, ignoring connect");
        }
    }

    /// Starts a full catalog refresh.
    ///
    /// # Errors
    /// `InvalidTransition` when the current state does not allow a refresh,
    /// `RefreshPending` while an earlier request has not been taken up,
    /// `ShuttingDown` once the connection has been shut down.
    pub fn update_catalog(&self) -> SyncResult<()> {
        // Claimed before the state check: the acceptor releases the claim only
        // after publishing the new state.
        if self.shared.refresh_pending.swap(true, Ordering::SeqCst) {
            return Err(SyncError::RefreshPending);
        }

        let current = self.state();
        if !current.can_transition_to(ConnectionState::UpdatingCatalog) {
            self.shared.refresh_pending.store(false, Ordering::SeqCst);
            return Err(SyncError::InvalidTransition {
                action: "update catalog",
                state: current,
            });
        }

        self.shared.requests.send(Transition::Refresh).map_err(|_| {
            self.shared.refresh_pending.store(false, Ordering::SeqCst);
            SyncError::ShuttingDown
        })
    }

    /// Tells the server this client is leaving. Does not change the state.
    pub fn disconnect(&self) {
        let Some(channels) = self.shared.channels() else {
            debug!("Disconnect without a session");
            return;
        };

        info!(state = %self.state(), "Sending disconnect");
        self.shared.runtime.spawn(async move {
            if let Err(err) = channels.user.send_disconnect(DISCONNECT_REASON).await {
                warn!(error = %err, "Failed to send disconnect");
            }
        });
    }

    /// Stops the acceptor and the transport watcher. The active state is
    /// torn down with the acceptor.
    pub fn shutdown(&self) {
        info!("Shutting down connection");
        self.acceptor.abort();
        self.watcher.abort();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.acceptor.abort();
        self.watcher.abort();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("user", &self.user().map(|user| user.uid))
            .finish()
    }
}

// =============================================================================
// Acceptor
// =============================================================================

async fn accept(shared: Arc<Shared>, mut inbox: mpsc::UnboundedReceiver<Transition>) {
    let mut active: Option<ActiveState> = None;

    while let Some(transition) = inbox.recv().await {
        let current = shared.current_state();
        let target = transition.target();
        let refresh = matches!(transition, Transition::Refresh);
        if !current.can_transition_to(target) {
            debug!(from = %current, to = %target, "Dropping stale transition");
            if refresh {
                shared.refresh_pending.store(false, Ordering::SeqCst);
            }
            continue;
        }

        if let Some(previous) = active.take() {
            previous.retire(&shared.storage);
        }

        shared.state.send_replace(target);
        if refresh {
            shared.refresh_pending.store(false, Ordering::SeqCst);
        }
        info!(from = %current, to = %target, "Connection state changed");
        shared.emitter.emit_state(target);

        active = Some(enter(&shared, current, transition));
    }
}

fn enter(shared: &Arc<Shared>, previous: ConnectionState, transition: Transition) -> ActiveState {
    match transition {
        Transition::Authenticate { email, password } => ActiveState::spawned(
            ConnectionState::Authenticating,
            tokio::spawn(authenticate(shared.clone(), email, password)),
        ),
        Transition::To(ConnectionState::Connected) => ActiveState::spawned(
            ConnectionState::Connected,
            tokio::spawn(join_channels(shared.clone(), previous)),
        ),
        Transition::Refresh | Transition::To(ConnectionState::UpdatingCatalog) => {
            enter_updating_catalog(shared)
        }
        Transition::To(ConnectionState::Running) => enter_running(shared),
        Transition::To(ConnectionState::Reconnecting) => ActiveState::spawned(
            ConnectionState::Reconnecting,
            tokio::spawn(reconnect(shared.clone())),
        ),
        Transition::To(state) => ActiveState::passive(state),
    }
}

// =============================================================================
// State Work
// =============================================================================

async fn authenticate(shared: Arc<Shared>, email: String, password: String) {
    debug!(email = %email, "Authenticating");
    let message = match shared.transport.authenticate(&email, &password).await {
        Ok(Authentication::Granted(user)) => {
            shared.establish(user).await;
            shared.request(ConnectionState::Connected);
            return;
        }
        Ok(Authentication::Rejected(reason)) => reason,
        Err(err) => err.to_string(),
    };

    warn!(email = %email, message = %message, "Sign-in failed");
    shared.emitter.emit_validation_failure(&message);
    shared.request(ConnectionState::Idle);
}

/// Returns false when the join itself failed on the wire.
fn log_join(topic: &str, result: SyncResult<ChannelReply>) -> bool {
    match result {
        Ok(ChannelReply::Accepted) => true,
        Ok(ChannelReply::Rejected(reason)) => {
            warn!(topic, reason = %reason, "Channel join rejected");
            true
        }
        Err(err) => {
            warn!(topic, error = %err, "Channel join failed");
            false
        }
    }
}

async fn join_channels(shared: Arc<Shared>, previous: ConnectionState) {
    let Some(channels) = shared.channels() else {
        error!("Connected without a session");
        return;
    };

    let catalog = channels.catalog.join().await;
    if !log_join(channels.catalog.topic(), catalog) {
        shared.request(ConnectionState::Reconnecting);
        return;
    }
    let user = channels.user.join().await;
    if !log_join(channels.user.topic(), user) {
        shared.request(ConnectionState::Reconnecting);
        return;
    }

    if previous == ConnectionState::Reconnecting && shared.settings.resync_after_reconnect {
        info!("Resynchronizing catalog after reconnect");
        shared.request(ConnectionState::UpdatingCatalog);
    }
}

/// Maps catalog and activation events onto storage.
fn subscribe_data_handlers(storage: &FontStorage, channels: &Channels) -> Vec<Link> {
    let catalog_storage = storage.clone();
    let catalog = channels.catalog.events().subscribe(move |event| match event {
        CatalogChannelEvent::FontDescription(description) => {
            if let Err(err) = catalog_storage.add_font(description) {
                warn!(uid = %description.uid, error = %err, "Dropping font description");
            }
        }
        CatalogChannelEvent::FontDeletion(id) => {
            if catalog_storage.remove_font(&id.uid).is_none() {
                debug!(uid = %id.uid, "Deletion of unknown font");
            }
        }
    });

    let user_storage = storage.clone();
    let user = channels.user.events().subscribe(move |event| match event {
        UserChannelEvent::FontActivation(id) => {
            user_storage.activate_font(&id.uid);
        }
        UserChannelEvent::FontDeactivation(id) => {
            user_storage.deactivate_font(&id.uid);
        }
        UserChannelEvent::UpdateComplete => {}
    });

    vec![
        Link::Catalog(channels.catalog.clone(), catalog),
        Link::User(channels.user.clone(), user),
    ]
}

fn enter_running(shared: &Arc<Shared>) -> ActiveState {
    let mut active = ActiveState::passive(ConnectionState::Running);
    match shared.channels() {
        Some(channels) => active.links = subscribe_data_handlers(&shared.storage, &channels),
        None => error!("Running without a session"),
    }
    shared.emitter.emit_catalog_update_finished();
    active
}

fn enter_updating_catalog(shared: &Arc<Shared>) -> ActiveState {
    let Some(channels) = shared.channels() else {
        error!("Catalog update without a session");
        return ActiveState::passive(ConnectionState::UpdatingCatalog);
    };

    shared.storage.end_synchronization();
    let mut links = subscribe_data_handlers(&shared.storage, &channels);

    let complete = Arc::new(Notify::new());
    let signal = complete.clone();
    let id = channels.user.events().subscribe(move |event| {
        if *event == UserChannelEvent::UpdateComplete {
            signal.notify_one();
        }
    });
    links.push(Link::User(channels.user.clone(), id));

    let synchronized = Arc::new(AtomicBool::new(false));
    let task = tokio::spawn(refresh_catalog(
        shared.clone(),
        channels.user,
        complete,
        synchronized.clone(),
    ));

    ActiveState {
        state: ConnectionState::UpdatingCatalog,
        task: Some(task),
        links,
        synchronized: Some(synchronized),
    }
}

async fn refresh_catalog(
    shared: Arc<Shared>,
    user: Arc<UserChannel>,
    complete: Arc<Notify>,
    synchronized: Arc<AtomicBool>,
) {
    if let Err(err) = user.request_update().await {
        warn!(error = %err, "Failed to request catalog update");
    }

    complete.notified().await;
    debug!("Catalog received, waiting for installer work");
    shared.storage.wait_idle().await;

    if let Err(err) = user.send_ready().await {
        warn!(error = %err, "Failed to acknowledge catalog update");
    }
    synchronized.store(true, Ordering::SeqCst);
    shared.storage.begin_synchronization();
    shared.storage.set_last_catalog_update(Utc::now());

    info!(fonts = shared.storage.collection().font_count(), "Catalog update finished");
    shared.request(ConnectionState::Running);
}

/// Resolves true on `Opened`, false once the event stream is gone.
async fn wait_opened(events: &mut broadcast::Receiver<TransportEvent>) -> bool {
    loop {
        match events.recv().await {
            Ok(TransportEvent::Opened) => return true,
            Ok(TransportEvent::Closed) => continue,
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Transport events lagged");
            }
            Err(RecvError::Closed) => return false,
        }
    }
}

async fn reconnect(shared: Arc<Shared>) {
    let mut events = shared.transport.subscribe();
    shared.emitter.emit_reconnecting();

    let interval = shared.connection_retry_interval();
    let mut schedule = Constant::new(interval);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        debug!(attempt, "Re-opening transport");
        if let Err(err) = shared.transport.open().await {
            warn!(attempt, error = %err, "Transport re-open failed");
        }

        let delay = schedule.next_backoff().unwrap_or(interval);
        match tokio::time::timeout(delay, wait_opened(&mut events)).await {
            Ok(true) => {
                info!(attempt, "Transport re-opened");
                shared.request(ConnectionState::Connected);
                return;
            }
            Ok(false) => {
                error!("Transport event stream closed while reconnecting");
                return;
            }
            Err(_) => {
                debug!(attempt, retry_secs = delay.as_secs(), "Transport still closed");
            }
        }
    }
}

async fn watch_transport(shared: Arc<Shared>, mut events: broadcast::Receiver<TransportEvent>) {
    loop {
        match events.recv().await {
            Ok(TransportEvent::Closed) => {
                let current = shared.current_state();
                if current.can_transition_to(ConnectionState::Reconnecting) {
                    warn!(state = %current, "Transport closed");
                    shared.request(ConnectionState::Reconnecting);
                } else {
                    debug!(state = %current, "Transport closed, no reconnect from this state");
                }
            }
            Ok(TransportEvent::Opened) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Transport events lagged");
            }
            Err(RecvError::Closed) => return,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
