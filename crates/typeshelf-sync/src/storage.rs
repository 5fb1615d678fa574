//! # Font Storage
//!
//! Reconciles the catalog with what is installed on this machine, and
//! decides when the outcome of each installer call is reported.
//!
//! ## Reconciliation Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Reconciliation Rules                               │
//! │                                                                         │
//! │  Collection event          Installer call(s)          Report            │
//! │  ────────────────          ─────────────────          ──────            │
//! │  FontAdded                 install(Process)           unless Noop       │
//! │  ActivationChanged(true)   install(User)              unless Noop       │
//! │  ActivationChanged(false)  uninstall(User)            unless Noop       │
//! │  FontRemoved               uninstall(User)            Failure → stop    │
//! │                            uninstall(Process)         unless Noop       │
//! │                                                                         │
//! │  Every call runs on the ProcessingAgent (at most N in flight).         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Report Gate
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Report Gate                                    │
//! │                                                                         │
//! │   IDLE (closed)                      SYNCHRONIZING (open)               │
//! │   ─────────────                      ────────────────────               │
//! │   report ──► pending queue           report ──► published now           │
//! │                                                                         │
//! │   begin_synchronization()   closed ──► open, drain queue in order      │
//! │                             (new reports queue behind the drain)       │
//! │   end/abort_synchronization()  open ──► closed                          │
//! │   synchronize_with_system() drain queue, gate unchanged                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! While the catalog is being refreshed the gate is closed, so the server
//! receives the outcome of the refresh only after the `ready`
//! acknowledgement.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use typeshelf_core::{
    CollectionEvent, EventPublisher, Family, FamilyCollection, Font, FontDescription,
    SubscriptionId,
};
use typeshelf_installer::{FontApiResult, FontInstaller, InstallationScope};

use crate::config::StorageSettings;
use crate::error::{SyncError, SyncResult};
use crate::processing::ProcessingAgent;

// =============================================================================
// Reports
// =============================================================================

/// Which installer operation a report is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Installation,
    Uninstallation,
}

/// Outcome of one installer call, on its way to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageReport {
    pub uid: String,
    pub scope: InstallationScope,
    pub kind: ReportKind,
    pub success: bool,
}

// =============================================================================
// Font Loader
// =============================================================================

/// Fetches the bytes of a font before it is installed.
#[async_trait]
pub trait FontLoader: Send + Sync {
    async fn load(&self, font: &Font) -> SyncResult<Vec<u8>>;
}

// =============================================================================
// Font Storage
// =============================================================================

#[derive(Default)]
struct Gate {
    synchronizing: bool,
    /// Set while buffered reports are being delivered outside the lock.
    draining: bool,
    pending: VecDeque<StorageReport>,
}

struct StorageInner {
    collection: Arc<FamilyCollection>,
    installer: Arc<dyn FontInstaller>,
    loader: Arc<dyn FontLoader>,
    agent: ProcessingAgent,
    download_timeout: Duration,

    gate: Mutex<Gate>,
    reports: EventPublisher<StorageReport>,

    has_changed: AtomicBool,
    last_catalog_update: RwLock<Option<DateTime<Utc>>>,
    last_font_status_update: RwLock<Option<DateTime<Utc>>>,

    collection_link: Mutex<Option<SubscriptionId>>,
}

/// The reconciliation engine.
///
/// Cheap to clone; all clones share the same catalog, gate and queue.
#[derive(Clone)]
pub struct FontStorage {
    inner: Arc<StorageInner>,
}

impl FontStorage {
    /// Creates a storage over `collection` and starts listening to it.
    pub fn new(
        collection: Arc<FamilyCollection>,
        installer: Arc<dyn FontInstaller>,
        loader: Arc<dyn FontLoader>,
        settings: &StorageSettings,
    ) -> Self {
        let inner = Arc::new(StorageInner {
            collection,
            installer,
            loader,
            agent: ProcessingAgent::new(settings.download_parallelism),
            download_timeout: Duration::from_secs(settings.download_timeout_secs),
            gate: Mutex::new(Gate::default()),
            reports: EventPublisher::new(),
            has_changed: AtomicBool::new(false),
            last_catalog_update: RwLock::new(None),
            last_font_status_update: RwLock::new(None),
            collection_link: Mutex::new(None),
        });

        let weak: Weak<StorageInner> = Arc::downgrade(&inner);
        let link = inner.collection.events().subscribe(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_collection_event(event);
            }
        });
        *inner
            .collection_link
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(link);

        FontStorage { inner }
    }

    pub fn collection(&self) -> &Arc<FamilyCollection> {
        &self.inner.collection
    }

    pub fn installer(&self) -> &Arc<dyn FontInstaller> {
        &self.inner.installer
    }

    /// Reports released by the gate.
    pub fn reports(&self) -> &EventPublisher<StorageReport> {
        &self.inner.reports
    }

    // =========================================================================
    // Catalog Operations
    // =========================================================================

    /// Adds a font from its description. Returns the existing font when the
    /// uid is already known.
    pub fn add_font(&self, description: &FontDescription) -> SyncResult<Arc<Font>> {
        let font = Arc::new(Font::from_description(description)?);
        Ok(self.inner.collection.add_font(font))
    }

    pub fn remove_font(&self, uid: &str) -> Option<Arc<Font>> {
        self.inner.collection.remove_font(uid)
    }

    /// Marks a font activated. Returns false if the font is unknown.
    pub fn activate_font(&self, uid: &str) -> bool {
        self.set_activation(uid, true)
    }

    /// Marks a font deactivated. Returns false if the font is unknown.
    pub fn deactivate_font(&self, uid: &str) -> bool {
        self.set_activation(uid, false)
    }

    fn set_activation(&self, uid: &str, activated: bool) -> bool {
        let Some(font) = self.inner.collection.find_font(uid) else {
            warn!(uid = %uid, activated, "Activation change for unknown font");
            return false;
        };
        font.set_activated(activated);
        *self
            .inner
            .last_font_status_update
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        true
    }

    pub fn find_font(&self, uid: &str) -> Option<Arc<Font>> {
        self.inner.collection.find_font(uid)
    }

    /// Families with at least one activated font.
    pub fn activated_families(&self) -> Vec<Arc<Family>> {
        self.inner
            .collection
            .filtered(|family| family.has_activated_font())
    }

    /// Families with at least one font flagged as new.
    pub fn new_families(&self) -> Vec<Arc<Family>> {
        self.inner.collection.filtered(|family| family.has_new_font())
    }

    /// Removes every font (releasing its installations), then clears the
    /// collection.
    pub fn clear(&self) {
        let uids: Vec<String> = self
            .inner
            .collection
            .families()
            .iter()
            .flat_map(|family| family.fonts())
            .map(|font| font.uid().to_string())
            .collect();
        for uid in uids {
            self.inner.collection.remove_font(&uid);
        }
        self.inner.collection.clear();
    }

    // =========================================================================
    // Change Tracking
    // =========================================================================

    /// True when an installer call happened since the last save.
    pub fn has_changed(&self) -> bool {
        self.inner.has_changed.load(Ordering::SeqCst)
    }

    pub fn mark_saved(&self) {
        self.inner.has_changed.store(false, Ordering::SeqCst);
    }

    pub fn last_catalog_update(&self) -> Option<DateTime<Utc>> {
        *self
            .inner
            .last_catalog_update
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_last_catalog_update(&self, at: DateTime<Utc>) {
        *self
            .inner
            .last_catalog_update
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(at);
    }

    pub fn last_font_status_update(&self) -> Option<DateTime<Utc>> {
        *self
            .inner
            .last_font_status_update
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Report Gate
    // =========================================================================

    /// Opens the gate and delivers buffered reports in arrival order.
    pub fn begin_synchronization(&self) {
        self.inner.gate().synchronizing = true;
        let delivered = self.inner.flush();
        debug!(count = delivered, "Synchronization started");
    }

    /// Closes the gate. Later reports are buffered.
    pub fn end_synchronization(&self) {
        self.inner.gate().synchronizing = false;
        debug!("Synchronization ended");
    }

    /// Closes the gate after an interrupted refresh. Buffered reports are kept.
    pub fn abort_synchronization(&self) {
        let pending = {
            let mut gate = self.inner.gate();
            gate.synchronizing = false;
            gate.pending.len()
        };
        info!(pending, "Synchronization aborted");
    }

    /// Delivers buffered reports now, whatever the gate position.
    pub fn synchronize_with_system(&self) {
        let delivered = self.inner.flush();
        debug!(count = delivered, "Forced report delivery");
    }

    pub fn is_synchronizing(&self) -> bool {
        self.inner.gate().synchronizing
    }

    /// Number of reports held by the closed gate.
    pub fn pending_reports(&self) -> usize {
        self.inner.gate().pending.len()
    }

    /// Resolves once every queued installer call has completed.
    pub async fn wait_idle(&self) {
        self.inner.agent.wait_idle().await;
    }
}

impl std::fmt::Debug for FontStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontStorage")
            .field("collection", &self.inner.collection)
            .field("agent", &self.inner.agent)
            .field("synchronizing", &self.is_synchronizing())
            .field("has_changed", &self.has_changed())
            .finish()
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

impl StorageInner {
    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_collection_event(self: Arc<Self>, event: &CollectionEvent) {
        match event {
            CollectionEvent::FontAdded { font, .. } => {
                let font = font.clone();
                let inner = self.clone();
                self.agent
                    .enqueue(async move { inner.install(font, InstallationScope::Process).await });
            }
            CollectionEvent::ActivationChanged {
                font, activated, ..
            } => {
                let font = font.clone();
                let inner = self.clone();
                if *activated {
                    self.agent
                        .enqueue(async move { inner.install(font, InstallationScope::User).await });
                } else {
                    self.agent.enqueue(async move {
                        inner.uninstall(font, InstallationScope::User).await
                    });
                }
            }
            CollectionEvent::FontRemoved { font, .. } => {
                let font = font.clone();
                let inner = self.clone();
                self.agent.enqueue(async move { inner.release(font).await });
            }
            CollectionEvent::Cleared
            | CollectionEvent::FamilyAdded(_)
            | CollectionEvent::FamilyRemoved(_) => {}
        }
    }

    async fn install(&self, font: Arc<Font>, scope: InstallationScope) {
        if self.installer.installation_scope(font.uid()).contains(scope) {
            debug!(uid = %font.uid(), %scope, "Font already installed");
            return;
        }

        let data = match self.download(&font).await {
            Ok(data) => data,
            Err(err) => {
                warn!(
                    uid = %font.uid(),
                    error = %err,
                    retryable = err.is_retryable(),
                    "Font download failed"
                );
                self.complete(&font, scope, ReportKind::Installation, FontApiResult::Failure);
                return;
            }
        };

        self.has_changed.store(true, Ordering::SeqCst);
        let result = self.installer.install(font.uid(), scope, data).await;
        self.complete(&font, scope, ReportKind::Installation, result);
    }

    async fn download(&self, font: &Font) -> SyncResult<Vec<u8>> {
        tokio::time::timeout(self.download_timeout, self.loader.load(font))
            .await
            .map_err(|_| SyncError::Timeout(self.download_timeout.as_secs()))?
    }

    async fn uninstall(&self, font: Arc<Font>, scope: InstallationScope) {
        self.has_changed.store(true, Ordering::SeqCst);
        let result = self.installer.uninstall(font.uid(), scope).await;
        self.complete(&font, scope, ReportKind::Uninstallation, result);
    }

    async fn release(&self, font: Arc<Font>) {
        self.has_changed.store(true, Ordering::SeqCst);

        let user = self.installer.uninstall(font.uid(), InstallationScope::User).await;
        if user.is_failure() {
            self.complete(&font, InstallationScope::User, ReportKind::Uninstallation, user);
            return;
        }

        let process = self
            .installer
            .uninstall(font.uid(), InstallationScope::Process)
            .await;
        self.complete(&font, InstallationScope::Process, ReportKind::Uninstallation, process);
    }

    fn complete(&self, font: &Font, scope: InstallationScope, kind: ReportKind, result: FontApiResult) {
        if result.is_noop() {
            debug!(uid = %font.uid(), %scope, ?kind, "Installer had nothing to do");
            return;
        }

        let success = result.is_success();
        match kind {
            ReportKind::Installation => font.notify_installed(success),
            ReportKind::Uninstallation => font.notify_uninstalled(success),
        }

        self.report(StorageReport {
            uid: font.uid().to_string(),
            scope,
            kind,
            success,
        });
    }

    fn report(&self, report: StorageReport) {
        let deliver_now = {
            let mut gate = self.gate();
            if gate.synchronizing && !gate.draining {
                true
            } else {
                gate.pending.push_back(report.clone());
                false
            }
        };

        if deliver_now {
            self.reports.publish(&report);
        } else {
            debug!(uid = %report.uid, kind = ?report.kind, "Report buffered");
        }
    }

    /// Publishes buffered reports in arrival order and returns how many went
    /// out.
    ///
    /// Reports arriving during the drain queue behind it and go out in the
    /// same pass while the gate is open. With the gate closed only the
    /// reports buffered at the start go out. Only one pass runs at a time.
    fn flush(&self) -> usize {
        let mut gate = self.gate();
        if gate.draining {
            return 0;
        }
        gate.draining = true;

        let mut delivered = 0;
        let mut first = true;
        loop {
            let batch: Vec<StorageReport> = if first || gate.synchronizing {
                gate.pending.drain(..).collect()
            } else {
                Vec::new()
            };
            first = false;
            if batch.is_empty() {
                gate.draining = false;
                return delivered;
            }
            drop(gate);

            delivered += batch.len();
            for report in &batch {
                self.reports.publish(report);
            }
            gate = self.gate();
        }
    }
}

impl Drop for StorageInner {
    fn drop(&mut self) {
        let link = self
            .collection_link
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(link) = link {
            self.collection.events().unsubscribe(link);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
