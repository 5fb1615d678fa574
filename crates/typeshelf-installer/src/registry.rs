//! # Registry Font Installer
//!
//! [`FontInstaller`] implementation that keeps its own registry of what it
//! registered, so every install can be released later.
//!
//! ## Registry Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      RegistryFontInstaller                              │
//! │                                                                         │
//! │   process: HashMap<uid, Handle>        user: HashMap<uid, PathBuf>     │
//! │   ─────────────────────────────        ───────────────────────────     │
//! │   add_memory_font(bytes) → Handle      write bytes → <dir>/<uuid>      │
//! │   remove_memory_font(Handle)           add_font_file(path)             │
//! │                                        remove_font_file(path) + delete │
//! │                                                                         │
//! │   Every successful mutation ──► broadcast_font_change()                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All backend calls are blocking, so each operation runs on tokio's
//! blocking pool while holding the registry lock. Registrations for the same
//! font therefore never interleave.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{InstallerError, InstallerResult};
use crate::installer::{FontApiResult, FontInstaller, InstallationScope};

// =============================================================================
// Font System Backend
// =============================================================================

/// The native font registration API.
///
/// Implementations wrap the platform calls; every method may block.
pub trait FontSystem: Send + Sync + 'static {
    /// Opaque registration handle for an in-memory font.
    type Handle: Send + 'static;

    /// Registers font bytes privately for this process.
    fn add_memory_font(&self, data: &[u8]) -> Option<Self::Handle>;

    /// Releases a private registration.
    fn remove_memory_font(&self, handle: &Self::Handle) -> bool;

    /// Registers a font file for the current user.
    fn add_font_file(&self, path: &Path) -> bool;

    /// Releases a user registration.
    fn remove_font_file(&self, path: &Path) -> bool;

    /// Tells other applications the set of available fonts changed.
    fn broadcast_font_change(&self);
}

// =============================================================================
// Registry Font Installer
// =============================================================================

struct Registry<H> {
    process: HashMap<String, H>,
    user: HashMap<String, PathBuf>,
}

struct Inner<S: FontSystem> {
    system: S,
    font_directory: PathBuf,
    registry: Mutex<Registry<S::Handle>>,
}

/// Installer backed by a [`FontSystem`] and an owned handle registry.
pub struct RegistryFontInstaller<S: FontSystem> {
    inner: Arc<Inner<S>>,
}

impl<S: FontSystem> RegistryFontInstaller<S> {
    /// Creates an installer writing user-scope fonts into `font_directory`.
    pub fn new(system: S, font_directory: impl Into<PathBuf>) -> Self {
        RegistryFontInstaller {
            inner: Arc::new(Inner {
                system,
                font_directory: font_directory.into(),
                registry: Mutex::new(Registry {
                    process: HashMap::new(),
                    user: HashMap::new(),
                }),
            }),
        }
    }

    /// Creates an installer writing user-scope fonts into the system temp dir.
    pub fn with_temp_directory(system: S) -> Self {
        Self::new(system, std::env::temp_dir())
    }

    pub fn font_directory(&self) -> &Path {
        &self.inner.font_directory
    }

    /// File backing a user-scope registration, if any.
    pub fn user_font_path(&self, uid: &str) -> Option<PathBuf> {
        self.inner.lock().user.get(uid).cloned()
    }

    async fn run_blocking<F>(&self, operation: &'static str, uid: &str, f: F) -> FontApiResult
    where
        F: FnOnce(&Inner<S>) -> InstallerResult<FontApiResult> + Send + 'static,
    {
        let inner = self.inner.clone();
        let outcome = tokio::task::spawn_blocking(move || f(inner.as_ref()))
            .await
            .map_err(InstallerError::from)
            .and_then(|result| result);

        match outcome {
            Ok(result) => {
                debug!(uid = %uid, operation, ?result, "Font API call completed");
                result
            }
            Err(err) => {
                warn!(uid = %uid, operation, error = %err, "Font API call failed");
                FontApiResult::Failure
            }
        }
    }
}

impl<S: FontSystem> Inner<S> {
    fn lock(&self) -> std::sync::MutexGuard<'_, Registry<S::Handle>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scope_of(&self, uid: &str) -> InstallationScope {
        let registry = self.lock();
        InstallationScope::from_flags(
            registry.process.contains_key(uid),
            registry.user.contains_key(uid),
        )
    }

    fn install_process(&self, uid: &str, data: &[u8]) -> InstallerResult<FontApiResult> {
        let mut registry = self.lock();
        if registry.process.contains_key(uid) {
            return Ok(FontApiResult::Noop);
        }

        let handle = self
            .system
            .add_memory_font(data)
            .ok_or_else(|| InstallerError::rejected("add_memory_font", uid))?;
        registry.process.insert(uid.to_string(), handle);
        self.system.broadcast_font_change();
        Ok(FontApiResult::Success)
    }

    fn install_user(&self, uid: &str, data: &[u8]) -> InstallerResult<FontApiResult> {
        let mut registry = self.lock();
        if registry.user.contains_key(uid) {
            return Ok(FontApiResult::Noop);
        }

        let path = self.font_directory.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&self.font_directory)
            .and_then(|_| fs::write(&path, data))
            .map_err(|source| InstallerError::FileIo {
                path: path.clone(),
                source,
            })?;

        if !self.system.add_font_file(&path) {
            if let Err(err) = fs::remove_file(&path) {
                debug!(path = %path.display(), error = %err, "Failed to clean up font file");
            }
            return Err(InstallerError::rejected("add_font_file", uid));
        }

        registry.user.insert(uid.to_string(), path);
        self.system.broadcast_font_change();
        Ok(FontApiResult::Success)
    }

    fn uninstall_process(&self, uid: &str) -> InstallerResult<FontApiResult> {
        let mut registry = self.lock();
        let Some(handle) = registry.process.get(uid) else {
            return Ok(FontApiResult::Noop);
        };

        if !self.system.remove_memory_font(handle) {
            return Err(InstallerError::rejected("remove_memory_font", uid));
        }
        registry.process.remove(uid);
        self.system.broadcast_font_change();
        Ok(FontApiResult::Success)
    }

    fn uninstall_user(&self, uid: &str) -> InstallerResult<FontApiResult> {
        let mut registry = self.lock();
        let Some(path) = registry.user.get(uid).cloned() else {
            return Ok(FontApiResult::Noop);
        };

        if !self.system.remove_font_file(&path) {
            return Err(InstallerError::rejected("remove_font_file", uid));
        }
        registry.user.remove(uid);
        if let Err(err) = fs::remove_file(&path) {
            warn!(path = %path.display(), error = %err, "Released font file could not be deleted");
        }
        self.system.broadcast_font_change();
        Ok(FontApiResult::Success)
    }
}

#[async_trait]
impl<S: FontSystem> FontInstaller for RegistryFontInstaller<S> {
    fn installation_scope(&self, uid: &str) -> InstallationScope {
        self.inner.scope_of(uid)
    }

    async fn install(&self, uid: &str, scope: InstallationScope, data: Vec<u8>) -> FontApiResult {
        let owned = uid.to_string();
        match scope {
            InstallationScope::Process => {
                self.run_blocking("install_process", uid, move |inner| {
                    inner.install_process(&owned, &data)
                })
                .await
            }
            InstallationScope::User => {
                self.run_blocking("install_user", uid, move |inner| {
                    inner.install_user(&owned, &data)
                })
                .await
            }
            InstallationScope::None | InstallationScope::Both => {
                warn!(uid = %uid, %scope, "Install requested with unsupported scope");
                FontApiResult::Failure
            }
        }
    }

    async fn uninstall(&self, uid: &str, scope: InstallationScope) -> FontApiResult {
        let owned = uid.to_string();
        match scope {
            InstallationScope::Process => {
                self.run_blocking("uninstall_process", uid, move |inner| {
                    inner.uninstall_process(&owned)
                })
                .await
            }
            InstallationScope::User => {
                self.run_blocking("uninstall_user", uid, move |inner| {
                    inner.uninstall_user(&owned)
                })
                .await
            }
            InstallationScope::None | InstallationScope::Both => {
                warn!(uid = %uid, %scope, "Uninstall requested with unsupported scope");
                FontApiResult::Failure
            }
        }
    }
}

impl<S: FontSystem> std::fmt::Debug for RegistryFontInstaller<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.inner.lock();
        f.debug_struct("RegistryFontInstaller")
            .field("font_directory", &self.inner.font_directory)
            .field("process_fonts", &registry.process.len())
            .field("user_fonts", &registry.user.len())
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeFontSystem {
        next_handle: AtomicU32,
        reject: AtomicBool,
        broadcasts: AtomicUsize,
        registered_files: Mutex<Vec<PathBuf>>,
    }

    impl FontSystem for Arc<FakeFontSystem> {
        type Handle = u32;

        fn add_memory_font(&self, data: &[u8]) -> Option<u32> {
            if self.reject.load(Ordering::SeqCst) || data.is_empty() {
                return None;
            }
            Some(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1)
        }

        fn remove_memory_font(&self, _handle: &u32) -> bool {
            !self.reject.load(Ordering::SeqCst)
        }

        fn add_font_file(&self, path: &Path) -> bool {
            if self.reject.load(Ordering::SeqCst) {
                return false;
            }
            self.registered_files.lock().unwrap().push(path.to_path_buf());
            true
        }

        fn remove_font_file(&self, path: &Path) -> bool {
            if self.reject.load(Ordering::SeqCst) {
                return false;
            }
            self.registered_files.lock().unwrap().retain(|p| p != path);
            true
        }

        fn broadcast_font_change(&self) {
            self.broadcasts.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn setup() -> (Arc<FakeFontSystem>, RegistryFontInstaller<Arc<FakeFontSystem>>, PathBuf) {
        let system = Arc::new(FakeFontSystem::default());
        let dir = std::env::temp_dir().join(format!("typeshelf-test-{}", Uuid::new_v4()));
        let installer = RegistryFontInstaller::new(system.clone(), &dir);
        (system, installer, dir)
    }

    #[tokio::test]
    async fn test_process_install_is_idempotent() {
        let (system, installer, _dir) = setup();

        assert_eq!(
            installer.install("f1", InstallationScope::Process, vec![1, 2, 3]).await,
            FontApiResult::Success
        );
        assert_eq!(
            installer.install("f1", InstallationScope::Process, vec![1, 2, 3]).await,
            FontApiResult::Noop
        );
        assert_eq!(installer.installation_scope("f1"), InstallationScope::Process);
        assert_eq!(system.broadcasts.load(Ordering::SeqCst), 1);

        assert_eq!(
            installer.uninstall("f1", InstallationScope::Process).await,
            FontApiResult::Success
        );
        assert_eq!(
            installer.uninstall("f1", InstallationScope::Process).await,
            FontApiResult::Noop
        );
        assert_eq!(installer.installation_scope("f1"), InstallationScope::None);
        assert_eq!(system.broadcasts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_user_install_writes_and_releases_file() {
        let (system, installer, dir) = setup();

        assert_eq!(
            installer.install("f1", InstallationScope::User, b"font".to_vec()).await,
            FontApiResult::Success
        );
        let path = installer.user_font_path("f1").unwrap();
        assert!(path.starts_with(&dir));
        assert_eq!(fs::read(&path).unwrap(), b"font");
        assert_eq!(*system.registered_files.lock().unwrap(), vec![path.clone()]);

        assert_eq!(
            installer.uninstall("f1", InstallationScope::User).await,
            FontApiResult::Success
        );
        assert!(!path.exists());
        assert!(installer.user_font_path("f1").is_none());

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_both_scopes_reported() {
        let (_system, installer, dir) = setup();

        installer.install("f1", InstallationScope::Process, vec![1]).await;
        installer.install("f1", InstallationScope::User, vec![1]).await;
        assert_eq!(installer.installation_scope("f1"), InstallationScope::Both);

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_rejected_registration_is_failure() {
        let (system, installer, dir) = setup();
        system.reject.store(true, Ordering::SeqCst);

        assert_eq!(
            installer.install("f1", InstallationScope::Process, vec![1]).await,
            FontApiResult::Failure
        );
        assert_eq!(
            installer.install("f1", InstallationScope::User, vec![1]).await,
            FontApiResult::Failure
        );
        assert_eq!(installer.installation_scope("f1"), InstallationScope::None);
        assert_eq!(system.broadcasts.load(Ordering::SeqCst), 0);

        let leftovers = fs::read_dir(&dir).map(|entries| entries.count()).unwrap_or(0);
        assert_eq!(leftovers, 0);

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_failed_release_keeps_registration() {
        let (system, installer, _dir) = setup();
        installer.install("f1", InstallationScope::Process, vec![1]).await;

        system.reject.store(true, Ordering::SeqCst);
        assert_eq!(
            installer.uninstall("f1", InstallationScope::Process).await,
            FontApiResult::Failure
        );
        assert_eq!(installer.installation_scope("f1"), InstallationScope::Process);
    }

    #[tokio::test]
    async fn test_unsupported_scope_is_failure() {
        let (_system, installer, _dir) = setup();

        assert_eq!(
            installer.install("f1", InstallationScope::Both, vec![1]).await,
            FontApiResult::Failure
        );
        assert_eq!(
            installer.uninstall("f1", InstallationScope::None).await,
            FontApiResult::Failure
        );
    }
}
