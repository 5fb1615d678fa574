//! # Font
//!
//! A single style of a family, as known to the client.
//!
//! ## Notification Kinds
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Font Notifications                               │
//! │                                                                         │
//! │  STATE CHANGES (fire only when the value actually changes)             │
//! │  ─────────────                                                         │
//! │  set_activated(v)  ──► ActivationChanged { activated }                 │
//! │  set_new(v)        ──► NewChanged { is_new }                           │
//! │                                                                         │
//! │  REQUESTS (caller intent, before any system action)                    │
//! │  ────────                                                              │
//! │  request_activation()    ──► ActivationRequested                       │
//! │  request_deactivation()  ──► DeactivationRequested                     │
//! │                                                                         │
//! │  OUTCOMES (after the installer answered)                               │
//! │  ────────                                                              │
//! │  notify_installed(ok)    ──► Installed { success }                     │
//! │  notify_uninstalled(ok)  ──► Uninstalled { success }                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use url::Url;

use crate::error::{CoreError, CoreResult};
use crate::events::EventPublisher;
use crate::types::FontDescription;

// =============================================================================
// Font Event
// =============================================================================

/// Notifications fired by a [`Font`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontEvent {
    /// The `activated` flag changed.
    ActivationChanged { activated: bool },

    /// The `is_new` flag changed.
    NewChanged { is_new: bool },

    /// A caller asked for the font to be activated.
    ActivationRequested,

    /// A caller asked for the font to be deactivated.
    DeactivationRequested,

    /// An install call completed.
    Installed { success: bool },

    /// An uninstall call completed.
    Uninstalled { success: bool },
}

// =============================================================================
// Font
// =============================================================================

/// A font the user is entitled to.
///
/// Identity and URLs are fixed at creation. The two flags and the two cache
/// paths are interior-mutable so the font can be shared as `Arc<Font>`
/// between the catalog, storage and the presentation layer.
pub struct Font {
    uid: String,
    family_name: String,
    style: String,
    sort_rank: i32,
    download_url: Url,
    preview_url: Url,
    family_preview_url: Option<Url>,

    activated: AtomicBool,
    is_new: AtomicBool,

    preview_path: RwLock<Option<PathBuf>>,
    family_preview_path: RwLock<Option<PathBuf>>,

    events: EventPublisher<FontEvent>,
}

impl Font {
    /// Builds a font from its wire description.
    ///
    /// New fonts start deactivated and flagged as new.
    pub fn from_description(description: &FontDescription) -> CoreResult<Self> {
        if description.uid.trim().is_empty() {
            return Err(CoreError::MissingIdentifier {
                field: "uid".to_string(),
            });
        }
        if description.family.trim().is_empty() {
            return Err(CoreError::MissingIdentifier {
                field: "family".to_string(),
            });
        }

        let family_preview_url = match description.family_preview_url.as_deref() {
            Some(raw) => Some(parse_url("family_preview_url", raw)?),
            None => None,
        };

        Ok(Font {
            uid: description.uid.clone(),
            family_name: description.family.clone(),
            style: description.style.clone(),
            sort_rank: description.sort_rank,
            download_url: parse_url("download_url", &description.download_url)?,
            preview_url: parse_url("preview_url", &description.preview_url)?,
            family_preview_url,
            activated: AtomicBool::new(false),
            is_new: AtomicBool::new(true),
            preview_path: RwLock::new(None),
            family_preview_path: RwLock::new(None),
            events: EventPublisher::new(),
        })
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn family_name(&self) -> &str {
        &self.family_name
    }

    pub fn style(&self) -> &str {
        &self.style
    }

    pub fn sort_rank(&self) -> i32 {
        self.sort_rank
    }

    pub fn download_url(&self) -> &Url {
        &self.download_url
    }

    pub fn preview_url(&self) -> &Url {
        &self.preview_url
    }

    pub fn family_preview_url(&self) -> Option<&Url> {
        self.family_preview_url.as_ref()
    }

    /// Notifications fired by this font.
    pub fn events(&self) -> &EventPublisher<FontEvent> {
        &self.events
    }

    // =========================================================================
    // Flags
    // =========================================================================

    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }

    /// Sets the activation flag. Fires `ActivationChanged` only on change.
    pub fn set_activated(&self, activated: bool) {
        if self.activated.swap(activated, Ordering::SeqCst) != activated {
            self.events.publish(&FontEvent::ActivationChanged { activated });
        }
    }

    pub fn is_new(&self) -> bool {
        self.is_new.load(Ordering::SeqCst)
    }

    /// Sets the "new" flag. Fires `NewChanged` only on change.
    pub fn set_new(&self, is_new: bool) {
        if self.is_new.swap(is_new, Ordering::SeqCst) != is_new {
            self.events.publish(&FontEvent::NewChanged { is_new });
        }
    }

    // =========================================================================
    // Requests & Outcomes
    // =========================================================================

    pub fn request_activation(&self) {
        self.events.publish(&FontEvent::ActivationRequested);
    }

    pub fn request_deactivation(&self) {
        self.events.publish(&FontEvent::DeactivationRequested);
    }

    pub fn notify_installed(&self, success: bool) {
        self.events.publish(&FontEvent::Installed { success });
    }

    pub fn notify_uninstalled(&self, success: bool) {
        self.events.publish(&FontEvent::Uninstalled { success });
    }

    // =========================================================================
    // Local Cache Paths
    // =========================================================================

    pub fn preview_path(&self) -> Option<PathBuf> {
        self.preview_path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_preview_path(&self, path: Option<PathBuf>) {
        *self
            .preview_path
            .write()
            .unwrap_or_else(PoisonError::into_inner) = path;
    }

    pub fn family_preview_path(&self) -> Option<PathBuf> {
        self.family_preview_path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_family_preview_path(&self, path: Option<PathBuf>) {
        *self
            .family_preview_path
            .write()
            .unwrap_or_else(PoisonError::into_inner) = path;
    }
}

impl fmt::Debug for Font {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Font")
            .field("uid", &self.uid)
            .field("family_name", &self.family_name)
            .field("style", &self.style)
            .field("sort_rank", &self.sort_rank)
            .field("activated", &self.is_activated())
            .field("is_new", &self.is_new())
            .finish()
    }
}

fn parse_url(field: &str, raw: &str) -> CoreResult<Url> {
    Url::parse(raw).map_err(|e| CoreError::InvalidUrl {
        field: field.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
