//! # Family Collection
//!
//! The complete catalog: an insertion-ordered list of families.
//!
//! ## Invariant
//! A family is present **iff** it holds at least one font.
//!
//! ## Event Ordering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Collection Event Ordering                           │
//! │                                                                         │
//! │  add_font(first font of "Arial")                                       │
//! │     1. FamilyAdded(Arial)                                              │
//! │     2. FontAdded { Arial, f1 }                                         │
//! │                                                                         │
//! │  add_font(second font of "Arial")                                      │
//! │     1. FontAdded { Arial, f2 }                                         │
//! │                                                                         │
//! │  remove_font(last font of "Arial")                                     │
//! │     1. FontRemoved { Arial, f2 }                                       │
//! │     2. FamilyRemoved(Arial)                                            │
//! │                                                                         │
//! │  Font.set_activated(v) on a member font                                │
//! │     Font ──► Family::ActivationChanged ──► ActivationChanged (same v)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This is the single notification surface storage listens to.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};

use crate::events::{EventPublisher, SubscriptionId};
use crate::family::{Family, FamilyEvent};
use crate::font::Font;

// =============================================================================
// Collection Event
// =============================================================================

/// Notifications fired by the [`FamilyCollection`].
#[derive(Debug, Clone)]
pub enum CollectionEvent {
    Cleared,
    FamilyAdded(Arc<Family>),
    FamilyRemoved(Arc<Family>),
    FontAdded { family: Arc<Family>, font: Arc<Font> },
    FontRemoved { family: Arc<Family>, font: Arc<Font> },
    ActivationChanged {
        family: Arc<Family>,
        font: Arc<Font>,
        activated: bool,
    },
}

// =============================================================================
// Family Collection
// =============================================================================

/// The catalog of families the user is entitled to.
pub struct FamilyCollection {
    families: RwLock<Vec<Arc<Family>>>,
    family_links: Mutex<HashMap<String, SubscriptionId>>,
    events: Arc<EventPublisher<CollectionEvent>>,
}

impl FamilyCollection {
    pub fn new() -> Self {
        FamilyCollection {
            families: RwLock::new(Vec::new()),
            family_links: Mutex::new(HashMap::new()),
            events: Arc::new(EventPublisher::new()),
        }
    }

    /// Notifications fired by the collection.
    pub fn events(&self) -> &EventPublisher<CollectionEvent> {
        &self.events
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Adds a font, creating its family on first use.
    ///
    /// A font whose uid is already in the catalog is left untouched and the
    /// existing instance is returned.
    pub fn add_font(&self, font: Arc<Font>) -> Arc<Font> {
        if let Some(existing) = self.find_font(font.uid()) {
            return existing;
        }

        let (family, created) = {
            let mut families = self.families.write().unwrap_or_else(PoisonError::into_inner);
            match families.iter().find(|f| f.name() == font.family_name()) {
                Some(family) => (family.clone(), false),
                None => {
                    let family = Arc::new(Family::new(font.family_name()));
                    self.link_family(&family);
                    families.push(family.clone());
                    (family, true)
                }
            }
        };

        if created {
            self.events.publish(&CollectionEvent::FamilyAdded(family.clone()));
        }

        family.add(font.clone());
        font
    }

    /// Removes a font by uid, dropping its family if it became empty.
    pub fn remove_font(&self, uid: &str) -> Option<Arc<Font>> {
        let family = self.find_family_by_font(uid)?;
        let font = family.remove(uid)?;

        if family.is_empty() {
            {
                let mut families =
                    self.families.write().unwrap_or_else(PoisonError::into_inner);
                families.retain(|existing| !Arc::ptr_eq(existing, &family));
            }
            self.unlink_family(&family);
            self.events
                .publish(&CollectionEvent::FamilyRemoved(family.clone()));
        }

        Some(font)
    }

    /// Drops every family and fires `Cleared`.
    pub fn clear(&self) {
        let dropped: Vec<Arc<Family>> = {
            let mut families = self.families.write().unwrap_or_else(PoisonError::into_inner);
            families.drain(..).collect()
        };
        for family in &dropped {
            self.unlink_family(family);
        }
        self.events.publish(&CollectionEvent::Cleared);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Families in insertion order.
    pub fn families(&self) -> Vec<Arc<Family>> {
        self.read().clone()
    }

    /// Families matching `predicate`, in insertion order.
    pub fn filtered<P>(&self, predicate: P) -> Vec<Arc<Family>>
    where
        P: Fn(&Family) -> bool,
    {
        self.read()
            .iter()
            .filter(|family| predicate(family))
            .cloned()
            .collect()
    }

    pub fn find_font(&self, uid: &str) -> Option<Arc<Font>> {
        self.read().iter().find_map(|family| family.find_font(uid))
    }

    pub fn find_family(&self, name: &str) -> Option<Arc<Family>> {
        self.read().iter().find(|family| family.name() == name).cloned()
    }

    pub fn find_family_by_font(&self, uid: &str) -> Option<Arc<Family>> {
        self.read()
            .iter()
            .find(|family| family.find_font(uid).is_some())
            .cloned()
    }

    /// Number of families.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Number of fonts across all families.
    pub fn font_count(&self) -> usize {
        self.read().iter().map(|family| family.len()).sum()
    }

    // =========================================================================
    // Event Relaying
    // =========================================================================

    fn link_family(&self, family: &Arc<Family>) {
        let publisher = self.events.clone();
        let weak_family = Arc::downgrade(family);
        let link = family.events().subscribe(move |event| {
            let Some(family) = weak_family.upgrade() else {
                return;
            };
            let relayed = match event {
                FamilyEvent::FontAdded { font, .. } => CollectionEvent::FontAdded {
                    family,
                    font: font.clone(),
                },
                FamilyEvent::FontRemoved { font, .. } => CollectionEvent::FontRemoved {
                    family,
                    font: font.clone(),
                },
                FamilyEvent::ActivationChanged {
                    font, activated, ..
                } => CollectionEvent::ActivationChanged {
                    family,
                    font: font.clone(),
                    activated: *activated,
                },
            };
            publisher.publish(&relayed);
        });
        self.links().insert(family.name().to_string(), link);
    }

    fn unlink_family(&self, family: &Family) {
        if let Some(link) = self.links().remove(family.name()) {
            family.events().unsubscribe(link);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<Family>>> {
        self.families.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn links(&self) -> MutexGuard<'_, HashMap<String, SubscriptionId>> {
        self.family_links.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FamilyCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FamilyCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FamilyCollection")
            .field("families", &self.len())
            .field("fonts", &self.font_count())
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
