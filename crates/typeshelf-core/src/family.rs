//! # Family
//!
//! Fonts sharing a family name, in arrival order.
//!
//! A family listens to each of its fonts and re-publishes the font's
//! activation changes, together with its own add/remove notifications,
//! tagged with the family name.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::events::{EventPublisher, SubscriptionId};
use crate::font::{Font, FontEvent};

/// Notifications fired by a [`Family`].
#[derive(Debug, Clone)]
pub enum FamilyEvent {
    FontAdded { family: String, font: Arc<Font> },
    FontRemoved { family: String, font: Arc<Font> },
    ActivationChanged {
        family: String,
        font: Arc<Font>,
        activated: bool,
    },
}

impl FamilyEvent {
    /// The font this event is about.
    pub fn font(&self) -> &Arc<Font> {
        match self {
            FamilyEvent::FontAdded { font, .. }
            | FamilyEvent::FontRemoved { font, .. }
            | FamilyEvent::ActivationChanged { font, .. } => font,
        }
    }
}

/// A named group of fonts.
pub struct Family {
    name: String,
    fonts: RwLock<Vec<Arc<Font>>>,
    font_links: Mutex<HashMap<String, SubscriptionId>>,
    events: Arc<EventPublisher<FamilyEvent>>,
}

impl Family {
    pub fn new(name: impl Into<String>) -> Self {
        Family {
            name: name.into(),
            fonts: RwLock::new(Vec::new()),
            font_links: Mutex::new(HashMap::new()),
            events: Arc::new(EventPublisher::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Notifications fired by this family.
    pub fn events(&self) -> &EventPublisher<FamilyEvent> {
        &self.events
    }

    /// Adds a font and fires `FontAdded`.
    ///
    /// Returns false (and fires nothing) when a font with the same uid is
    /// already part of the family.
    pub fn add(&self, font: Arc<Font>) -> bool {
        {
            let mut fonts = self.fonts.write().unwrap_or_else(PoisonError::into_inner);
            if fonts.iter().any(|existing| existing.uid() == font.uid()) {
                return false;
            }
            fonts.push(font.clone());
        }

        let publisher = self.events.clone();
        let family = self.name.clone();
        let weak_font = Arc::downgrade(&font);
        let link = font.events().subscribe(move |event| {
            if let FontEvent::ActivationChanged { activated } = event {
                if let Some(font) = weak_font.upgrade() {
                    publisher.publish(&FamilyEvent::ActivationChanged {
                        family: family.clone(),
                        font,
                        activated: *activated,
                    });
                }
            }
        });
        self.links().insert(font.uid().to_string(), link);

        self.events.publish(&FamilyEvent::FontAdded {
            family: self.name.clone(),
            font,
        });
        true
    }

    /// Removes a font by uid and fires `FontRemoved`.
    pub fn remove(&self, uid: &str) -> Option<Arc<Font>> {
        let removed = {
            let mut fonts = self.fonts.write().unwrap_or_else(PoisonError::into_inner);
            let index = fonts.iter().position(|font| font.uid() == uid)?;
            fonts.remove(index)
        };

        if let Some(link) = self.links().remove(uid) {
            removed.events().unsubscribe(link);
        }

        self.events.publish(&FamilyEvent::FontRemoved {
            family: self.name.clone(),
            font: removed.clone(),
        });
        Some(removed)
    }

    pub fn find_font(&self, uid: &str) -> Option<Arc<Font>> {
        self.read().iter().find(|font| font.uid() == uid).cloned()
    }

    /// Fonts in arrival order.
    pub fn fonts(&self) -> Vec<Arc<Font>> {
        self.read().clone()
    }

    /// Fonts ordered by sort rank (stable for equal ranks).
    pub fn sorted_fonts(&self) -> Vec<Arc<Font>> {
        let mut fonts = self.fonts();
        fonts.sort_by_key(|font| font.sort_rank());
        fonts
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn has_activated_font(&self) -> bool {
        self.read().iter().any(|font| font.is_activated())
    }

    pub fn has_new_font(&self) -> bool {
        self.read().iter().any(|font| font.is_new())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<Font>>> {
        self.fonts.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn links(&self) -> std::sync::MutexGuard<'_, HashMap<String, SubscriptionId>> {
        self.font_links.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Family")
            .field("name", &self.name)
            .field("fonts", &self.len())
            .finish()
    }
}
