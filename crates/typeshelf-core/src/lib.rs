//! # typeshelf-core: Catalog Model for Typeshelf
//!
//! This crate holds the font catalog as the client sees it: fonts grouped
//! into families, and the change notifications that flow out of them.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Typeshelf Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 typeshelf-sync (Connection, Storage)             │   │
//! │  │   channel events ──► FontStorage ──► FontInstaller              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ add / remove / activate               │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ typeshelf-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐   ┌───────────┐   ┌──────────────────────┐      │   │
//! │  │   │   Font    │──►│  Family   │──►│  FamilyCollection    │      │   │
//! │  │   │  flags    │   │  fonts    │   │  families + events   │      │   │
//! │  │   └───────────┘   └───────────┘   └──────────────────────┘      │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO ASYNC                                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Wire payloads (UserData, FontDescription, FontId)
//! - [`events`] - Synchronous publish/subscribe used by every entity
//! - [`font`] - The `Font` entity and its flags
//! - [`family`] - Fonts grouped under one family name
//! - [`collection`] - The whole catalog
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use typeshelf_core::{CollectionEvent, FamilyCollection, Font, FontDescription};
//!
//! let collection = FamilyCollection::new();
//! collection.events().subscribe(|event| {
//!     if let CollectionEvent::FamilyAdded(family) = event {
//!         println!("new family: {}", family.name());
//!     }
//! });
//!
//! let description = FontDescription {
//!     uid: "f1".into(),
//!     family: "Arial".into(),
//!     style: "Regular".into(),
//!     sort_rank: 0,
//!     download_url: "https://fonts.example.com/f1".into(),
//!     preview_url: "https://fonts.example.com/f1.png".into(),
//!     family_preview_url: None,
//! };
//! let font = Arc::new(Font::from_description(&description).unwrap());
//! collection.add_font(font);
//! assert_eq!(collection.len(), 1);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod collection;
pub mod error;
pub mod events;
pub mod family;
pub mod font;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use collection::{CollectionEvent, FamilyCollection};
pub use error::{CoreError, CoreResult};
pub use events::{EventPublisher, SubscriptionId};
pub use family::{Family, FamilyEvent};
pub use font::{Font, FontEvent};
pub use types::*;
