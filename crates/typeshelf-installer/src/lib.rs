//! # typeshelf-installer: Font Installation for Typeshelf
//!
//! This crate defines the **Font Installer** capability the sync core drives,
//! and a registry-backed implementation of it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Typeshelf Installation Flow                        │
//! │                                                                         │
//! │  FontStorage (typeshelf-sync)                                          │
//! │       │ install(uid, scope, bytes) / uninstall(uid, scope)             │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               typeshelf-installer (THIS CRATE)                  │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────────────┐        ┌──────────────────────────────┐  │   │
//! │  │   │  FontInstaller  │◄───────│   RegistryFontInstaller      │  │   │
//! │  │   │  (trait)        │        │   uid → handle  (process)    │  │   │
//! │  │   │                 │        │   uid → path    (user)       │  │   │
//! │  │   └─────────────────┘        └──────────────┬───────────────┘  │   │
//! │  │                                             │                  │   │
//! │  └─────────────────────────────────────────────┼──────────────────┘   │
//! │                                                ▼                        │
//! │                                  FontSystem (native font API)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`installer`] - `FontInstaller` trait, `InstallationScope`, `FontApiResult`
//! - [`registry`] - `RegistryFontInstaller` and the `FontSystem` backend trait
//! - [`error`] - Installer error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use typeshelf_installer::{FontInstaller, InstallationScope, RegistryFontInstaller};
//!
//! let installer = RegistryFontInstaller::new(NativeFontSystem::default(), font_dir);
//! let result = installer.install("f1", InstallationScope::Process, bytes).await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod installer;
pub mod registry;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{InstallerError, InstallerResult};
pub use installer::{FontApiResult, FontInstaller, InstallationScope};
pub use registry::{FontSystem, RegistryFontInstaller};
