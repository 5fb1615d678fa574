//! # Font Installer Contract
//!
//! The capability storage uses to make a font usable on this machine.
//!
//! ## Scopes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Installation Scopes                              │
//! │                                                                         │
//! │  Process  - visible to this client only (previews, rendering)          │
//! │  User     - visible to every application of the signed-in user         │
//! │  Both     - installed at both scopes (query result only)               │
//! │  None     - not installed                                              │
//! │                                                                         │
//! │  A catalog font is installed at Process scope as soon as it arrives.   │
//! │  Activation adds User scope; deactivation removes it.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Idempotence
//! Installing an already installed font, or uninstalling one that is not
//! installed, answers [`FontApiResult::Noop`] and changes nothing.

use std::fmt;

use async_trait::async_trait;

// =============================================================================
// Installation Scope
// =============================================================================

/// Where a font is (or should be) registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallationScope {
    None,
    Process,
    User,
    Both,
}

impl InstallationScope {
    /// Combines the two per-scope flags into a single value.
    pub fn from_flags(process: bool, user: bool) -> Self {
        match (process, user) {
            (false, false) => InstallationScope::None,
            (true, false) => InstallationScope::Process,
            (false, true) => InstallationScope::User,
            (true, true) => InstallationScope::Both,
        }
    }

    /// Returns true if `self` covers every scope in `other`.
    pub fn contains(self, other: InstallationScope) -> bool {
        let (p, u) = self.flags();
        let (op, ou) = other.flags();
        (p || !op) && (u || !ou)
    }

    fn flags(self) -> (bool, bool) {
        match self {
            InstallationScope::None => (false, false),
            InstallationScope::Process => (true, false),
            InstallationScope::User => (false, true),
            InstallationScope::Both => (true, true),
        }
    }
}

impl fmt::Display for InstallationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallationScope::None => "none",
            InstallationScope::Process => "process",
            InstallationScope::User => "user",
            InstallationScope::Both => "both",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Font API Result
// =============================================================================

/// Outcome of a single install or uninstall call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontApiResult {
    /// Nothing to do; the font already was in the requested state.
    Noop,
    Success,
    Failure,
}

impl FontApiResult {
    pub fn is_noop(self) -> bool {
        self == FontApiResult::Noop
    }

    pub fn is_success(self) -> bool {
        self == FontApiResult::Success
    }

    pub fn is_failure(self) -> bool {
        self == FontApiResult::Failure
    }
}

// =============================================================================
// Font Installer Trait
// =============================================================================

/// Registers and releases fonts with the operating system.
///
/// `install` and `uninstall` only accept [`InstallationScope::Process`] or
/// [`InstallationScope::User`]; any other scope answers `Failure`.
#[async_trait]
pub trait FontInstaller: Send + Sync {
    /// Current registration scope of a font.
    fn installation_scope(&self, uid: &str) -> InstallationScope;

    /// Registers `data` for `uid` at `scope`.
    async fn install(&self, uid: &str, scope: InstallationScope, data: Vec<u8>) -> FontApiResult;

    /// Releases the registration of `uid` at `scope`.
    async fn uninstall(&self, uid: &str, scope: InstallationScope) -> FontApiResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_from_flags() {
        assert_eq!(InstallationScope::from_flags(false, false), InstallationScope::None);
        assert_eq!(InstallationScope::from_flags(true, false), InstallationScope::Process);
        assert_eq!(InstallationScope::from_flags(false, true), InstallationScope::User);
        assert_eq!(InstallationScope::from_flags(true, true), InstallationScope::Both);
    }

    #[test]
    fn test_scope_contains() {
        assert!(InstallationScope::Both.contains(InstallationScope::User));
        assert!(InstallationScope::Both.contains(InstallationScope::Process));
        assert!(InstallationScope::User.contains(InstallationScope::None));
        assert!(!InstallationScope::Process.contains(InstallationScope::User));
        assert!(!InstallationScope::None.contains(InstallationScope::Both));
    }

    #[test]
    fn test_result_predicates() {
        assert!(FontApiResult::Noop.is_noop());
        assert!(FontApiResult::Success.is_success());
        assert!(FontApiResult::Failure.is_failure());
        assert!(!FontApiResult::Noop.is_failure());
    }
}
