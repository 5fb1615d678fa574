//! # Wire Types
//!
//! Payloads exchanged with the catalog service.
//!
//! ## Payload Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Wire Payloads                                  │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────┐   ┌─────────────────┐      │
//! │  │    UserData     │   │ FontDescription  │   │     FontId      │      │
//! │  │  ─────────────  │   │  ──────────────  │   │  ─────────────  │      │
//! │  │  uid            │   │  uid             │   │  uid            │      │
//! │  │  auth_token     │   │  family / style  │   └─────────────────┘      │
//! │  │  names / email  │   │  sort_rank       │                            │
//! │  │  service URLs   │   │  three URLs      │   ┌─────────────────┐      │
//! │  └─────────────────┘   └──────────────────┘   │   Disconnect    │      │
//! │   sign-in response      catalog channel       │  reason         │      │
//! │                                               └─────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! These values only live at the deserialization boundary. `FontDescription`
//! becomes a [`crate::Font`] as soon as it reaches storage.

use serde::{Deserialize, Serialize};

// =============================================================================
// User Data
// =============================================================================

/// Identity returned by a successful sign-in.
///
/// Immutable once received; the connection keeps it for the whole session,
/// including across transport reconnections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    /// Unique user identifier, used to build the `users:<uid>` topic.
    pub uid: String,

    /// Token the transport presents on every (re)connection.
    pub auth_token: String,

    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,

    #[serde(default)]
    pub email: String,

    /// Account management page.
    #[serde(default)]
    pub account_url: Option<String>,

    /// Support page.
    #[serde(default)]
    pub support_url: Option<String>,
}

impl UserData {
    /// Returns "First Last", falling back to the email when both are empty.
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.email.clone()
        } else {
            name.to_string()
        }
    }
}

// =============================================================================
// Font Description
// =============================================================================

/// A catalog entry as pushed on the catalog channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontDescription {
    pub uid: String,

    /// Family name; fonts sharing it are grouped together.
    pub family: String,

    /// Style label ("Regular", "Bold Italic", ...).
    pub style: String,

    /// Position of this style inside its family.
    #[serde(default)]
    pub sort_rank: i32,

    pub download_url: String,

    pub preview_url: String,

    #[serde(default)]
    pub family_preview_url: Option<String>,
}

// =============================================================================
// Small Payloads
// =============================================================================

/// Payload carrying a single font identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontId {
    pub uid: String,
}

impl FontId {
    pub fn new(uid: impl Into<String>) -> Self {
        FontId { uid: uid.into() }
    }
}

/// Payload of the outbound `disconnect` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disconnect {
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_data_deserialization_with_defaults() {
        let json = r#"{ "uid": "u-42", "auth_token": "tok" }"#;
        let user: UserData = serde_json::from_str(json).unwrap();
        assert_eq!(user.uid, "u-42");
        assert_eq!(user.auth_token, "tok");
        assert!(user.account_url.is_none());
        assert_eq!(user.display_name(), "");
    }

    #[test]
    fn test_display_name() {
        let user = UserData {
            uid: "u-1".into(),
            auth_token: "t".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            account_url: None,
            support_url: None,
        };
        assert_eq!(user.display_name(), "Ada Lovelace");

        let anonymous = UserData {
            first_name: String::new(),
            last_name: String::new(),
            ..user
        };
        assert_eq!(anonymous.display_name(), "ada@example.com");
    }

    #[test]
    fn test_font_description_optional_fields() {
        let json = r#"{
            "uid": "f1",
            "family": "Arial",
            "style": "Regular",
            "download_url": "https://fonts.example.com/f1",
            "preview_url": "https://fonts.example.com/f1.png"
        }"#;
        let desc: FontDescription = serde_json::from_str(json).unwrap();
        assert_eq!(desc.sort_rank, 0);
        assert!(desc.family_preview_url.is_none());
    }
}
