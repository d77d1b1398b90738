//! Directory user model and payload normalization.
//!
//! Users are created by the external identity provider; this system only
//! resolves and caches them. The directory function upstream is loosely
//! specified; [`normalize_directory`] is the single boundary that maps
//! every accepted response shape to a plain list of [`User`]s.

use serde::{Deserialize, Serialize};

/// Opaque unique identifier for a user, assigned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user identifier from its string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the last 8 characters of the identifier.
    ///
    /// Used for placeholder labels when a user cannot be resolved.
    #[must_use]
    pub fn suffix(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        let start = chars.len().saturating_sub(8);
        chars[start..].iter().collect()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directory-resolved user.
///
/// Decoding accepts both the directory function's `id` key and the
/// platform's raw `$id` key; a missing `name` falls back to the email
/// local part at display time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identity-provider-assigned identifier.
    #[serde(alias = "$id")]
    pub id: UserId,
    /// Account email address.
    pub email: String,
    /// Profile name; may be empty.
    #[serde(default)]
    pub name: String,
}

impl User {
    /// Returns the profile name, or the email local part when the profile
    /// name is blank.
    #[must_use]
    pub fn display_name(&self) -> &str {
        let name = self.name.trim();
        if name.is_empty() {
            local_part(&self.email)
        } else {
            name
        }
    }

    /// Returns the full display label, `"{name} ({email})"`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} ({})", self.display_name(), self.email)
    }
}

/// An identity-provider account record, as returned by the account API.
///
/// Superset of [`User`] carrying the verification flag the session facade
/// gates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Identity-provider-assigned identifier.
    #[serde(rename = "$id")]
    pub id: UserId,
    /// Account email address.
    pub email: String,
    /// Profile name; may be empty.
    #[serde(default)]
    pub name: String,
    /// Whether the account's email address has been verified.
    #[serde(rename = "emailVerification", default)]
    pub email_verified: bool,
}

impl Account {
    /// Returns the directory-shaped view of this account.
    #[must_use]
    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

/// A session record, as returned when a session is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session identifier.
    #[serde(rename = "$id")]
    pub id: String,
    /// Account the session belongs to.
    #[serde(rename = "userId")]
    pub user_id: UserId,
    /// Session secret, presented on subsequent requests. Only returned
    /// at creation time; empty when the platform withholds it.
    #[serde(default)]
    pub secret: String,
}

/// Deterministic label for a user id that cannot be resolved.
#[must_use]
pub fn placeholder_label(id: &UserId) -> String {
    format!("User {}", id.suffix())
}

fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Error returned when a directory payload cannot be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// Top-level payload was none of the accepted shapes.
    #[error("unrecognized directory payload shape")]
    UnrecognizedShape,
}

/// Normalizes a directory function response into a list of users.
///
/// Accepted top-level shapes, in probe order: `{"users": [...]}`,
/// a bare array, `{"data": [...]}`. Entries that fail to decode are
/// dropped; callers that care can compare lengths and log.
///
/// # Errors
///
/// Returns [`DirectoryError::UnrecognizedShape`] when the payload is
/// none of the accepted shapes.
pub fn normalize_directory(value: &serde_json::Value) -> Result<Vec<User>, DirectoryError> {
    let entries = if let Some(users) = value.get("users").and_then(serde_json::Value::as_array) {
        users
    } else if let Some(bare) = value.as_array() {
        bare
    } else if let Some(data) = value.get("data").and_then(serde_json::Value::as_array) {
        data
    } else {
        return Err(DirectoryError::UnrecognizedShape);
    };

    Ok(entries
        .iter()
        .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
        .collect())
}
