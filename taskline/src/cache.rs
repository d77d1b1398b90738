//! Persisted local state: the users cache and the saved session.
//!
//! The users cache is a resolver fallback, never authoritative: it holds
//! records seen at login/registration time so assignees still render by
//! name when the directory function is unreachable. The saved session
//! lets consecutive CLI invocations reuse one login.
//!
//! Both files live under the cache dir and are written atomically
//! (temp file + rename). A missing or corrupt file degrades to empty
//! state; it never fails an operation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use taskline_core::user::{Account, User, UserId};

/// Errors raised while persisting local state.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem failure while reading or writing.
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// State could not be encoded as JSON.
    #[error("cache encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A user record as persisted in the cache file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedUser {
    /// Identity-provider-assigned identifier.
    pub id: UserId,
    /// Account email address.
    pub email: String,
    /// Profile name; may be empty.
    #[serde(default)]
    pub name: String,
    /// Whether the email was verified last time this user was seen.
    #[serde(default)]
    pub email_verified: bool,
}

impl CachedUser {
    /// Builds a cache record from an account response.
    #[must_use]
    pub fn from_account(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            email: account.email.clone(),
            name: account.name.clone(),
            email_verified: account.email_verified,
        }
    }

    /// Returns the directory-shaped view of this record.
    #[must_use]
    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

/// Persisted map of previously seen users.
///
/// All methods take `&self`; interior mutability makes the cache shareable
/// between the session facade (writer) and the resolver (reader).
#[derive(Debug)]
pub struct UserCache {
    path: Option<PathBuf>,
    entries: RwLock<HashMap<UserId, CachedUser>>,
}

impl UserCache {
    /// Opens the cache at `path`, or an in-memory cache when `None`.
    ///
    /// A missing file yields an empty cache. A corrupt file is logged and
    /// treated as empty; the next persist overwrites it.
    #[must_use]
    pub fn load(path: Option<PathBuf>) -> Self {
        let entries = path.as_deref().map_or_else(HashMap::new, read_entries);
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    /// Looks up a user by id.
    #[must_use]
    pub fn get(&self, id: &UserId) -> Option<CachedUser> {
        self.entries.read().get(id).cloned()
    }

    /// Looks up a user by email, case-insensitively.
    #[must_use]
    pub fn find_by_email(&self, email: &str) -> Option<CachedUser> {
        self.entries
            .read()
            .values()
            .find(|entry| entry.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    /// Number of cached users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Inserts or replaces a record and persists best-effort.
    ///
    /// Persistence failures are logged, not surfaced: the cache keeps
    /// working from memory.
    pub fn upsert(&self, user: CachedUser) {
        self.entries.write().insert(user.id.clone(), user);
        if let Err(e) = self.persist() {
            tracing::warn!(error = %e, "failed to persist users cache");
        }
    }

    /// Flips a cached user's verified flag and persists best-effort.
    ///
    /// Unknown ids are ignored; verification can complete on a machine
    /// that never saw the registration.
    pub fn mark_verified(&self, id: &UserId) {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(id) else {
            return;
        };
        entry.email_verified = true;
        drop(entries);
        if let Err(e) = self.persist() {
            tracing::warn!(error = %e, "failed to persist users cache");
        }
    }

    /// Writes the cache file, creating parent directories as needed.
    ///
    /// No-op for an in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when encoding or the filesystem fails.
    pub fn persist(&self) -> Result<(), CacheError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let mut records: Vec<CachedUser> = self.entries.read().values().cloned().collect();
        records.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        write_atomically(path, &serde_json::to_vec_pretty(&records)?)?;
        Ok(())
    }
}

/// Saved session for consecutive CLI invocations.
#[derive(Debug)]
pub struct SessionStore {
    path: Option<PathBuf>,
}

/// On-disk shape of a saved session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    /// Account the session belongs to.
    pub user_id: UserId,
    /// Session secret presented on authenticated requests.
    pub secret: String,
}

impl SessionStore {
    /// A store at `path`, or a no-op store when `None`.
    #[must_use]
    pub const fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Reads the saved session, if one exists and decodes.
    #[must_use]
    pub fn load(&self) -> Option<StoredSession> {
        let path = self.path.as_deref()?;
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring corrupt saved session");
                None
            }
        }
    }

    /// Saves a session, creating parent directories as needed.
    ///
    /// No-op for a no-op store.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when encoding or the filesystem fails.
    pub fn save(&self, session: &StoredSession) -> Result<(), CacheError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        write_atomically(path, &serde_json::to_vec_pretty(session)?)?;
        Ok(())
    }

    /// Removes the saved session. Missing file is fine.
    pub fn clear(&self) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, "failed to remove saved session");
            }
        }
    }
}

fn read_entries(path: &Path) -> HashMap<UserId, CachedUser> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "failed to read users cache");
            return HashMap::new();
        }
    };
    match serde_json::from_str::<Vec<CachedUser>>(&contents) {
        Ok(records) => records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "ignoring corrupt users cache");
            HashMap::new()
        }
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}
