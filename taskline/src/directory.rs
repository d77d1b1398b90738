//! User directory: resolves assignee ids to readable labels.
//!
//! Resolution falls through three layers: the directory fetched from the
//! functions service this run, then the persisted users cache (accounts
//! seen on this machine), then a deterministic placeholder built from the
//! id. The fetched directory lives only in memory; the persisted cache is
//! written by the session facade alone.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use taskline_core::user::{User, UserId, placeholder_label};

use crate::api::ApiError;
use crate::api::proxy::FunctionsApi;
use crate::cache::UserCache;

/// Directory resolver generic over the functions API.
pub struct Directory<F> {
    functions: F,
    cache: Arc<UserCache>,
    users: RwLock<HashMap<UserId, User>>,
    fetching: AtomicBool,
}

impl<F: FunctionsApi> Directory<F> {
    /// Creates a resolver backed by `functions` and the persisted cache.
    pub fn new(functions: F, cache: Arc<UserCache>) -> Self {
        Self {
            functions,
            cache,
            users: RwLock::new(HashMap::new()),
            fetching: AtomicBool::new(false),
        }
    }

    /// Fetches the user directory and replaces the in-memory map.
    ///
    /// Concurrent refreshes are coalesced: while one is in flight, other
    /// callers return the current directory size without a second fetch.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`ApiError`]; the in-memory map keeps its
    /// previous contents and a later refresh may succeed.
    pub async fn refresh(&self) -> Result<usize, ApiError> {
        if self
            .fetching
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("directory refresh already in flight");
            return Ok(self.users.read().len());
        }

        let fetched = self.functions.fetch_users().await;
        self.fetching.store(false, Ordering::SeqCst);

        let fetched = fetched?;
        let mut users = self.users.write();
        users.clear();
        for user in fetched {
            users.insert(user.id.clone(), user);
        }
        tracing::debug!(users = users.len(), "directory refreshed");
        Ok(users.len())
    }

    /// Resolves an id against the fetched directory, then the persisted
    /// cache. `None` means the id is unknown to this machine.
    #[must_use]
    pub fn resolve(&self, id: &UserId) -> Option<User> {
        if let Some(user) = self.users.read().get(id) {
            return Some(user.clone());
        }
        self.cache.get(id).map(|cached| cached.to_user())
    }

    /// Returns a display label for an id, falling back to the
    /// `User {suffix}` placeholder when it cannot be resolved.
    #[must_use]
    pub fn label(&self, id: &UserId) -> String {
        self.resolve(id)
            .map_or_else(|| placeholder_label(id), |user| user.label())
    }

    /// Returns the display name only, with the same placeholder rule as
    /// [`Self::label`].
    #[must_use]
    pub fn user_name(&self, id: &UserId) -> String {
        self.resolve(id).map_or_else(
            || placeholder_label(id),
            |user| user.display_name().to_string(),
        )
    }

    /// Returns the email for an id, or `None` when it is unknown.
    #[must_use]
    pub fn user_email(&self, id: &UserId) -> Option<String> {
        self.resolve(id).map(|user| user.email)
    }

    /// Looks up a user by email, case-insensitively. Probes the fetched
    /// directory first, then the persisted cache.
    #[must_use]
    pub fn find_by_email(&self, email: &str) -> Option<User> {
        if let Some(user) = self
            .users
            .read()
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
        {
            return Some(user.clone());
        }
        self.cache.find_by_email(email).map(|cached| cached.to_user())
    }
}
