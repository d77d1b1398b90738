//! Session facade: the auth state machine over the account API.
//!
//! Owns the verified-email gate: a login that authenticates but finds an
//! unverified account sends a verification email (best-effort), deletes
//! the fresh session, and reports failure, so an unverified login never
//! leaves a usable session behind. Successful logins and registrations
//! feed the persisted users cache so the resolver can name accounts seen
//! on this machine.

use std::sync::Arc;

use parking_lot::RwLock;
use taskline_core::user::{Account, UserId};

use crate::api::account::AccountApi;
use crate::api::{ApiError, ErrorKind};
use crate::cache::{CachedUser, UserCache};

/// Errors surfaced by the session facade.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Email/password pair was rejected.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Account exists but the email is unverified; a verification email
    /// was sent.
    #[error(
        "email not verified; follow the link in the verification email just sent, then log in again"
    )]
    UnverifiedSent,

    /// Account exists but the email is unverified, and the verification
    /// email could not be sent.
    #[error(
        "email not verified, and sending the verification email failed; try `resend-verification` in a few moments"
    )]
    UnverifiedSendFailed,

    /// A previous session was still active. All sessions were cleared;
    /// the caller should retry.
    #[error("a previous session was still active and has been cleared; please log in again")]
    SessionConflict,

    /// The project does not allow self-service account creation.
    #[error("account creation is disabled for this project")]
    CreationDisabled,

    /// An account with this email already exists.
    #[error("an account with this email already exists; log in instead")]
    AlreadyRegistered,

    /// Recovery or verification secret is invalid or expired.
    #[error("this link is invalid or has expired; request a new one")]
    Expired,

    /// Any other backend failure.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AuthError {
    /// True for both unverified-email outcomes of `login`.
    #[must_use]
    pub const fn is_unverified(&self) -> bool {
        matches!(self, Self::UnverifiedSent | Self::UnverifiedSendFailed)
    }
}

/// Auth facade generic over the account API.
///
/// `current` holds the account of the active session, if any. All methods
/// take `&self`; the facade is shareable once wrapped in an `Arc`.
pub struct SessionManager<A> {
    account: A,
    cache: Arc<UserCache>,
    current: RwLock<Option<Account>>,
    verify_redirect: String,
}

impl<A: AccountApi> SessionManager<A> {
    /// Creates a facade over `account`.
    ///
    /// `verify_redirect` is the link target embedded in verification
    /// emails sent from the unverified-login path.
    pub fn new(account: A, cache: Arc<UserCache>, verify_redirect: impl Into<String>) -> Self {
        Self {
            account,
            cache,
            current: RwLock::new(None),
            verify_redirect: verify_redirect.into(),
        }
    }

    /// The account of the active session, if one was established.
    #[must_use]
    pub fn current(&self) -> Option<Account> {
        self.current.read().clone()
    }

    /// Probes the backend for an existing session.
    ///
    /// Returns `Ok(None)` when no session is active; that is the normal
    /// cold-start outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Api`] when the backend cannot be reached or
    /// fails for any reason other than a missing session.
    pub async fn init(&self) -> Result<Option<Account>, AuthError> {
        match self.account.current_account().await {
            Ok(account) => {
                self.cache.upsert(CachedUser::from_account(&account));
                *self.current.write() = Some(account.clone());
                Ok(Some(account))
            }
            Err(e) if e.kind() == Some(ErrorKind::Unauthorized) => Ok(None),
            Err(e) => Err(AuthError::Api(e)),
        }
    }

    /// Logs in with email and password, enforcing the verified-email gate.
    ///
    /// A stale session is cleared best-effort before the attempt so a
    /// dangling session cannot poison it.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCredentials`] for a rejected pair.
    /// - [`AuthError::SessionConflict`] when another session was active;
    ///   all sessions are cleared first.
    /// - [`AuthError::UnverifiedSent`] / [`AuthError::UnverifiedSendFailed`]
    ///   when the account's email is unverified; the fresh session is
    ///   deleted either way.
    pub async fn login(&self, email: &str, password: &str) -> Result<Account, AuthError> {
        if let Err(e) = self.account.delete_current_session().await {
            tracing::debug!(error = %e, "no existing session to clear before login");
        }

        if let Err(e) = self.account.create_session(email, password).await {
            return Err(self.session_failure(e).await);
        }

        let account = self.account.current_account().await?;
        if !account.email_verified {
            return Err(self.reject_unverified().await);
        }

        self.cache.upsert(CachedUser::from_account(&account));
        *self.current.write() = Some(account.clone());
        tracing::info!(user_id = %account.id, "login successful");
        Ok(account)
    }

    /// Creates an account. No session is created; the caller must `login`
    /// afterwards, which also triggers the verification email.
    ///
    /// # Errors
    ///
    /// - [`AuthError::CreationDisabled`] when the project rejects
    ///   self-service signup.
    /// - [`AuthError::AlreadyRegistered`] for a duplicate email.
    pub async fn register(&self, email: &str, password: &str) -> Result<Account, AuthError> {
        let account = match self.account.register(email, password).await {
            Ok(account) => account,
            Err(e) => {
                return Err(match e.kind() {
                    Some(ErrorKind::Unauthorized) => AuthError::CreationDisabled,
                    Some(ErrorKind::AlreadyRegistered) => AuthError::AlreadyRegistered,
                    _ => AuthError::Api(e),
                });
            }
        };
        self.cache.upsert(CachedUser::from_account(&account));
        tracing::info!(user_id = %account.id, "account created; log in to verify the email");
        Ok(account)
    }

    /// Logs out: deletes all sessions, falling back to the current one.
    ///
    /// Local state is cleared even when every remote call fails, so the
    /// facade always ends up anonymous.
    pub async fn logout(&self) {
        if let Err(e) = self.account.delete_all_sessions().await {
            tracing::warn!(error = %e, "failed to delete all sessions; trying current only");
            if let Err(e) = self.account.delete_current_session().await {
                tracing::warn!(error = %e, "failed to delete current session");
            }
        }
        *self.current.write() = None;
    }

    /// Starts a password recovery flow.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Api`] on backend failure.
    pub async fn send_recovery(&self, email: &str, redirect_url: &str) -> Result<(), AuthError> {
        self.account.send_recovery(email, redirect_url).await?;
        Ok(())
    }

    /// Completes a password recovery flow with the emailed secret.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Expired`] for a stale or invalid secret.
    pub async fn complete_recovery(
        &self,
        user_id: &str,
        secret: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        self.account
            .complete_recovery(user_id, secret, password)
            .await
            .map_err(map_secret_error)
    }

    /// Confirms an emailed verification secret and updates the cache.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Expired`] for a stale or invalid secret.
    pub async fn verify_email(&self, user_id: &str, secret: &str) -> Result<(), AuthError> {
        self.account
            .complete_verification(user_id, secret)
            .await
            .map_err(map_secret_error)?;
        self.cache.mark_verified(&UserId::new(user_id));
        Ok(())
    }

    /// Re-sends the verification email for the current session's account.
    /// Requires a live (possibly unverified) session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Api`] on backend failure, including the
    /// missing-session case.
    pub async fn resend_verification(&self, redirect_url: &str) -> Result<(), AuthError> {
        self.account.send_verification(redirect_url).await?;
        Ok(())
    }

    /// Builds the provider redirect URL for an OAuth2 login.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Api`] when the URL cannot be built.
    pub fn oauth_url(
        &self,
        provider: &str,
        success_url: &str,
        failure_url: &str,
    ) -> Result<String, AuthError> {
        Ok(self.account.oauth_url(provider, success_url, failure_url)?)
    }

    /// Maps a failed session creation, clearing all sessions on conflict.
    async fn session_failure(&self, e: ApiError) -> AuthError {
        match e.kind() {
            Some(ErrorKind::InvalidCredentials) => AuthError::InvalidCredentials,
            Some(ErrorKind::SessionConflict) => {
                tracing::info!("active session conflict; clearing all sessions");
                if let Err(clear) = self.account.delete_all_sessions().await {
                    tracing::warn!(error = %clear, "failed to clear conflicting sessions");
                }
                AuthError::SessionConflict
            }
            _ => AuthError::Api(e),
        }
    }

    /// Tears down an unverified login: send the verification email
    /// best-effort, then delete the session it rode in on.
    async fn reject_unverified(&self) -> AuthError {
        let sent = match self.account.send_verification(&self.verify_redirect).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "failed to send verification email");
                false
            }
        };
        if let Err(e) = self.account.delete_current_session().await {
            tracing::warn!(error = %e, "failed to delete session of unverified account");
        }
        if sent {
            AuthError::UnverifiedSent
        } else {
            AuthError::UnverifiedSendFailed
        }
    }
}

fn map_secret_error(e: ApiError) -> AuthError {
    match e.kind() {
        Some(ErrorKind::Expired) => AuthError::Expired,
        _ => AuthError::Api(e),
    }
}
