//! Account, session, recovery, and verification bindings.

use serde_json::json;
use taskline_core::document::UNIQUE_ID;
use taskline_core::user::{Account, SessionInfo};

use super::{ApiError, Backend, take_json, take_ok};

/// Account API seam.
///
/// The session facade is generic over this trait so its state machine can
/// be driven by an in-memory stub in tests. [`Backend`] is the production
/// implementation.
pub trait AccountApi: Send + Sync {
    /// Create an account. Does not create a session.
    fn register(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<Account, ApiError>> + Send;

    /// Create an email/password session and remember its secret for
    /// subsequent calls.
    fn create_session(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<SessionInfo, ApiError>> + Send;

    /// Fetch the account behind the current session.
    fn current_account(
        &self,
    ) -> impl std::future::Future<Output = Result<Account, ApiError>> + Send;

    /// Delete the current session and forget its secret.
    fn delete_current_session(
        &self,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Delete every session of the account and forget the local secret.
    fn delete_all_sessions(
        &self,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Start a password recovery flow; the platform emails a secret link
    /// pointing at `redirect_url`.
    fn send_recovery(
        &self,
        email: &str,
        redirect_url: &str,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Complete a password recovery flow with the emailed secret.
    fn complete_recovery(
        &self,
        user_id: &str,
        secret: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Send a verification email for the current session's account.
    fn send_verification(
        &self,
        redirect_url: &str,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Confirm an emailed verification secret.
    fn complete_verification(
        &self,
        user_id: &str,
        secret: &str,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Build the provider redirect URL for an OAuth2 login.
    ///
    /// No network call; the redirect dance happens in a browser.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::BadUrl`] when the URL cannot be built.
    fn oauth_url(
        &self,
        provider: &str,
        success_url: &str,
        failure_url: &str,
    ) -> Result<String, ApiError>;
}

impl AccountApi for Backend {
    async fn register(&self, email: &str, password: &str) -> Result<Account, ApiError> {
        let body = json!({
            "userId": UNIQUE_ID,
            "email": email,
            "password": password,
        });
        let response = self
            .decorate(self.http.post(self.api_url("account")).json(&body))
            .send()
            .await?;
        take_json(response).await
    }

    async fn create_session(&self, email: &str, password: &str) -> Result<SessionInfo, ApiError> {
        let body = json!({ "email": email, "password": password });
        let response = self
            .decorate(
                self.http
                    .post(self.api_url("account/sessions/email"))
                    .json(&body),
            )
            .send()
            .await?;
        let session: SessionInfo = take_json(response).await?;
        if session.secret.is_empty() {
            tracing::debug!("session created without a secret; requests stay anonymous");
            self.set_session(None);
        } else {
            self.set_session(Some(session.secret.clone()));
        }
        Ok(session)
    }

    async fn current_account(&self) -> Result<Account, ApiError> {
        let response = self
            .decorate(self.http.get(self.api_url("account")))
            .send()
            .await?;
        take_json(response).await
    }

    async fn delete_current_session(&self) -> Result<(), ApiError> {
        let response = self
            .decorate(self.http.delete(self.api_url("account/sessions/current")))
            .send()
            .await?;
        let result = take_ok(response).await;
        if result.is_ok() {
            self.set_session(None);
        }
        result
    }

    async fn delete_all_sessions(&self) -> Result<(), ApiError> {
        let response = self
            .decorate(self.http.delete(self.api_url("account/sessions")))
            .send()
            .await?;
        let result = take_ok(response).await;
        if result.is_ok() {
            self.set_session(None);
        }
        result
    }

    async fn send_recovery(&self, email: &str, redirect_url: &str) -> Result<(), ApiError> {
        let body = json!({ "email": email, "url": redirect_url });
        let response = self
            .decorate(self.http.post(self.api_url("account/recovery")).json(&body))
            .send()
            .await?;
        take_ok(response).await
    }

    async fn complete_recovery(
        &self,
        user_id: &str,
        secret: &str,
        password: &str,
    ) -> Result<(), ApiError> {
        let body = json!({
            "userId": user_id,
            "secret": secret,
            "password": password,
        });
        let response = self
            .decorate(self.http.put(self.api_url("account/recovery")).json(&body))
            .send()
            .await?;
        take_ok(response).await
    }

    async fn send_verification(&self, redirect_url: &str) -> Result<(), ApiError> {
        let body = json!({ "url": redirect_url });
        let response = self
            .decorate(
                self.http
                    .post(self.api_url("account/verification"))
                    .json(&body),
            )
            .send()
            .await?;
        take_ok(response).await
    }

    async fn complete_verification(&self, user_id: &str, secret: &str) -> Result<(), ApiError> {
        let body = json!({ "userId": user_id, "secret": secret });
        let response = self
            .decorate(
                self.http
                    .put(self.api_url("account/verification"))
                    .json(&body),
            )
            .send()
            .await?;
        take_ok(response).await
    }

    fn oauth_url(
        &self,
        provider: &str,
        success_url: &str,
        failure_url: &str,
    ) -> Result<String, ApiError> {
        let mut url =
            url::Url::parse(&self.api_url(&format!("account/sessions/oauth2/{provider}")))?;
        url.query_pairs_mut()
            .append_pair("project", self.project_id())
            .append_pair("success", success_url)
            .append_pair("failure", failure_url);
        Ok(url.into())
    }
}
