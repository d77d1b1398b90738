//! API-key bindings for the platform's admin surfaces.
//!
//! The proxies act on behalf of users who have no session of their own,
//! so every call here authenticates with the server API key instead of a
//! session secret. Covers the users admin API, server-side session and
//! recovery calls, and document CRUD for the 2FA code collection.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use taskline_core::document::{
    API_KEY_HEADER, CreateDocument, Document, DocumentList, ErrorBody, PROJECT_HEADER, UNIQUE_ID,
};
use taskline_core::user::{Account, SessionInfo};

/// Total per-request timeout for platform and mail relay calls.
pub(crate) const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Failures raised by the proxy handlers: platform admin calls and the
/// mail hand-off.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// A URL could not be parsed or built.
    #[error("invalid URL: {0}")]
    BadUrl(#[from] url::ParseError),

    /// The HTTP client failed before or during the exchange.
    #[error("platform request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered with an error body.
    #[error("{message}")]
    Platform {
        /// HTTP status of the response.
        status: u16,
        /// Human-readable description from the error body.
        message: String,
    },

    /// The mail relay rejected or failed the hand-off.
    #[error("mail hand-off failed: {0}")]
    Mail(String),
}

impl ProxyError {
    /// Status code to mirror into the proxy response.
    ///
    /// Platform failures keep their upstream status; everything else is a
    /// plain internal error.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Platform { status, .. } => *status,
            Self::BadUrl(_) | Self::Http(_) | Self::Mail(_) => 500,
        }
    }
}

/// A page of users returned by the admin list call.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct UserList {
    /// Total number of users in the project.
    pub total: u64,
    /// The returned page.
    pub users: Vec<Account>,
}

/// API-key-authenticated handle to the platform.
#[derive(Debug, Clone)]
pub struct AdminClient {
    http: reqwest::Client,
    endpoint: String,
    project_id: String,
    api_key: String,
}

impl AdminClient {
    /// Builds a handle from connection coordinates.
    ///
    /// No request is issued; the endpoint is only validated as a URL.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::BadUrl`] for an unparseable endpoint and
    /// [`ProxyError::Http`] when the HTTP client cannot be constructed.
    pub fn new(
        endpoint: &str,
        project_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProxyError> {
        let endpoint = url::Url::parse(endpoint)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.as_str().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            api_key: api_key.into(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{path}", self.endpoint)
    }

    /// Attaches the project and API key headers.
    fn decorate(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header(PROJECT_HEADER, &self.project_id)
            .header(API_KEY_HEADER, &self.api_key)
    }

    // -- users admin API ---------------------------------------------------

    /// Create a user account; the platform assigns the id.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Platform`] when the platform rejects the
    /// request, e.g. for a duplicate email.
    pub async fn create_user(&self, email: &str, password: &str) -> Result<Account, ProxyError> {
        let body = json!({
            "userId": UNIQUE_ID,
            "email": email,
            "password": password,
        });
        let response = self
            .decorate(self.http.post(self.api_url("users")).json(&body))
            .send()
            .await?;
        take_json(response).await
    }

    /// Fetch a user record by id.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Platform`] with the upstream 404 when the
    /// user does not exist.
    pub async fn get_user(&self, user_id: &str) -> Result<Account, ProxyError> {
        let response = self
            .decorate(self.http.get(self.api_url(&format!("users/{user_id}"))))
            .send()
            .await?;
        take_json(response).await
    }

    /// List every user in the project.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Platform`] when the API key lacks the users
    /// scope.
    pub async fn list_users(&self) -> Result<Vec<Account>, ProxyError> {
        let response = self
            .decorate(self.http.get(self.api_url("users")))
            .send()
            .await?;
        let list: UserList = take_json(response).await?;
        Ok(list.users)
    }

    // -- server-side account calls -----------------------------------------

    /// Create an email/password session on a user's behalf.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Platform`] for rejected credentials.
    pub async fn create_email_session(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionInfo, ProxyError> {
        let body = json!({ "email": email, "password": password });
        let response = self
            .decorate(
                self.http
                    .post(self.api_url("account/sessions/email"))
                    .json(&body),
            )
            .send()
            .await?;
        take_json(response).await
    }

    /// Start a password recovery flow; the platform emails a secret link
    /// pointing at `redirect_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Platform`] for an unknown email.
    pub async fn create_recovery(&self, email: &str, redirect_url: &str) -> Result<(), ProxyError> {
        let body = json!({ "email": email, "url": redirect_url });
        let response = self
            .decorate(self.http.post(self.api_url("account/recovery")).json(&body))
            .send()
            .await?;
        take_ok(response).await
    }

    /// Complete a password recovery flow with the emailed secret.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Platform`] for a stale or invalid secret.
    pub async fn update_recovery(
        &self,
        user_id: &str,
        secret: &str,
        password: &str,
    ) -> Result<(), ProxyError> {
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

    // -- document CRUD -----------------------------------------------------

    /// Create a document and return the stored copy.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Platform`] when the platform rejects the
    /// document.
    pub async fn create_document<T>(
        &self,
        database_id: &str,
        collection_id: &str,
        body: &CreateDocument<T>,
    ) -> Result<Document<T>, ProxyError>
    where
        T: Serialize + DeserializeOwned,
    {
        let path = documents_path(database_id, collection_id);
        let response = self
            .decorate(self.http.post(self.api_url(&path)).json(body))
            .send()
            .await?;
        take_json(response).await
    }

    /// List documents matching the given query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Platform`] when the collection is missing or
    /// the API key lacks the documents scope.
    pub async fn list_documents<T: DeserializeOwned>(
        &self,
        database_id: &str,
        collection_id: &str,
        query: &[(&str, String)],
    ) -> Result<DocumentList<Document<T>>, ProxyError> {
        let path = documents_path(database_id, collection_id);
        let response = self
            .decorate(self.http.get(self.api_url(&path)).query(query))
            .send()
            .await?;
        take_json(response).await
    }

    /// Delete a document by id.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Platform`] with the upstream 404 when the
    /// document does not exist.
    pub async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<(), ProxyError> {
        let path = format!("{}/{document_id}", documents_path(database_id, collection_id));
        let response = self
            .decorate(self.http.delete(self.api_url(&path)))
            .send()
            .await?;
        take_ok(response).await
    }
}

fn documents_path(database_id: &str, collection_id: &str) -> String {
    format!("databases/{database_id}/collections/{collection_id}/documents")
}

/// Decodes a response body, folding error responses into
/// [`ProxyError::Platform`].
async fn take_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ProxyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    Err(platform_error(status.as_u16(), response).await)
}

/// Like [`take_json`] for endpoints whose success body carries nothing.
async fn take_ok(response: reqwest::Response) -> Result<(), ProxyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    Err(platform_error(status.as_u16(), response).await)
}

async fn platform_error(status: u16, response: reqwest::Response) -> ProxyError {
    let body: ErrorBody = response.json().await.unwrap_or_default();
    let message = if body.message.is_empty() {
        format!("platform returned HTTP {status}")
    } else {
        body.message
    };
    ProxyError::Platform { status, message }
}
