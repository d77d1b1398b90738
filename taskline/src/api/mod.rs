//! HTTP bindings for the hosted platform and the functions service.
//!
//! [`Backend`] is the single configuration-bound handle to the platform
//! REST API. Components never construct their own clients; they receive a
//! `Backend` clone (clones share the session slot) or, at the seams, one
//! of the binding traits:
//! - [`account::AccountApi`]: account, session, recovery, verification
//! - [`tasks::TasksApi`]: task document CRUD
//! - [`proxy::FunctionsApi`]: directory and 2FA proxies

pub mod account;
pub mod proxy;
pub mod tasks;

use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use taskline_core::document::{ErrorBody, PROJECT_HEADER, SESSION_HEADER};

/// Total per-request timeout for platform calls.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Errors raised by the platform and functions bindings.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A URL could not be parsed or built.
    #[error("invalid URL: {0}")]
    BadUrl(#[from] url::ParseError),

    /// The HTTP client failed before or during the exchange.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered with an error body.
    #[error("{message}")]
    Platform {
        /// HTTP status of the response.
        status: u16,
        /// Normalized failure category.
        kind: ErrorKind,
        /// Human-readable description from the error body.
        message: String,
    },

    /// A response decoded but did not have a usable shape.
    #[error("unexpected response payload: {0}")]
    Payload(String),
}

impl ApiError {
    /// Normalized category, for platform failures.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Platform { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// True when the platform reported a missing document or user.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind(), Some(ErrorKind::NotFound))
    }
}

/// Normalized category for platform failures.
///
/// The single place where the platform's `type` strings, message texts,
/// and HTTP statuses are folded into something callers can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Email/password pair was rejected.
    InvalidCredentials,
    /// A session is already active for this account.
    SessionConflict,
    /// An account with this email already exists.
    AlreadyRegistered,
    /// Caller lacks a valid session or the needed scope.
    Unauthorized,
    /// Document or user does not exist.
    NotFound,
    /// Recovery or verification secret is invalid or expired.
    Expired,
    /// Anything else.
    Other,
}

impl ErrorKind {
    /// Folds a platform error response into a category.
    ///
    /// The `type` field is authoritative when present. Looser upstreams
    /// only fill `message`, so known substrings are probed next, then the
    /// HTTP status.
    #[must_use]
    pub fn from_platform(status: u16, body: &ErrorBody) -> Self {
        match body.kind.as_str() {
            "user_invalid_credentials" => return Self::InvalidCredentials,
            "user_session_already_exists" => return Self::SessionConflict,
            "user_already_exists" => return Self::AlreadyRegistered,
            "user_invalid_token" | "user_token_expired" => return Self::Expired,
            "user_not_found" | "document_not_found" => return Self::NotFound,
            "user_unauthorized" | "general_unauthorized_scope" => return Self::Unauthorized,
            _ => {}
        }

        let message = body.message.to_lowercase();
        if message.contains("session is active") {
            return Self::SessionConflict;
        }
        if message.contains("already exists") {
            return Self::AlreadyRegistered;
        }
        if message.contains("missing scopes") || message.contains("unauthorized") {
            return Self::Unauthorized;
        }

        match status {
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound,
            _ => Self::Other,
        }
    }
}

/// Connection coordinates for the hosted platform.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Platform REST endpoint, e.g. `https://cloud.example.com/v1`.
    pub endpoint: String,
    /// Platform project id.
    pub project_id: String,
    /// Database holding the task collection.
    pub database_id: String,
    /// Collection holding task documents.
    pub tasks_collection_id: String,
}

impl BackendConfig {
    /// Creates a config from its four coordinates.
    pub fn new(
        endpoint: impl Into<String>,
        project_id: impl Into<String>,
        database_id: impl Into<String>,
        tasks_collection_id: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            project_id: project_id.into(),
            database_id: database_id.into(),
            tasks_collection_id: tasks_collection_id.into(),
        }
    }
}

/// Configuration-bound handle to the platform REST API.
///
/// Cheap to clone; clones share one HTTP connection pool and one session
/// slot, so a login performed through any clone authenticates them all.
#[derive(Clone)]
pub struct Backend {
    http: reqwest::Client,
    endpoint: url::Url,
    project_id: String,
    database_id: String,
    tasks_collection_id: String,
    session: Arc<RwLock<Option<String>>>,
}

impl Backend {
    /// Builds a handle from connection coordinates.
    ///
    /// No request is issued; the endpoint is only validated as a URL.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::BadUrl`] for an unparseable endpoint and
    /// [`ApiError::Http`] when the HTTP client cannot be constructed.
    pub fn connect(config: &BackendConfig) -> Result<Self, ApiError> {
        let endpoint = url::Url::parse(&config.endpoint)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint,
            project_id: config.project_id.clone(),
            database_id: config.database_id.clone(),
            tasks_collection_id: config.tasks_collection_id.clone(),
            session: Arc::new(RwLock::new(None)),
        })
    }

    /// The platform endpoint this handle talks to.
    #[must_use]
    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }

    /// The project id sent with every request.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The current session secret, if a session is active.
    #[must_use]
    pub fn session_secret(&self) -> Option<String> {
        self.session.read().clone()
    }

    /// Installs a previously saved session secret.
    pub fn restore_session(&self, secret: String) {
        *self.session.write() = Some(secret);
    }

    pub(crate) fn set_session(&self, secret: Option<String>) {
        *self.session.write() = secret;
    }

    /// Absolute URL for an API path such as `account/sessions/email`.
    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}/{path}", self.endpoint.as_str().trim_end_matches('/'))
    }

    /// Base path of the task document collection.
    pub(crate) fn tasks_path(&self) -> String {
        format!(
            "databases/{}/collections/{}/documents",
            self.database_id, self.tasks_collection_id
        )
    }

    /// Attaches the project header and, when present, the session header.
    pub(crate) fn decorate(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header(PROJECT_HEADER, &self.project_id);
        match self.session.read().clone() {
            Some(secret) => request.header(SESSION_HEADER, secret),
            None => request,
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The session secret stays out of debug output.
        f.debug_struct("Backend")
            .field("endpoint", &self.endpoint.as_str())
            .field("project_id", &self.project_id)
            .field("database_id", &self.database_id)
            .field("tasks_collection_id", &self.tasks_collection_id)
            .field("session", &self.session.read().is_some())
            .finish_non_exhaustive()
    }
}

/// Decodes a response body, folding error responses into
/// [`ApiError::Platform`].
pub(crate) async fn take_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    Err(platform_error(status.as_u16(), response).await)
}

/// Like [`take_json`] for endpoints whose success body carries nothing.
pub(crate) async fn take_ok(response: reqwest::Response) -> Result<(), ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    Err(platform_error(status.as_u16(), response).await)
}

async fn platform_error(status: u16, response: reqwest::Response) -> ApiError {
    let body: ErrorBody = response.json().await.unwrap_or_default();
    let kind = ErrorKind::from_platform(status, &body);
    let message = if body.message.is_empty() {
        format!("platform returned HTTP {status}")
    } else {
        body.message
    };
    ApiError::Platform {
        status,
        kind,
        message,
    }
}
