//! Functions service core: shared state, proxy handlers, and startup.
//!
//! Endpoint contract:
//! - `POST /v1/authenticate`: action-dispatched auth proxy
//! - `POST /v1/send-2fa` / `POST /v1/verify-2fa`: code issue and check
//! - `GET /v1/users`: full user directory
//! - `GET /healthz`: liveness probe
//!
//! Failures come back as `{success: false, error, code}` (auth and
//! directory) or `{success: false, error}` (2FA), mirroring the upstream
//! status where one exists.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use taskline_core::proxy::{
    AuthAction, AuthRequest, DirectoryResponse, ProxyFailure, SendCodeRequest, TwoFaResponse,
    VerifyCodeRequest,
};
use taskline_core::user::Account;
use tokio::task::JoinHandle;

use crate::admin::{AdminClient, ProxyError};
use crate::config::FunctionsConfig;
use crate::mailer::Mailer;
use crate::twofa::{CodeCheck, TwoFa};

/// Shared service state handed to every handler.
pub struct ServerState {
    /// API-key platform handle for the authenticate and directory handlers.
    pub admin: AdminClient,
    /// 2FA issue and verify flows.
    pub twofa: TwoFa,
}

impl ServerState {
    /// Bundles a pre-built admin handle and 2FA flow.
    #[must_use]
    pub const fn new(admin: AdminClient, twofa: TwoFa) -> Self {
        Self { admin, twofa }
    }

    /// Builds the state from resolved configuration.
    ///
    /// Selects the HTTP relay mail transport when one is configured and
    /// the capturing in-memory transport otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error when a required platform setting is missing or a
    /// client cannot be constructed.
    pub fn from_config(
        config: &FunctionsConfig,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let admin = AdminClient::new(
            config.require_endpoint()?,
            config.require_project()?,
            config.require_api_key()?,
        )?;
        let mailer = match config.mail_relay_url.as_deref() {
            Some(relay_url) => Mailer::http_relay(relay_url, config.mail_from.as_str())?,
            None => {
                tracing::warn!("no mail relay configured; outgoing 2fa mail is captured in memory");
                Mailer::memory()
            }
        };
        let twofa = TwoFa::new(
            admin.clone(),
            mailer,
            config.database_id.as_str(),
            config.twofa_collection_id.as_str(),
            config.code_ttl_secs,
        );
        Ok(Self::new(admin, twofa))
    }
}

/// Starts the service from resolved configuration.
///
/// # Errors
///
/// Returns an error when the state cannot be built or the TCP listener
/// cannot bind to the given address.
pub async fn start_server(
    addr: &str,
    config: &FunctionsConfig,
) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>> {
    let state = Arc::new(ServerState::from_config(config)?);
    start_server_with_state(addr, state).await
}

/// Starts the service with a pre-configured [`ServerState`].
///
/// Binds the listener before spawning, so the returned address is ready
/// to dial; tests pass `127.0.0.1:0` for an ephemeral port.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<ServerState>,
) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/authenticate", post(authenticate))
        .route("/v1/send-2fa", post(send_code))
        .route("/v1/verify-2fa", post(verify_code))
        .route("/v1/users", get(list_users))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "functions service error");
        }
    });

    Ok((bound_addr, handle))
}

async fn healthz() -> &'static str {
    "ok"
}

/// Action-dispatched auth proxy.
async fn authenticate(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<AuthRequest>,
) -> Response {
    match request.parsed_action() {
        Some(AuthAction::Login) => login(&state, &request).await,
        Some(AuthAction::Register) => register(&state, &request).await,
        Some(AuthAction::Recovery) => recovery(&state, &request).await,
        Some(AuthAction::ResetPassword) => reset_password(&state, &request).await,
        Some(AuthAction::GetUser) => get_user(&state, &request).await,
        None => {
            tracing::warn!(action = %request.action, "unknown authenticate action");
            proxy_failure(400, "Invalid action")
        }
    }
}

async fn login(state: &ServerState, request: &AuthRequest) -> Response {
    let (Some(email), Some(password)) = (&request.email, &request.password) else {
        return proxy_failure(400, "email and password required");
    };
    match state.admin.create_email_session(email, password).await {
        Ok(session) => Json(json!({ "success": true, "session": session })).into_response(),
        Err(e) => auth_error("login", &e),
    }
}

/// Creates the account and logs it straight in, unlike the client-side
/// two-step flow.
async fn register(state: &ServerState, request: &AuthRequest) -> Response {
    let (Some(email), Some(password)) = (&request.email, &request.password) else {
        return proxy_failure(400, "email and password required");
    };
    let user = match state.admin.create_user(email, password).await {
        Ok(user) => user,
        Err(e) => return auth_error("register", &e),
    };
    match state.admin.create_email_session(email, password).await {
        Ok(session) => {
            Json(json!({ "success": true, "user": user, "session": session })).into_response()
        }
        Err(e) => auth_error("register", &e),
    }
}

async fn recovery(state: &ServerState, request: &AuthRequest) -> Response {
    let (Some(email), Some(redirect_url)) = (&request.email, &request.redirect_url) else {
        return proxy_failure(400, "email and redirectUrl required");
    };
    match state.admin.create_recovery(email, redirect_url).await {
        Ok(()) => {
            Json(json!({ "success": true, "message": "Recovery email sent" })).into_response()
        }
        Err(e) => auth_error("recovery", &e),
    }
}

async fn reset_password(state: &ServerState, request: &AuthRequest) -> Response {
    let (Some(user_id), Some(secret), Some(password)) =
        (&request.user_id, &request.secret, &request.password)
    else {
        return proxy_failure(400, "userId, secret, and password required");
    };
    if let Some(again) = &request.password_again
        && again != password
    {
        return proxy_failure(400, "passwords do not match");
    }
    match state.admin.update_recovery(user_id, secret, password).await {
        Ok(()) => {
            Json(json!({ "success": true, "message": "Password reset successful" })).into_response()
        }
        Err(e) => auth_error("resetPassword", &e),
    }
}

async fn get_user(state: &ServerState, request: &AuthRequest) -> Response {
    let Some(user_id) = &request.user_id else {
        return proxy_failure(400, "userId required");
    };
    match state.admin.get_user(user_id).await {
        Ok(user) => Json(json!({ "success": true, "user": user })).into_response(),
        Err(e) => auth_error("getUser", &e),
    }
}

/// 2FA code issue endpoint.
async fn send_code(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<SendCodeRequest>,
) -> Response {
    let Some(email) = required(request.email.as_deref()) else {
        return twofa_failure(StatusCode::BAD_REQUEST, "email required");
    };
    match state.twofa.send_code(email).await {
        Ok(()) => Json(TwoFaResponse::ok()).into_response(),
        Err(e) => {
            tracing::error!(err = %e, "send-2fa failed");
            twofa_failure(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// 2FA code check endpoint.
async fn verify_code(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<VerifyCodeRequest>,
) -> Response {
    let (Some(email), Some(code)) = (
        required(request.email.as_deref()),
        required(request.code.as_deref()),
    ) else {
        return twofa_failure(StatusCode::BAD_REQUEST, "email and code required");
    };
    match state.twofa.verify_code(email, code).await {
        Ok(CodeCheck::Valid) => Json(TwoFaResponse::ok()).into_response(),
        Ok(CodeCheck::Invalid) => twofa_failure(StatusCode::BAD_REQUEST, "invalid code"),
        Ok(CodeCheck::Expired) => twofa_failure(StatusCode::BAD_REQUEST, "code expired"),
        Err(e) => {
            tracing::error!(err = %e, "verify-2fa failed");
            twofa_failure(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// User directory endpoint.
async fn list_users(State(state): State<Arc<ServerState>>) -> Response {
    match state.admin.list_users().await {
        Ok(accounts) => {
            let users = accounts.iter().map(Account::to_user).collect();
            Json(DirectoryResponse { users }).into_response()
        }
        Err(e) => {
            tracing::error!(err = %e, "directory fetch failed");
            proxy_failure(e.status(), &e.to_string())
        }
    }
}

/// Trims a field and drops it when empty.
fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `{success: false, error, code}` with the matching HTTP status.
fn proxy_failure(status: u16, message: &str) -> Response {
    let http = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (http, Json(ProxyFailure::new(message, status))).into_response()
}

fn auth_error(action: &str, error: &ProxyError) -> Response {
    tracing::warn!(action = action, err = %error, "authenticate action failed");
    proxy_failure(error.status(), &error.to_string())
}

fn twofa_failure(status: StatusCode, message: &str) -> Response {
    (status, Json(TwoFaResponse::failed(message))).into_response()
}
