//! Integration tests for the functions service HTTP surface.
//!
//! Starts the service in-process against a stub platform (admin users,
//! sessions, recovery, and documents) with a capturing mail transport,
//! then exercises the contract end-to-end:
//! - authenticate action dispatch and error mirroring
//! - 2FA code issue, single consumption, and expiry
//! - user directory shape

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};
use taskline_core::document::API_KEY_HEADER;
use taskline_functions::admin::AdminClient;
use taskline_functions::mailer::{Mailer, SentMail};
use taskline_functions::server::{ServerState, start_server_with_state};
use taskline_functions::twofa::TwoFa;
use tokio::task::JoinHandle;

// =============================================================================
// Stub platform
// =============================================================================

#[derive(Clone)]
struct StoredUser {
    id: String,
    email: String,
    password: String,
}

#[derive(Default)]
struct StubPlatform {
    users: Mutex<Vec<StoredUser>>,
    /// user id -> outstanding recovery secret
    recoveries: Mutex<HashMap<String, String>>,
    /// 2FA code documents, insertion order
    codes: Mutex<Vec<Value>>,
    next_id: AtomicU64,
}

impl StubPlatform {
    fn fresh_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Rewrites every stored code's creation timestamp `seconds` into the
    /// past, so expiry can be tested without sleeping.
    fn age_codes(&self, seconds: i64) {
        for doc in self.codes.lock().iter_mut() {
            let created: DateTime<Utc> = doc["$createdAt"].as_str().unwrap().parse().unwrap();
            let aged = created - chrono::Duration::seconds(seconds);
            doc["$createdAt"] = json!(aged.to_rfc3339());
        }
    }

    fn recovery_secret(&self, user_id: &str) -> String {
        self.recoveries.lock().get(user_id).cloned().expect("recovery secret issued")
    }
}

fn platform_error(status: StatusCode, kind: &str, message: &str) -> Response {
    let body = json!({ "message": message, "code": status.as_u16(), "type": kind });
    (status, Json(body)).into_response()
}

fn keyed(headers: &HeaderMap) -> bool {
    headers.get(API_KEY_HEADER).is_some()
}

fn user_json(user: &StoredUser) -> Value {
    json!({
        "$id": user.id,
        "email": user.email,
        "name": "",
        "emailVerification": false,
    })
}

async fn create_user(
    State(state): State<Arc<StubPlatform>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !keyed(&headers) {
        return platform_error(StatusCode::UNAUTHORIZED, "general_unauthorized_scope", "Missing API key");
    }
    let email = body["email"].as_str().unwrap_or_default().to_string();
    let password = body["password"].as_str().unwrap_or_default().to_string();
    let mut users = state.users.lock();
    if users.iter().any(|user| user.email == email) {
        return platform_error(
            StatusCode::CONFLICT,
            "user_already_exists",
            "A user with the same email already exists",
        );
    }
    let user = StoredUser {
        id: state.fresh_id("user"),
        email,
        password,
    };
    let rendered = user_json(&user);
    users.push(user);
    (StatusCode::CREATED, Json(rendered)).into_response()
}

async fn list_users(State(state): State<Arc<StubPlatform>>, headers: HeaderMap) -> Response {
    if !keyed(&headers) {
        return platform_error(StatusCode::UNAUTHORIZED, "general_unauthorized_scope", "Missing API key");
    }
    let users = state.users.lock();
    let rendered: Vec<Value> = users.iter().map(user_json).collect();
    Json(json!({ "total": rendered.len(), "users": rendered })).into_response()
}

async fn get_user(
    State(state): State<Arc<StubPlatform>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !keyed(&headers) {
        return platform_error(StatusCode::UNAUTHORIZED, "general_unauthorized_scope", "Missing API key");
    }
    let users = state.users.lock();
    match users.iter().find(|user| user.id == id) {
        Some(user) => Json(user_json(user)).into_response(),
        None => platform_error(
            StatusCode::NOT_FOUND,
            "user_not_found",
            "User with the requested ID could not be found",
        ),
    }
}

async fn create_session(
    State(state): State<Arc<StubPlatform>>,
    Json(body): Json<Value>,
) -> Response {
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    let users = state.users.lock();
    let Some(user) = users
        .iter()
        .find(|user| user.email == email && user.password == password)
    else {
        return platform_error(
            StatusCode::UNAUTHORIZED,
            "user_invalid_credentials",
            "Invalid credentials",
        );
    };
    let body = json!({
        "$id": state.fresh_id("sess"),
        "userId": user.id,
        "secret": state.fresh_id("secret"),
    });
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn create_recovery(
    State(state): State<Arc<StubPlatform>>,
    Json(body): Json<Value>,
) -> Response {
    let email = body["email"].as_str().unwrap_or_default();
    let users = state.users.lock();
    let Some(user) = users.iter().find(|user| user.email == email) else {
        return platform_error(
            StatusCode::NOT_FOUND,
            "user_not_found",
            "User with the requested ID could not be found",
        );
    };
    let secret = state.fresh_id("recover");
    state.recoveries.lock().insert(user.id.clone(), secret);
    (StatusCode::CREATED, Json(json!({}))).into_response()
}

async fn update_recovery(
    State(state): State<Arc<StubPlatform>>,
    Json(body): Json<Value>,
) -> Response {
    let user_id = body["userId"].as_str().unwrap_or_default();
    let secret = body["secret"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default().to_string();
    if state.recoveries.lock().get(user_id).map(String::as_str) != Some(secret) {
        return platform_error(
            StatusCode::UNAUTHORIZED,
            "user_invalid_token",
            "Invalid token passed in the request",
        );
    }
    state.recoveries.lock().remove(user_id);
    let mut users = state.users.lock();
    if let Some(user) = users.iter_mut().find(|user| user.id == user_id) {
        user.password = password;
    }
    Json(json!({})).into_response()
}

async fn create_document(
    State(state): State<Arc<StubPlatform>>,
    Json(body): Json<Value>,
) -> Response {
    let mut document = body["data"].clone();
    let fields = document.as_object_mut().expect("document data object");
    let id = match body["documentId"].as_str() {
        Some("unique()") | None => state.fresh_id("code"),
        Some(explicit) => explicit.to_string(),
    };
    fields.insert("$id".to_string(), json!(id));
    fields.insert("$createdAt".to_string(), json!(Utc::now().to_rfc3339()));
    state.codes.lock().push(document.clone());
    (StatusCode::CREATED, Json(document)).into_response()
}

async fn list_documents(
    State(state): State<Arc<StubPlatform>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    // Stored in insertion order; served newest first.
    let mut documents: Vec<Value> = state
        .codes
        .lock()
        .iter()
        .rev()
        .filter(|doc| {
            params
                .get("email")
                .is_none_or(|email| doc["email"].as_str() == Some(email))
                && params
                    .get("code")
                    .is_none_or(|code| doc["code"].as_str() == Some(code))
        })
        .cloned()
        .collect();
    let total = documents.len();
    if let Some(limit) = params.get("limit").and_then(|raw| raw.parse::<usize>().ok()) {
        documents.truncate(limit);
    }
    Json(json!({ "total": total, "documents": documents })).into_response()
}

async fn delete_document(
    State(state): State<Arc<StubPlatform>>,
    Path((_db, _col, id)): Path<(String, String, String)>,
) -> Response {
    let mut codes = state.codes.lock();
    let before = codes.len();
    codes.retain(|doc| doc["$id"].as_str() != Some(id.as_str()));
    if codes.len() == before {
        return platform_error(
            StatusCode::NOT_FOUND,
            "document_not_found",
            "Document with the requested ID could not be found",
        );
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn start_stub_platform() -> (SocketAddr, Arc<StubPlatform>, JoinHandle<()>) {
    let state = Arc::new(StubPlatform::default());
    let app = Router::new()
        .route("/v1/users", post(create_user).get(list_users))
        .route("/v1/users/{id}", get(get_user))
        .route("/v1/account/sessions/email", post(create_session))
        .route(
            "/v1/account/recovery",
            post(create_recovery).put(update_recovery),
        )
        .route(
            "/v1/databases/{db}/collections/{col}/documents",
            post(create_document).get(list_documents),
        )
        .route(
            "/v1/databases/{db}/collections/{col}/documents/{id}",
            axum::routing::delete(delete_document),
        )
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub platform");
    let addr = listener.local_addr().expect("stub platform addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve stub platform");
    });
    (addr, state, handle)
}

// =============================================================================
// Service harness
// =============================================================================

struct TestService {
    base: String,
    http: reqwest::Client,
    platform: Arc<StubPlatform>,
    mailer: Mailer,
    _platform_handle: JoinHandle<()>,
    _service_handle: JoinHandle<()>,
}

impl TestService {
    async fn start() -> Self {
        let (platform_addr, platform, platform_handle) = start_stub_platform().await;
        let admin = AdminClient::new(
            &format!("http://{platform_addr}/v1"),
            "proj-test",
            "key-test",
        )
        .expect("build admin client");
        let mailer = Mailer::memory();
        let twofa = TwoFa::new(admin.clone(), mailer.clone(), "taskline", "twofa_codes", 300);
        let state = Arc::new(ServerState::new(admin, twofa));
        let (addr, service_handle) = start_server_with_state("127.0.0.1:0", state)
            .await
            .expect("start functions service");

        Self {
            base: format!("http://{addr}"),
            http: reqwest::Client::new(),
            platform,
            mailer,
            _platform_handle: platform_handle,
            _service_handle: service_handle,
        }
    }

    async fn post_json(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .http
            .post(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .expect("request");
        let status = response.status().as_u16();
        let body: Value = response.json().await.expect("json body");
        (status, body)
    }

    async fn authenticate(&self, body: Value) -> (u16, Value) {
        self.post_json("/v1/authenticate", body).await
    }

    async fn register(&self, email: &str, password: &str) -> Value {
        let (status, body) = self
            .authenticate(json!({
                "action": "register",
                "email": email,
                "password": password,
            }))
            .await;
        assert_eq!(status, 200, "register failed: {body}");
        body
    }
}

/// Pulls the six-digit code out of a captured mail body.
fn code_from(mail: &SentMail) -> String {
    mail.body
        .split_whitespace()
        .map(|word| word.trim_end_matches('.'))
        .find(|word| word.len() == 6 && word.chars().all(|c| c.is_ascii_digit()))
        .expect("code in mail body")
        .to_string()
}

// =============================================================================
// Authenticate dispatch
// =============================================================================

#[tokio::test]
async fn healthz_answers_ok() {
    let service = TestService::start().await;
    let response = service
        .http
        .get(format!("{}/healthz", service.base))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.expect("body"), "ok");
}

#[tokio::test]
async fn register_creates_the_account_and_a_session() {
    let service = TestService::start().await;

    let body = service.register("ada@example.com", "correct horse").await;
    assert_eq!(body["success"], Value::Bool(true));
    assert!(body["user"]["$id"].as_str().is_some());
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert!(!body["session"]["secret"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_registration_mirrors_the_conflict() {
    let service = TestService::start().await;
    service.register("ada@example.com", "correct horse").await;

    let (status, body) = service
        .authenticate(json!({
            "action": "register",
            "email": "ada@example.com",
            "password": "another pass",
        }))
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["success"], Value::Bool(false));
    assert_eq!(body["code"], 409);
    assert!(body["error"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn login_round_trips_a_session() {
    let service = TestService::start().await;
    service.register("ada@example.com", "correct horse").await;

    let (status, body) = service
        .authenticate(json!({
            "action": "login",
            "email": "ada@example.com",
            "password": "correct horse",
        }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], Value::Bool(true));
    assert!(body["session"]["secret"].as_str().is_some());

    let (status, body) = service
        .authenticate(json!({
            "action": "login",
            "email": "ada@example.com",
            "password": "wrong",
        }))
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "Invalid credentials");
    assert_eq!(body["code"], 401);
}

#[tokio::test]
async fn unknown_action_is_refused() {
    let service = TestService::start().await;
    let (status, body) = service.authenticate(json!({ "action": "destroy" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], Value::Bool(false));
    assert_eq!(body["error"], "Invalid action");
}

#[tokio::test]
async fn get_user_fetches_the_record_by_id() {
    let service = TestService::start().await;
    let registered = service.register("ada@example.com", "correct horse").await;
    let user_id = registered["user"]["$id"].as_str().unwrap().to_string();

    let (status, body) = service
        .authenticate(json!({ "action": "getUser", "userId": user_id }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["user"]["email"], "ada@example.com");

    let (status, body) = service
        .authenticate(json!({ "action": "getUser", "userId": "user-nope" }))
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["success"], Value::Bool(false));
}

#[tokio::test]
async fn recovery_then_reset_changes_the_password() {
    let service = TestService::start().await;
    let registered = service.register("ada@example.com", "old password").await;
    let user_id = registered["user"]["$id"].as_str().unwrap().to_string();

    let (status, body) = service
        .authenticate(json!({
            "action": "recovery",
            "email": "ada@example.com",
            "redirectUrl": "https://app.example.com/reset",
        }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Recovery email sent");

    let secret = service.platform.recovery_secret(&user_id);
    let (status, body) = service
        .authenticate(json!({
            "action": "resetPassword",
            "userId": user_id,
            "secret": secret,
            "password": "new password",
            "passwordAgain": "new password",
        }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Password reset successful");

    // The old password is out, the new one is in.
    let (status, _) = service
        .authenticate(json!({
            "action": "login",
            "email": "ada@example.com",
            "password": "old password",
        }))
        .await;
    assert_eq!(status, 401);
    let (status, _) = service
        .authenticate(json!({
            "action": "login",
            "email": "ada@example.com",
            "password": "new password",
        }))
        .await;
    assert_eq!(status, 200);
}

// =============================================================================
// 2FA flows
// =============================================================================

#[tokio::test]
async fn send_2fa_persists_and_mails_the_code() {
    let service = TestService::start().await;

    let (status, body) = service
        .post_json("/v1/send-2fa", json!({ "email": "ada@example.com" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "success": true }));

    let captured = service.mailer.captured();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].to, "ada@example.com");
    assert_eq!(captured[0].subject, "Your 2FA code");
    assert!(captured[0].body.contains("It expires in 5 minutes."));

    let code = code_from(&captured[0]);
    let codes = service.platform.codes.lock();
    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0]["code"].as_str().unwrap(), code);
    assert_eq!(codes[0]["email"], "ada@example.com");
    assert_eq!(codes[0]["ttl"], 300);
}

#[tokio::test]
async fn a_code_verifies_exactly_once() {
    let service = TestService::start().await;
    service
        .post_json("/v1/send-2fa", json!({ "email": "ada@example.com" }))
        .await;
    let code = code_from(&service.mailer.captured()[0]);

    let (status, body) = service
        .post_json(
            "/v1/verify-2fa",
            json!({ "email": "ada@example.com", "code": code }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "success": true }));

    // The record was consumed; the same code now reads as invalid.
    let (status, body) = service
        .post_json(
            "/v1/verify-2fa",
            json!({ "email": "ada@example.com", "code": code }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "invalid code");
}

#[tokio::test]
async fn a_code_never_issued_reads_as_invalid() {
    let service = TestService::start().await;
    let (status, body) = service
        .post_json(
            "/v1/verify-2fa",
            json!({ "email": "ada@example.com", "code": "000000" }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "invalid code");
}

#[tokio::test]
async fn an_expired_code_is_deleted_and_refused() {
    let service = TestService::start().await;
    service
        .post_json("/v1/send-2fa", json!({ "email": "ada@example.com" }))
        .await;
    let code = code_from(&service.mailer.captured()[0]);

    // Age the record past its 300 second ttl.
    service.platform.age_codes(600);

    let (status, body) = service
        .post_json(
            "/v1/verify-2fa",
            json!({ "email": "ada@example.com", "code": code.clone() }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "code expired");
    assert!(service.platform.codes.lock().is_empty());

    // The stale record is gone, so a retry cannot tell it ever existed.
    let (status, body) = service
        .post_json(
            "/v1/verify-2fa",
            json!({ "email": "ada@example.com", "code": code }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "invalid code");
}

#[tokio::test]
async fn the_newest_code_wins_when_several_are_outstanding() {
    let service = TestService::start().await;
    service
        .post_json("/v1/send-2fa", json!({ "email": "ada@example.com" }))
        .await;
    service
        .post_json("/v1/send-2fa", json!({ "email": "ada@example.com" }))
        .await;

    let captured = service.mailer.captured();
    assert_eq!(captured.len(), 2);
    let newest = code_from(&captured[1]);

    let (status, _) = service
        .post_json(
            "/v1/verify-2fa",
            json!({ "email": "ada@example.com", "code": newest }),
        )
        .await;
    assert_eq!(status, 200);
}

// =============================================================================
// Directory
// =============================================================================

#[tokio::test]
async fn the_directory_lists_every_user() {
    let service = TestService::start().await;
    service.register("ada@example.com", "correct horse").await;
    service.register("grace@example.com", "correct horse").await;

    let response = service
        .http
        .get(format!("{}/v1/users", service.base))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.expect("json body");
    let users = body["users"].as_array().expect("users array");
    assert_eq!(users.len(), 2);
    assert!(users[0]["id"].as_str().is_some());
    let emails: Vec<&str> = users
        .iter()
        .map(|user| user["email"].as_str().unwrap())
        .collect();
    assert!(emails.contains(&"ada@example.com"));
    assert!(emails.contains(&"grace@example.com"));
}
