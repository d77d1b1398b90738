//! Request and response shapes for the serverless proxy functions.
//!
//! Shared by the client (which calls the functions service) and the
//! functions service itself. Requests keep loose optional fields so the
//! service can answer missing-field errors in its own response shape
//! instead of failing at decode time.

use serde::{Deserialize, Serialize};

use crate::user::User;

/// Number of digits in a 2FA code.
pub const TWOFA_CODE_LENGTH: usize = 6;

/// Default lifetime of a 2FA code, in seconds.
pub const DEFAULT_CODE_TTL_SECS: u64 = 300;

/// Actions accepted by the authenticate proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    /// Create an email/password session.
    Login,
    /// Create an account and a session for it.
    Register,
    /// Start a password recovery flow.
    Recovery,
    /// Complete a password recovery flow.
    ResetPassword,
    /// Fetch a user record by id.
    GetUser,
}

impl AuthAction {
    /// Parses the wire form of an action.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "login" => Some(Self::Login),
            "register" => Some(Self::Register),
            "recovery" => Some(Self::Recovery),
            "resetPassword" => Some(Self::ResetPassword),
            "getUser" => Some(Self::GetUser),
            _ => None,
        }
    }

    /// Returns the wire form of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::Recovery => "recovery",
            Self::ResetPassword => "resetPassword",
            Self::GetUser => "getUser",
        }
    }
}

impl std::fmt::Display for AuthAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body for the authenticate proxy.
///
/// `action` stays a raw string so an unknown action can be answered with
/// the proxy's own invalid-action response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    /// Requested action, e.g. `"login"`.
    #[serde(default)]
    pub action: String,
    /// Account email, for login/register/recovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Account password, for login/register/resetPassword.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Target user id, for getUser/resetPassword.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Recovery secret, for resetPassword.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Password confirmation, for resetPassword.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_again: Option<String>,
    /// Redirect target for recovery emails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl AuthRequest {
    /// Returns the parsed action, if recognized.
    #[must_use]
    pub fn parsed_action(&self) -> Option<AuthAction> {
        AuthAction::parse(&self.action)
    }
}

/// Failure response shared by every proxy endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyFailure {
    /// Always false.
    pub success: bool,
    /// Human-readable description.
    pub error: String,
    /// Upstream status code, when one exists.
    #[serde(default)]
    pub code: u16,
}

impl ProxyFailure {
    /// Builds a failure response.
    #[must_use]
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            success: false,
            error: error.into(),
            code,
        }
    }
}

/// Request body for the send-2fa proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendCodeRequest {
    /// Destination email address.
    #[serde(default)]
    pub email: Option<String>,
}

/// Request body for the verify-2fa proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyCodeRequest {
    /// Email the code was sent to.
    #[serde(default)]
    pub email: Option<String>,
    /// The 6-digit code being verified.
    #[serde(default)]
    pub code: Option<String>,
}

/// Response body for both 2FA proxies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoFaResponse {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Failure description, when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TwoFaResponse {
    /// A success response.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// A failure response with the given description.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// A 2FA code record as stored in the platform database.
///
/// `createdAt` lives in the document metadata
/// ([`crate::document::Document`]), not the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoFaRecord {
    /// Email the code was issued for.
    pub email: String,
    /// The 6-digit code.
    pub code: String,
    /// Lifetime in seconds from creation.
    pub ttl: u64,
}

/// Response body for the directory function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryResponse {
    /// Every known user.
    pub users: Vec<User>,
}
