//! Bindings for the functions service (directory and 2FA proxies).

use taskline_core::proxy::{SendCodeRequest, TwoFaResponse, VerifyCodeRequest};
use taskline_core::user::{User, normalize_directory};

use super::{ApiError, ErrorKind, REQUEST_TIMEOUT};

/// Functions service seam.
///
/// The identity resolver is generic over this trait; [`FunctionsClient`]
/// is the production implementation.
pub trait FunctionsApi: Send + Sync {
    /// Fetch the full user directory.
    fn fetch_users(&self) -> impl std::future::Future<Output = Result<Vec<User>, ApiError>> + Send;

    /// Ask the service to email a fresh 2FA code.
    fn send_code(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Verify (and consume) a previously emailed 2FA code.
    fn verify_code(
        &self,
        email: &str,
        code: &str,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;
}

/// HTTP client for the functions service.
#[derive(Debug, Clone)]
pub struct FunctionsClient {
    http: reqwest::Client,
    base: String,
}

impl FunctionsClient {
    /// Builds a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::BadUrl`] for an unparseable base URL and
    /// [`ApiError::Http`] when the HTTP client cannot be constructed.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let base = url::Url::parse(base_url)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base: base.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base)
    }

    /// Folds a 2FA proxy response into `Ok` or a categorized error.
    async fn take_twofa(response: reqwest::Response) -> Result<(), ApiError> {
        let status = response.status().as_u16();
        let body: TwoFaResponse = response.json().await?;
        if body.success {
            return Ok(());
        }
        let message = body
            .error
            .unwrap_or_else(|| format!("functions service returned HTTP {status}"));
        let kind = match message.as_str() {
            "code expired" => ErrorKind::Expired,
            "invalid code" => ErrorKind::NotFound,
            _ => ErrorKind::Other,
        };
        Err(ApiError::Platform {
            status,
            kind,
            message,
        })
    }
}

impl FunctionsApi for FunctionsClient {
    async fn fetch_users(&self) -> Result<Vec<User>, ApiError> {
        let response = self.http.get(self.url("v1/users")).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Platform {
                status: status.as_u16(),
                kind: ErrorKind::Other,
                message: format!("directory fetch returned HTTP {status}"),
            });
        }
        let payload: serde_json::Value = response.json().await?;
        normalize_directory(&payload).map_err(|e| ApiError::Payload(e.to_string()))
    }

    async fn send_code(&self, email: &str) -> Result<(), ApiError> {
        let body = SendCodeRequest {
            email: Some(email.to_string()),
        };
        let response = self
            .http
            .post(self.url("v1/send-2fa"))
            .json(&body)
            .send()
            .await?;
        Self::take_twofa(response).await
    }

    async fn verify_code(&self, email: &str, code: &str) -> Result<(), ApiError> {
        let body = VerifyCodeRequest {
            email: Some(email.to_string()),
            code: Some(code.to_string()),
        };
        let response = self
            .http
            .post(self.url("v1/verify-2fa"))
            .json(&body)
            .send()
            .await?;
        Self::take_twofa(response).await
    }
}
