//! 2FA code issue and verification.
//!
//! Codes are six-digit numbers persisted in a platform collection with a
//! per-record ttl and emailed through the configured [`Mailer`]. A code
//! is consumed on first successful verification; expired records are
//! deleted when seen, so a retry with a stale code reads as invalid.

use chrono::{DateTime, Utc};
use rand::Rng;
use taskline_core::document::CreateDocument;
use taskline_core::proxy::TwoFaRecord;
use uuid::Uuid;

use crate::admin::{AdminClient, ProxyError};
use crate::mailer::Mailer;

/// Subject line on every code email.
const CODE_SUBJECT: &str = "Your 2FA code";

/// Outcome of a verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    /// The code matched and the record was consumed.
    Valid,
    /// No stored record matches this email and code.
    Invalid,
    /// The newest matching record had outlived its ttl; it was deleted.
    Expired,
}

/// Issues and verifies 2FA codes against the platform code collection.
#[derive(Debug, Clone)]
pub struct TwoFa {
    admin: AdminClient,
    mailer: Mailer,
    database_id: String,
    collection_id: String,
    ttl_secs: u64,
}

impl TwoFa {
    /// Bundles the admin handle, mail transport, and collection
    /// coordinates for the 2FA endpoints.
    pub fn new(
        admin: AdminClient,
        mailer: Mailer,
        database_id: impl Into<String>,
        collection_id: impl Into<String>,
        ttl_secs: u64,
    ) -> Self {
        Self {
            admin,
            mailer,
            database_id: database_id.into(),
            collection_id: collection_id.into(),
            ttl_secs,
        }
    }

    /// Generates a fresh code, persists it, and emails it.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Platform`] when the record cannot be stored
    /// and [`ProxyError::Mail`] when the hand-off fails. A failed
    /// hand-off leaves the record behind; it ages out via its ttl.
    pub async fn send_code(&self, email: &str) -> Result<(), ProxyError> {
        let code = generate_code();
        let record = TwoFaRecord {
            email: email.to_string(),
            code: code.clone(),
            ttl: self.ttl_secs,
        };
        let body = CreateDocument {
            document_id: Uuid::now_v7().to_string(),
            data: record,
        };
        self.admin
            .create_document(&self.database_id, &self.collection_id, &body)
            .await?;
        self.mailer
            .send(email, CODE_SUBJECT, &code_body(&code, self.ttl_secs))
            .await?;
        tracing::debug!(to = %email, "2fa code issued");
        Ok(())
    }

    /// Checks a code against the newest matching record.
    ///
    /// Both outcomes that find a record delete it, so a code can be
    /// consumed exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Platform`] when the lookup or the delete
    /// fails; the check itself never errors.
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<CodeCheck, ProxyError> {
        let query = [
            ("email", email.to_string()),
            ("code", code.to_string()),
            ("order", "desc".to_string()),
            ("limit", "1".to_string()),
        ];
        let list = self
            .admin
            .list_documents::<TwoFaRecord>(&self.database_id, &self.collection_id, &query)
            .await?;
        let Some(record) = list.documents.into_iter().next() else {
            return Ok(CodeCheck::Invalid);
        };

        self.admin
            .delete_document(&self.database_id, &self.collection_id, &record.id)
            .await?;
        if expired(record.created_at, record.data.ttl, Utc::now()) {
            tracing::debug!(to = %email, "2fa code had expired");
            return Ok(CodeCheck::Expired);
        }
        Ok(CodeCheck::Valid)
    }
}

/// A random six-digit code, `100000` through `999999`.
fn generate_code() -> String {
    rand::rng().random_range(100_000..=999_999_u32).to_string()
}

/// Body text for the code email.
fn code_body(code: &str, ttl_secs: u64) -> String {
    format!(
        "Your verification code is {code}. It expires in {} minutes.",
        ttl_secs / 60
    )
}

/// True when `now` is strictly past the record's lifetime.
fn expired(created_at: DateTime<Utc>, ttl_secs: u64, now: DateTime<Utc>) -> bool {
    let ttl = chrono::Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX));
    now.signed_duration_since(created_at) > ttl
}
