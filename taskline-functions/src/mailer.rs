//! Outgoing mail transport for the 2FA proxy.
//!
//! Production hands messages to an HTTP mail relay; the SMTP bridge
//! behind it stays a black box. The in-memory variant captures messages
//! so tests (and relay-less local runs) can inspect what would have been
//! sent.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use crate::admin::{ProxyError, REQUEST_TIMEOUT};

/// An outgoing message as handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    /// Destination address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Mail transport selected at startup.
///
/// Clones of the memory variant share one capture buffer.
#[derive(Debug, Clone)]
pub enum Mailer {
    /// POSTs messages to an HTTP mail relay endpoint.
    HttpRelay {
        /// Shared HTTP client.
        http: reqwest::Client,
        /// Relay endpoint the messages are posted to.
        relay_url: String,
        /// From-address stamped on every message.
        from: String,
    },
    /// Captures messages in memory instead of sending them.
    Memory(Arc<Mutex<Vec<SentMail>>>),
}

impl Mailer {
    /// Builds the HTTP relay transport.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Http`] when the HTTP client cannot be
    /// constructed.
    pub fn http_relay(
        relay_url: impl Into<String>,
        from: impl Into<String>,
    ) -> Result<Self, ProxyError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::HttpRelay {
            http,
            relay_url: relay_url.into(),
            from: from.into(),
        })
    }

    /// Builds the capturing in-memory transport.
    #[must_use]
    pub fn memory() -> Self {
        Self::Memory(Arc::new(Mutex::new(Vec::new())))
    }

    /// Hands one message to the transport.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Mail`] when the relay cannot be reached or
    /// answers with a non-success status.
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ProxyError> {
        match self {
            Self::HttpRelay {
                http,
                relay_url,
                from,
            } => {
                let message = json!({
                    "from": from,
                    "to": to,
                    "subject": subject,
                    "text": body,
                });
                let response = http
                    .post(relay_url)
                    .json(&message)
                    .send()
                    .await
                    .map_err(|e| ProxyError::Mail(e.to_string()))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(ProxyError::Mail(format!(
                        "mail relay returned HTTP {status}"
                    )));
                }
                Ok(())
            }
            Self::Memory(sent) => {
                tracing::debug!(to = %to, subject = %subject, "captured outgoing mail");
                sent.lock().push(SentMail {
                    to: to.to_string(),
                    subject: subject.to_string(),
                    body: body.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Messages captured by the memory transport, oldest first.
    ///
    /// Always empty for the relay variant.
    #[must_use]
    pub fn captured(&self) -> Vec<SentMail> {
        match self {
            Self::HttpRelay { .. } => Vec::new(),
            Self::Memory(sent) => sent.lock().clone(),
        }
    }
}
