//! Wire shapes for the hosted platform's document and error APIs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel document id instructing the platform to generate one.
pub const UNIQUE_ID: &str = "unique()";

/// Header naming the project on every platform request.
pub const PROJECT_HEADER: &str = "X-Platform-Project";

/// Header carrying the session secret on authenticated client requests.
pub const SESSION_HEADER: &str = "X-Platform-Session";

/// Header carrying the server API key on admin requests.
pub const API_KEY_HEADER: &str = "X-Platform-Key";

/// Envelope around a stored payload that keeps the platform metadata
/// separate from the document body.
///
/// Task documents inline their metadata instead (see
/// [`crate::task::Task`]); this envelope is for payloads defined by this
/// system, such as 2FA code records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document<T> {
    /// Store-assigned document identifier.
    #[serde(rename = "$id")]
    pub id: String,
    /// Store-assigned creation timestamp.
    #[serde(rename = "$createdAt")]
    pub created_at: DateTime<Utc>,
    /// The document body.
    #[serde(flatten)]
    pub data: T,
}

/// A page of documents returned by a list call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentList<T> {
    /// Total number of matching documents in the collection.
    pub total: u64,
    /// The returned page.
    pub documents: Vec<T>,
}

/// Request body for creating a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocument<T> {
    /// Requested document id, usually [`UNIQUE_ID`].
    pub document_id: String,
    /// The document body.
    pub data: T,
}

impl<T> CreateDocument<T> {
    /// Wraps a payload with the store-generates-the-id sentinel.
    pub fn with_unique_id(data: T) -> Self {
        Self {
            document_id: UNIQUE_ID.to_string(),
            data,
        }
    }
}

/// Error body returned by the platform API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable description.
    #[serde(default)]
    pub message: String,
    /// Platform status code, usually mirroring the HTTP status.
    #[serde(default)]
    pub code: u16,
    /// Machine-readable error type, e.g. `user_invalid_credentials`.
    #[serde(rename = "type", default)]
    pub kind: String,
}
