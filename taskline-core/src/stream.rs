//! Change-stream wire envelopes and task event classification.
//!
//! The platform pushes JSON frames over a WebSocket. Frames are tagged by
//! `type`; event frames carry a list of dotted action strings plus the full
//! document as payload. [`TaskEvent::from_event_data`] turns a frame into
//! the reconciler's input.

use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskId};

/// Builds the subscription channel name for a task collection.
#[must_use]
pub fn task_channel(database_id: &str, collection_id: &str) -> String {
    format!("databases.{database_id}.collections.{collection_id}.documents")
}

/// A frame received from the change stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEnvelope {
    /// First frame after the socket opens.
    Connected {
        /// Channels the subscription covers.
        #[serde(default)]
        channels: Vec<String>,
    },
    /// A document change notification.
    Event {
        /// The change details.
        data: EventData,
    },
    /// Server-reported failure.
    Error {
        /// Error details; shape varies by failure.
        #[serde(default)]
        data: serde_json::Value,
    },
    /// Heartbeat reply.
    Pong,
}

/// Body of an event frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    /// Dotted action strings describing what happened, e.g.
    /// `databases.db.collections.tasks.documents.t1.create`.
    #[serde(default)]
    pub events: Vec<String>,
    /// Channels this event was delivered on.
    #[serde(default)]
    pub channels: Vec<String>,
    /// The full document after the change (or at deletion time).
    pub payload: serde_json::Value,
}

/// The document action carried by an event frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentAction {
    /// A document was created.
    Create,
    /// A document was updated.
    Update,
    /// A document was deleted.
    Delete,
}

/// Extracts the document action from a frame's event strings.
///
/// The first recognized suffix wins; frames about other topics yield `None`.
#[must_use]
pub fn classify_action(events: &[String]) -> Option<DocumentAction> {
    events.iter().find_map(|event| {
        if event.ends_with(".create") {
            Some(DocumentAction::Create)
        } else if event.ends_with(".update") {
            Some(DocumentAction::Update)
        } else if event.ends_with(".delete") {
            Some(DocumentAction::Delete)
        } else {
            None
        }
    })
}

/// A task change consumed by the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A task was created.
    Created(Task),
    /// A task was updated.
    Updated(Task),
    /// A task was deleted.
    Deleted(TaskId),
}

impl TaskEvent {
    /// Returns the id of the task this event refers to.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::Created(task) | Self::Updated(task) => &task.id,
            Self::Deleted(id) => id,
        }
    }

    /// Interprets an event frame as a task change.
    ///
    /// Frames without a recognized action yield `Ok(None)` so callers can
    /// skip unrelated traffic without treating it as a failure.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::MalformedPayload`] when the action is
    /// recognized but the payload does not decode.
    pub fn from_event_data(data: &EventData) -> Result<Option<Self>, StreamError> {
        let Some(action) = classify_action(&data.events) else {
            return Ok(None);
        };
        match action {
            DocumentAction::Create => decode_task(&data.payload).map(Self::Created).map(Some),
            DocumentAction::Update => decode_task(&data.payload).map(Self::Updated).map(Some),
            DocumentAction::Delete => {
                let doc: DeletedRef = serde_json::from_value(data.payload.clone())
                    .map_err(|e| StreamError::MalformedPayload(e.to_string()))?;
                Ok(Some(Self::Deleted(TaskId::new(doc.id))))
            }
        }
    }
}

#[derive(Deserialize)]
struct DeletedRef {
    #[serde(rename = "$id")]
    id: String,
}

fn decode_task(payload: &serde_json::Value) -> Result<Task, StreamError> {
    serde_json::from_value(payload.clone()).map_err(|e| StreamError::MalformedPayload(e.to_string()))
}

/// Error raised while interpreting change-stream frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Frame was not valid JSON or not a known envelope.
    #[error("malformed stream frame: {0}")]
    MalformedFrame(String),
    /// Event payload did not decode as a task document.
    #[error("malformed task payload: {0}")]
    MalformedPayload(String),
}

/// Decodes a text frame into a [`StreamEnvelope`].
///
/// # Errors
///
/// Returns [`StreamError::MalformedFrame`] when the text is not a valid
/// envelope.
pub fn decode_envelope(text: &str) -> Result<StreamEnvelope, StreamError> {
    serde_json::from_str(text).map_err(|e| StreamError::MalformedFrame(e.to_string()))
}
