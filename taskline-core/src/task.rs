//! Task model and mutation payloads for `Taskline`.
//!
//! [`Task`] mirrors a document stored in the hosted backend: it carries the
//! platform metadata fields (`$id`, `$createdAt`) inline, exactly as they
//! appear on the wire. [`TaskDraft`] and [`TaskPatch`] are the outbound
//! create/update payloads; both are validated locally before any request is
//! issued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::UserId;

/// Maximum allowed task title length in characters.
pub const MAX_TITLE_LENGTH: usize = 255;

/// Maximum allowed task description length in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

/// Opaque unique identifier for a task, assigned by the external store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a task identifier from its string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a task in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Task has been created but not started.
    #[default]
    Pending,
    /// Task is actively being worked on.
    InProgress,
    /// Task has been finished.
    Completed,
    /// Task was abandoned without completion.
    Cancelled,
}

impl TaskStatus {
    /// Returns the wire form of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status from its wire form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// True for statuses that end the task's lifecycle.
    ///
    /// Closed tasks are excluded from deadline classification.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority, constrained to 1 (lowest) through 5 (highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    /// Lowest allowed priority value.
    pub const MIN: u8 = 1;
    /// Highest allowed priority value.
    pub const MAX: u8 = 5;

    /// Creates a priority, rejecting values outside 1..=5.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::PriorityOutOfRange`] for values outside the
    /// allowed range.
    pub const fn new(value: u8) -> Result<Self, ValidationError> {
        if value >= Self::MIN && value <= Self::MAX {
            Ok(Self(value))
        } else {
            Err(ValidationError::PriorityOutOfRange(value))
        }
    }

    /// Returns the numeric priority value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u8> for Priority {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a task payload fails local validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Title is missing or blank.
    #[error("title is required")]
    TitleEmpty,
    /// Title exceeds the maximum allowed length.
    #[error("title too long ({len} chars, max {max})")]
    TitleTooLong {
        /// Actual title length in characters.
        len: usize,
        /// Maximum allowed length in characters.
        max: usize,
    },
    /// Description exceeds the maximum allowed length.
    #[error("description too long ({len} chars, max {max})")]
    DescriptionTooLong {
        /// Actual description length in characters.
        len: usize,
        /// Maximum allowed length in characters.
        max: usize,
    },
    /// Priority lies outside the 1..=5 range.
    #[error("priority {0} out of range ({min}-{max})", min = Priority::MIN, max = Priority::MAX)]
    PriorityOutOfRange(u8),
}

/// A task document as stored in the hosted backend.
///
/// `id` and `created_at` are server-assigned; the reconciler only mirrors
/// them, it never fabricates either. An unassigned task is carried on the
/// wire as an empty `assignedTo` string and decoded to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned document identifier.
    #[serde(rename = "$id")]
    pub id: TaskId,
    /// Short human-readable summary. Required, at most 255 characters.
    pub title: String,
    /// Optional longer body, at most 1000 characters.
    #[serde(default)]
    pub description: Option<String>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Importance from 1 (lowest) to 5 (highest).
    pub priority: Priority,
    /// When the task is due, if a deadline was set.
    #[serde(rename = "dueDate", default)]
    pub due_date: Option<DateTime<Utc>>,
    /// User the task is assigned to, if any.
    #[serde(rename = "assignedTo", default, with = "assignee_wire")]
    pub assigned_to: Option<UserId>,
    /// Server-assigned creation timestamp. Immutable.
    #[serde(rename = "$createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// True when `user` may edit this task.
    ///
    /// A display affordance only. Real authorization is enforced by the
    /// store's policy layer, never trusted from this side.
    #[must_use]
    pub fn editable_by(&self, user: &UserId) -> bool {
        self.assigned_to.as_ref() == Some(user)
    }
}

/// Payload for creating a task. The store assigns `id` and `createdAt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    /// Short human-readable summary. Required, at most 255 characters.
    pub title: String,
    /// Optional longer body, at most 1000 characters.
    #[serde(default)]
    pub description: Option<String>,
    /// Initial lifecycle status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Importance from 1 (lowest) to 5 (highest).
    #[serde(default)]
    pub priority: Priority,
    /// When the task is due, if a deadline was set.
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    /// User the task is assigned to, if any.
    #[serde(default, with = "assignee_wire")]
    pub assigned_to: Option<UserId>,
}

impl TaskDraft {
    /// Creates a draft with the given title and default fields
    /// (pending, priority 1, no deadline, unassigned).
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: TaskStatus::default(),
            priority: Priority::default(),
            due_date: None,
            assigned_to: None,
        }
    }

    /// Validates this draft before it is sent to the store.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TitleEmpty`] or
    /// [`ValidationError::TitleTooLong`] for a bad title, and
    /// [`ValidationError::DescriptionTooLong`] for an oversized description.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)?;
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        Ok(())
    }
}

/// Partial update for a task. `None` fields are left untouched by the store.
///
/// `description`, `due_date`, and `assigned_to` distinguish "leave as is"
/// (outer `None`) from "clear the field" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    /// New title, if it should change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description; `Some(None)` clears it.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "clearable")]
    pub description: Option<Option<String>>,
    /// New lifecycle status, if it should change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// New priority, if it should change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// New deadline; `Some(None)` removes it.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "clearable")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    /// New assignee; `Some(None)` unassigns (empty string on the wire).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "assignee_patch_wire"
    )]
    pub assigned_to: Option<Option<UserId>>,
}

impl TaskPatch {
    /// True when the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.assigned_to.is_none()
    }

    /// Validates the fields this patch touches.
    ///
    /// # Errors
    ///
    /// Returns the same [`ValidationError`] variants as
    /// [`TaskDraft::validate`] for the fields present in the patch.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(Some(description)) = &self.description {
            validate_description(description)?;
        }
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::TitleEmpty);
    }
    let len = title.chars().count();
    if len > MAX_TITLE_LENGTH {
        return Err(ValidationError::TitleTooLong {
            len,
            max: MAX_TITLE_LENGTH,
        });
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), ValidationError> {
    let len = description.chars().count();
    if len > MAX_DESCRIPTION_LENGTH {
        return Err(ValidationError::DescriptionTooLong {
            len,
            max: MAX_DESCRIPTION_LENGTH,
        });
    }
    Ok(())
}

/// Serde adapter mapping the wire's empty-string assignee to `None`.
mod assignee_wire {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::user::UserId;

    pub fn serialize<S: Serializer>(
        value: &Option<UserId>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(id) => serializer.serialize_str(id.as_str()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<UserId>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.filter(|id| !id.is_empty()).map(UserId::new))
    }
}

/// Serde adapter for patch fields that can be explicitly cleared: the outer
/// `Option` is handled by `skip_serializing_if`, the inner one maps to null.
mod clearable {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer, T: Serialize>(
        value: &Option<Option<T>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>, T: Deserialize<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<T>>, D::Error> {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// Serde adapter for the assignee patch field: unassigning is an empty
/// string on the wire, not null.
mod assignee_patch_wire {
    use serde::{Deserializer, Serializer};

    use crate::user::UserId;

    pub fn serialize<S: Serializer>(
        value: &Option<Option<UserId>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(inner) => super::assignee_wire::serialize(inner, serializer),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<UserId>>, D::Error> {
        super::assignee_wire::deserialize(deserializer).map(Some)
    }
}
