//! Due-date classification and notification derivation.
//!
//! [`classify`] is a pure function of `(task, now)`. Day truncation happens
//! in `now`'s time zone, so interactive callers pass local time while tests
//! pass fixed UTC instants. Notifications are recomputed from scratch on
//! every pass and never persisted.

use chrono::{DateTime, Days, TimeZone, Utc};

use crate::task::{Task, TaskId};
use crate::user::UserId;

/// How far ahead, in days, the due-soon window extends.
pub const DUE_SOON_WINDOW_DAYS: u64 = 7;

/// A discrete due-date classification for an open task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Due day is in the past.
    Overdue {
        /// Whole days elapsed since the due day.
        days_overdue: i64,
    },
    /// Due day is the current calendar day.
    DueToday,
    /// Due day is the next calendar day.
    DueTomorrow,
    /// Due day falls within the next week.
    DueSoon {
        /// Whole days until the due day.
        days_until: i64,
    },
}

impl NotificationKind {
    /// Stable key used in notification ids.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Overdue { .. } => "overdue",
            Self::DueToday => "today",
            Self::DueTomorrow => "tomorrow",
            Self::DueSoon { .. } => "upcoming",
        }
    }

    /// Display ordering weight for this kind.
    #[must_use]
    pub const fn rank(self) -> PriorityRank {
        match self {
            Self::Overdue { .. } => PriorityRank::High,
            Self::DueToday | Self::DueTomorrow => PriorityRank::Medium,
            Self::DueSoon { .. } => PriorityRank::Low,
        }
    }
}

/// Ordering weight for notifications. Higher ranks sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PriorityRank {
    /// Due-soon notifications.
    Low = 1,
    /// Due-today and due-tomorrow notifications.
    Medium = 2,
    /// Overdue notifications.
    High = 3,
}

/// A derived deadline notification for a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Deterministic id, `"{kind key}-{task id}"`. Used for dedup.
    pub id: String,
    /// Which bucket the task fell into.
    pub kind: NotificationKind,
    /// Display ordering weight.
    pub rank: PriorityRank,
    /// The task this notification refers to.
    pub task_id: TaskId,
    /// Title of the source task at classification time.
    pub title: String,
    /// Deadline of the source task.
    pub due_date: DateTime<Utc>,
    /// Human-readable message.
    pub message: String,
}

/// Classifies a task's deadline relative to `now`.
///
/// Returns `None` for closed tasks, tasks without a deadline, and tasks due
/// beyond the due-soon window.
#[must_use]
pub fn classify<Tz: TimeZone>(task: &Task, now: &DateTime<Tz>) -> Option<NotificationKind> {
    if task.status.is_closed() {
        return None;
    }
    let due = task.due_date?;
    let due_day = due.with_timezone(&now.timezone()).date_naive();
    let today = now.date_naive();

    if due_day < today {
        return Some(NotificationKind::Overdue {
            days_overdue: (today - due_day).num_days(),
        });
    }
    if due_day == today {
        return Some(NotificationKind::DueToday);
    }
    let tomorrow = today.succ_opt()?;
    if due_day == tomorrow {
        return Some(NotificationKind::DueTomorrow);
    }
    let week_out = today.checked_add_days(Days::new(DUE_SOON_WINDOW_DAYS))?;
    if due_day <= week_out {
        return Some(NotificationKind::DueSoon {
            days_until: (due_day - today).num_days(),
        });
    }
    None
}

/// Builds the sorted notification set for the tasks assigned to `user`.
///
/// Ordering: rank descending, then deadline ascending within equal rank.
/// One notification per task; a duplicate task in the input produces a
/// duplicate id and is dropped.
#[must_use]
pub fn notifications<Tz: TimeZone>(
    tasks: &[Task],
    user: &UserId,
    now: &DateTime<Tz>,
) -> Vec<Notification> {
    let mut out: Vec<Notification> = Vec::new();
    for task in tasks {
        if task.assigned_to.as_ref() != Some(user) {
            continue;
        }
        let Some(kind) = classify(task, now) else {
            continue;
        };
        let Some(due_date) = task.due_date else {
            continue;
        };
        let id = format!("{}-{}", kind.key(), task.id);
        if out.iter().any(|existing| existing.id == id) {
            continue;
        }
        out.push(Notification {
            id,
            kind,
            rank: kind.rank(),
            task_id: task.id.clone(),
            title: task.title.clone(),
            due_date,
            message: message_for(&task.title, kind),
        });
    }
    out.sort_by(|a, b| b.rank.cmp(&a.rank).then_with(|| a.due_date.cmp(&b.due_date)));
    out
}

fn message_for(title: &str, kind: NotificationKind) -> String {
    match kind {
        NotificationKind::Overdue { days_overdue } => format!(
            "Task \"{title}\" is {days_overdue} day{} overdue",
            plural(days_overdue)
        ),
        NotificationKind::DueToday => format!("Task \"{title}\" is due today"),
        NotificationKind::DueTomorrow => format!("Task \"{title}\" is due tomorrow"),
        NotificationKind::DueSoon { days_until } => format!(
            "Task \"{title}\" is due in {days_until} day{}",
            plural(days_until)
        ),
    }
}

const fn plural(n: i64) -> &'static str {
    if n > 1 { "s" } else { "" }
}
