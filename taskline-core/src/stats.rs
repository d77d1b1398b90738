//! Status summaries over task snapshots.

use std::collections::HashMap;

use serde::Serialize;

use crate::task::{Task, TaskStatus};
use crate::user::UserId;

/// Counts of tasks per lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// Total number of tasks.
    pub total: usize,
    /// Tasks not yet started.
    pub pending: usize,
    /// Tasks in progress.
    pub in_progress: usize,
    /// Finished tasks.
    pub completed: usize,
    /// Abandoned tasks.
    pub cancelled: usize,
}

impl StatusCounts {
    /// Adds one task with the given status to the counts.
    pub const fn record(&mut self, status: TaskStatus) {
        self.total += 1;
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
    }
}

/// Summarizes a task snapshot into per-status counts.
#[must_use]
pub fn summarize(tasks: &[Task]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for task in tasks {
        counts.record(task.status);
    }
    counts
}

/// Groups per-status counts by assignee. The `None` key collects
/// unassigned tasks.
#[must_use]
pub fn by_assignee(tasks: &[Task]) -> HashMap<Option<UserId>, StatusCounts> {
    let mut groups: HashMap<Option<UserId>, StatusCounts> = HashMap::new();
    for task in tasks {
        groups
            .entry(task.assigned_to.clone())
            .or_default()
            .record(task.status);
    }
    groups
}
