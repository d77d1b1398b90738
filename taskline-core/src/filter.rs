//! Composable task filtering over immutable snapshots.
//!
//! All predicates are ANDed. [`TaskFilters::apply`] never mutates its input
//! and is idempotent; due-bucket predicates share the classifier's
//! day-truncation rule (truncate in `now`'s time zone).

use chrono::{DateTime, Days, NaiveDate, TimeZone};

use crate::deadline::DUE_SOON_WINDOW_DAYS;
use crate::task::{Priority, Task, TaskStatus};
use crate::user::UserId;

/// Status predicate: everything, or one exact status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    /// No status filtering.
    #[default]
    All,
    /// Only tasks with this exact status.
    Only(TaskStatus),
}

/// Priority predicate: everything, or one exact priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PriorityFilter {
    /// No priority filtering.
    #[default]
    All,
    /// Only tasks with this exact priority.
    Only(Priority),
}

/// Assignee predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AssigneeFilter {
    /// No assignee filtering.
    #[default]
    All,
    /// Only tasks with no assignee.
    Unassigned,
    /// Only tasks assigned to this user.
    User(UserId),
}

/// Due-date bucket predicate, relative to the invocation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DueFilter {
    /// No due-date filtering.
    #[default]
    All,
    /// Due day strictly before today.
    Overdue,
    /// Due day is today.
    Today,
    /// Due day between today and a week out, inclusive on both ends.
    ThisWeek,
    /// No due date set. The only bucket matching date-less tasks.
    NoDate,
    /// Due day strictly beyond the one-week window.
    Future,
}

/// A composable set of task predicates.
///
/// The default value matches every task ("clear all filters").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilters {
    /// Case-insensitive substring match against title or description.
    /// Empty matches all.
    pub search: String,
    /// Status predicate.
    pub status: StatusFilter,
    /// Priority predicate.
    pub priority: PriorityFilter,
    /// Assignee predicate.
    pub assignee: AssigneeFilter,
    /// Due-date bucket predicate.
    pub due: DueFilter,
}

impl TaskFilters {
    /// True when `task` passes every predicate.
    #[must_use]
    pub fn matches<Tz: TimeZone>(&self, task: &Task, now: &DateTime<Tz>) -> bool {
        self.matches_search(task)
            && self.matches_status(task)
            && self.matches_priority(task)
            && self.matches_assignee(task)
            && self.matches_due(task, now)
    }

    /// Returns the tasks passing every predicate, in input order.
    ///
    /// The input is never mutated; the result is a fresh sequence.
    #[must_use]
    pub fn apply<Tz: TimeZone>(&self, tasks: &[Task], now: &DateTime<Tz>) -> Vec<Task> {
        tasks
            .iter()
            .filter(|task| self.matches(task, now))
            .cloned()
            .collect()
    }

    /// Number of predicates that differ from their defaults.
    #[must_use]
    pub fn active_count(&self) -> usize {
        usize::from(!self.search.is_empty())
            + usize::from(self.status != StatusFilter::All)
            + usize::from(self.priority != PriorityFilter::All)
            + usize::from(self.assignee != AssigneeFilter::All)
            + usize::from(self.due != DueFilter::All)
    }

    fn matches_search(&self, task: &Task) -> bool {
        if self.search.is_empty() {
            return true;
        }
        let needle = self.search.to_lowercase();
        if task.title.to_lowercase().contains(&needle) {
            return true;
        }
        task.description
            .as_deref()
            .is_some_and(|description| description.to_lowercase().contains(&needle))
    }

    fn matches_status(&self, task: &Task) -> bool {
        match self.status {
            StatusFilter::All => true,
            StatusFilter::Only(status) => task.status == status,
        }
    }

    fn matches_priority(&self, task: &Task) -> bool {
        match self.priority {
            PriorityFilter::All => true,
            PriorityFilter::Only(priority) => task.priority == priority,
        }
    }

    fn matches_assignee(&self, task: &Task) -> bool {
        match &self.assignee {
            AssigneeFilter::All => true,
            AssigneeFilter::Unassigned => task.assigned_to.is_none(),
            AssigneeFilter::User(user) => task.assigned_to.as_ref() == Some(user),
        }
    }

    fn matches_due<Tz: TimeZone>(&self, task: &Task, now: &DateTime<Tz>) -> bool {
        match self.due {
            DueFilter::All => true,
            DueFilter::NoDate => task.due_date.is_none(),
            DueFilter::Overdue => day_context(task, now).is_some_and(|ctx| ctx.due < ctx.today),
            DueFilter::Today => day_context(task, now).is_some_and(|ctx| ctx.due == ctx.today),
            DueFilter::ThisWeek => day_context(task, now)
                .is_some_and(|ctx| ctx.due >= ctx.today && ctx.due <= ctx.week_out),
            DueFilter::Future => day_context(task, now).is_some_and(|ctx| ctx.due > ctx.week_out),
        }
    }
}

struct DayContext {
    due: NaiveDate,
    today: NaiveDate,
    week_out: NaiveDate,
}

fn day_context<Tz: TimeZone>(task: &Task, now: &DateTime<Tz>) -> Option<DayContext> {
    let due = task.due_date?.with_timezone(&now.timezone()).date_naive();
    let today = now.date_naive();
    let week_out = today.checked_add_days(Days::new(DUE_SOON_WINDOW_DAYS))?;
    Some(DayContext {
        due,
        today,
        week_out,
    })
}
