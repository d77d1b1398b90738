//! Property-based tests for filtering and deadline classification.
//!
//! Uses proptest to verify:
//! 1. Filtering is idempotent: applying the same filter set twice equals
//!    applying it once.
//! 2. Filtering is narrowing: adding a predicate always selects a subset.
//! 3. Closed or date-less tasks never classify, whatever the deadline.
//! 4. Notification ordering is rank-descending, deadline-ascending.
//! 5. Status summaries always account for every input task.

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use taskline_core::deadline::{self, NotificationKind};
use taskline_core::filter::{
    AssigneeFilter, DueFilter, PriorityFilter, StatusFilter, TaskFilters,
};
use taskline_core::stats;
use taskline_core::task::{Priority, Task, TaskId, TaskStatus};
use taskline_core::user::UserId;

/// Fixed reference instant; strategies generate deadlines around it.
fn fixed_now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_718_020_800, 0).expect("valid timestamp") // 2024-06-10T12:00:00Z
}

/// Strategy for generating arbitrary `TaskStatus` values.
fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Pending),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Completed),
        Just(TaskStatus::Cancelled),
    ]
}

/// Strategy for generating arbitrary `Priority` values.
fn arb_priority() -> impl Strategy<Value = Priority> {
    (Priority::MIN..=Priority::MAX).prop_map(|value| Priority::new(value).expect("in range"))
}

/// Strategy for optional deadlines within a month either side of now.
fn arb_due_date() -> impl Strategy<Value = Option<DateTime<Utc>>> {
    prop::option::of((-30i64..30).prop_map(|days| {
        fixed_now() + chrono::Duration::days(days)
    }))
}

/// Strategy for assignees drawn from a small pool, so filters select.
fn arb_assignee() -> impl Strategy<Value = Option<UserId>> {
    prop::option::of(
        prop::sample::select(vec!["user-a", "user-b", "user-c"]).prop_map(UserId::new),
    )
}

/// Strategy for generating arbitrary tasks.
fn arb_task(index: usize) -> impl Strategy<Value = Task> {
    (
        "[a-z ]{1,40}",
        prop::option::of("[a-z ]{0,80}"),
        arb_status(),
        arb_priority(),
        arb_due_date(),
        arb_assignee(),
    )
        .prop_map(
            move |(title, description, status, priority, due_date, assigned_to)| Task {
                id: TaskId::new(format!("task-{index}")),
                title,
                description,
                status,
                priority,
                due_date,
                assigned_to,
                created_at: fixed_now(),
            },
        )
}

/// Strategy for lists of tasks with distinct ids.
fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
    (0usize..12).prop_flat_map(|len| (0..len).map(arb_task).collect::<Vec<_>>())
}

/// Strategy for generating arbitrary filter sets.
fn arb_filters() -> impl Strategy<Value = TaskFilters> {
    (
        prop_oneof![Just(String::new()), "[a-z]{1,5}".prop_map(String::from)],
        prop_oneof![
            Just(StatusFilter::All),
            arb_status().prop_map(StatusFilter::Only),
        ],
        prop_oneof![
            Just(PriorityFilter::All),
            arb_priority().prop_map(PriorityFilter::Only),
        ],
        prop_oneof![
            Just(AssigneeFilter::All),
            Just(AssigneeFilter::Unassigned),
            prop::sample::select(vec!["user-a", "user-b", "user-c"])
                .prop_map(|id| AssigneeFilter::User(UserId::new(id))),
        ],
        prop_oneof![
            Just(DueFilter::All),
            Just(DueFilter::Overdue),
            Just(DueFilter::Today),
            Just(DueFilter::ThisWeek),
            Just(DueFilter::NoDate),
            Just(DueFilter::Future),
        ],
    )
        .prop_map(|(search, status, priority, assignee, due)| TaskFilters {
            search,
            status,
            priority,
            assignee,
            due,
        })
}

proptest! {
    /// Applying the same filter set twice yields the same result.
    #[test]
    fn filtering_is_idempotent(tasks in arb_tasks(), filters in arb_filters()) {
        let now = fixed_now();
        let once = filters.apply(&tasks, &now);
        let twice = filters.apply(&once, &now);
        prop_assert_eq!(once, twice);
    }

    /// Filtering never invents tasks and preserves input order.
    #[test]
    fn filtering_selects_an_ordered_subset(tasks in arb_tasks(), filters in arb_filters()) {
        let now = fixed_now();
        let filtered = filters.apply(&tasks, &now);
        prop_assert!(filtered.len() <= tasks.len());

        let mut cursor = 0;
        for task in &filtered {
            let position = tasks[cursor..]
                .iter()
                .position(|candidate| candidate.id == task.id);
            prop_assert!(position.is_some(), "result not a subsequence of input");
            cursor += position.unwrap_or(0) + 1;
        }
    }

    /// Adding a status predicate to any filter set selects a subset.
    #[test]
    fn extra_predicate_narrows(tasks in arb_tasks(), filters in arb_filters(), status in arb_status()) {
        let now = fixed_now();
        let broad = TaskFilters { status: StatusFilter::All, ..filters.clone() };
        let narrow = TaskFilters { status: StatusFilter::Only(status), ..filters };
        let broad_ids: Vec<_> = broad.apply(&tasks, &now).into_iter().map(|t| t.id).collect();
        for task in narrow.apply(&tasks, &now) {
            prop_assert!(broad_ids.contains(&task.id));
        }
    }

    /// The default filter set matches every task.
    #[test]
    fn default_filters_match_everything(tasks in arb_tasks()) {
        let filtered = TaskFilters::default().apply(&tasks, &fixed_now());
        prop_assert_eq!(filtered.len(), tasks.len());
    }

    /// Closed tasks never classify, whatever their deadline.
    #[test]
    fn closed_tasks_never_classify(mut task in arb_task(0)) {
        task.status = TaskStatus::Completed;
        prop_assert_eq!(deadline::classify(&task, &fixed_now()), None);
        task.status = TaskStatus::Cancelled;
        prop_assert_eq!(deadline::classify(&task, &fixed_now()), None);
    }

    /// Date-less tasks never classify, whatever their status.
    #[test]
    fn dateless_tasks_never_classify(mut task in arb_task(0)) {
        task.due_date = None;
        prop_assert_eq!(deadline::classify(&task, &fixed_now()), None);
    }

    /// Every classification carries a non-negative day count and open tasks
    /// due within the window always classify.
    #[test]
    fn classification_day_counts_are_consistent(task in arb_task(0)) {
        let now = fixed_now();
        match deadline::classify(&task, &now) {
            Some(NotificationKind::Overdue { days_overdue }) => prop_assert!(days_overdue >= 1),
            Some(NotificationKind::DueSoon { days_until }) => {
                prop_assert!((2..=7).contains(&days_until));
            }
            Some(NotificationKind::DueToday | NotificationKind::DueTomorrow) | None => {}
        }
    }

    /// Notifications come out sorted by rank descending, deadline ascending.
    #[test]
    fn notifications_are_sorted(tasks in arb_tasks()) {
        let user = UserId::new("user-a");
        let notes = deadline::notifications(&tasks, &user, &fixed_now());
        for pair in notes.windows(2) {
            let ordered = pair[0].rank > pair[1].rank
                || (pair[0].rank == pair[1].rank && pair[0].due_date <= pair[1].due_date);
            prop_assert!(ordered, "notifications out of order");
        }
    }

    /// Summaries account for every task, overall and grouped.
    #[test]
    fn summaries_account_for_every_task(tasks in arb_tasks()) {
        let overall = stats::summarize(&tasks);
        prop_assert_eq!(overall.total, tasks.len());
        prop_assert_eq!(
            overall.pending + overall.in_progress + overall.completed + overall.cancelled,
            overall.total
        );

        let grouped = stats::by_assignee(&tasks);
        let grouped_total: usize = grouped.values().map(|counts| counts.total).sum();
        prop_assert_eq!(grouped_total, overall.total);
    }
}
