//! Periodic deadline alerts for the watch loop.
//!
//! Re-runs the deadline classifier over the current task snapshot on a
//! fixed schedule. The notifier holds no clock of its own: `tick` waits
//! and classifies at the local time it fires, `check_now` classifies at a
//! caller-supplied instant so tests stay deterministic.

use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tokio::time::{Interval, MissedTickBehavior};

use taskline_core::deadline::{Notification, notifications};
use taskline_core::task::Task;
use taskline_core::user::UserId;

/// Scheduled deadline classification over a task snapshot.
///
/// The first `tick` resolves immediately, so a watch loop reports
/// deadlines at startup rather than one full period later.
pub struct Notifier {
    user: UserId,
    interval: Interval,
    tasks: Vec<Task>,
}

impl Notifier {
    /// Creates a notifier for `user`'s tasks, firing every `period`.
    #[must_use]
    pub fn new(user: UserId, period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        // A nap (suspend, debugger) must not burst missed passes.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            user,
            interval,
            tasks: Vec::new(),
        }
    }

    /// Replaces the snapshot the next pass classifies.
    pub fn update_tasks(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
    }

    /// Waits for the next scheduled pass and returns its notifications.
    ///
    /// Cancel-safe: dropping the future mid-wait loses no state, so it
    /// can sit in a `select!` with the sync event stream.
    pub async fn tick(&mut self) -> Vec<Notification> {
        self.interval.tick().await;
        self.check_now(&Local::now())
    }

    /// Runs a classification pass against `now` without waiting.
    #[must_use]
    pub fn check_now<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<Notification> {
        notifications(&self.tasks, &self.user, now)
    }
}
