//! Reconciler state: an ordered task list fed by change events.
//!
//! The feed holds tasks newest-first, the order the store returns them in.
//! `apply` is idempotent against duplicate delivery, so replaying events
//! buffered during the seed fetch cannot corrupt the list.

use taskline_core::stream::TaskEvent;
use taskline_core::task::Task;

/// Ordered task list with an optional entry cap.
#[derive(Debug, Clone, Default)]
pub struct TaskFeed {
    tasks: Vec<Task>,
    cap: Option<usize>,
}

impl TaskFeed {
    /// A feed capped to the `cap` newest tasks, for the recent view.
    #[must_use]
    pub const fn recent(cap: usize) -> Self {
        Self {
            tasks: Vec::new(),
            cap: Some(cap),
        }
    }

    /// An uncapped feed, for the all-tasks view.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            tasks: Vec::new(),
            cap: None,
        }
    }

    /// The entry cap, if any.
    #[must_use]
    pub const fn cap(&self) -> Option<usize> {
        self.cap
    }

    /// Number of tasks currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when the feed holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Replaces the contents with a freshly fetched list, newest first.
    /// Enforces the cap.
    pub fn seed(&mut self, mut tasks: Vec<Task>) {
        if let Some(cap) = self.cap {
            tasks.truncate(cap);
        }
        self.tasks = tasks;
    }

    /// Applies a change event. Returns `true` when the list changed, so
    /// callers only publish snapshots that differ.
    ///
    /// - `Created`: prepended; a duplicate id is ignored. The tail is
    ///   evicted when the cap is exceeded.
    /// - `Updated`: replaced in place; ids outside the list are dropped.
    /// - `Deleted`: removed; absent ids are a no-op.
    pub fn apply(&mut self, event: &TaskEvent) -> bool {
        match event {
            TaskEvent::Created(task) => self.insert(task),
            TaskEvent::Updated(task) => self.replace(task),
            TaskEvent::Deleted(id) => {
                let before = self.tasks.len();
                self.tasks.retain(|existing| &existing.id != id);
                self.tasks.len() != before
            }
        }
    }

    /// An owned copy of the current list. Readers never see a live
    /// reference.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.clone()
    }

    fn insert(&mut self, task: &Task) -> bool {
        if self.tasks.iter().any(|existing| existing.id == task.id) {
            return false;
        }
        self.tasks.insert(0, task.clone());
        if let Some(cap) = self.cap {
            self.tasks.truncate(cap);
        }
        true
    }

    fn replace(&mut self, task: &Task) -> bool {
        match self.tasks.iter_mut().find(|existing| existing.id == task.id) {
            Some(slot) if *slot != *task => {
                *slot = task.clone();
                true
            }
            _ => false,
        }
    }
}
