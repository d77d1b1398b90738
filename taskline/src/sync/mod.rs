//! Live task sync: change-stream watcher, reconciler, and orchestrator.
//!
//! [`spawn`] wires the pieces together in the order that makes the
//! startup race benign: the subscription is established first (by
//! [`Watcher::connect`]), then the seed fetch runs; events that arrive in
//! the meantime queue in the watcher's channel and replay through the
//! reconciler after seeding, where [`TaskFeed::apply`] deduplicates them.
//!
//! Consumers read [`SyncEvent`]s from the returned handle. Snapshots are
//! always owned copies; the feed itself is never shared out.

pub mod feed;
pub mod watch;

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use taskline_core::stream::{StreamError, TaskEvent};
use taskline_core::task::Task;

use crate::api::tasks::TasksApi;

pub use feed::TaskFeed;
pub use watch::{SyncError, WatchConfig, Watcher, realtime_url};

/// Source of change events consumed by the orchestrator.
///
/// [`Watcher`] is the production implementation; yielding `None` means the
/// stream ended.
pub trait EventSource: Send {
    /// The next change event, or a decode error for a frame that carried
    /// one. `None` when the stream ended.
    fn next_event(
        &mut self,
    ) -> impl std::future::Future<Output = Option<Result<TaskEvent, StreamError>>> + Send;
}

/// Feed updates published to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The feed changed; an owned copy of the new list.
    Snapshot(Vec<Task>),
    /// The change stream is subscribed and live.
    Connected,
    /// The change stream ended; no further snapshots will arrive.
    Disconnected,
    /// A recoverable failure: seed fetch or an undecodable event.
    Error(String),
}

/// Handle to a running sync loop.
///
/// Dropping the handle aborts the driver task, which in turn drops the
/// event source and releases the subscription.
pub struct SyncHandle {
    feed: Arc<Mutex<TaskFeed>>,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    driver: JoinHandle<()>,
}

impl SyncHandle {
    /// The next feed update. `None` after [`SyncEvent::Disconnected`] has
    /// been consumed and the driver exited.
    pub async fn next(&mut self) -> Option<SyncEvent> {
        self.events.recv().await
    }

    /// An owned copy of the current task list.
    pub async fn latest(&self) -> Vec<Task> {
        self.feed.lock().await.snapshot()
    }

    /// Stops the sync loop.
    pub fn shutdown(&self) {
        self.driver.abort();
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Starts the sync loop over an already-subscribed event source.
///
/// The feed's cap decides the seed fetch: a capped feed seeds from the
/// limited recent-tasks query, an unbounded one from the full list. A
/// failed seed is reported as [`SyncEvent::Error`] and the loop continues
/// with live events only.
pub fn spawn<T, S>(api: T, source: S, feed: TaskFeed) -> SyncHandle
where
    T: TasksApi + 'static,
    S: EventSource + 'static,
{
    let feed = Arc::new(Mutex::new(feed));
    let (tx, rx) = mpsc::unbounded_channel();

    let driver_feed = Arc::clone(&feed);
    let driver = tokio::spawn(drive(api, source, driver_feed, tx));

    SyncHandle {
        feed,
        events: rx,
        driver,
    }
}

async fn drive<T, S>(
    api: T,
    mut source: S,
    feed: Arc<Mutex<TaskFeed>>,
    tx: mpsc::UnboundedSender<SyncEvent>,
) where
    T: TasksApi,
    S: EventSource,
{
    let _ = tx.send(SyncEvent::Connected);

    let cap = feed.lock().await.cap();
    let seeded = match cap {
        Some(limit) => api.recent_tasks(limit).await,
        None => api.all_tasks().await,
    };
    match seeded {
        Ok(tasks) => {
            let snapshot = {
                let mut feed = feed.lock().await;
                feed.seed(tasks);
                feed.snapshot()
            };
            tracing::debug!(tasks = snapshot.len(), "feed seeded");
            let _ = tx.send(SyncEvent::Snapshot(snapshot));
        }
        Err(e) => {
            tracing::warn!(err = %e, "seed fetch failed; continuing with live events only");
            let _ = tx.send(SyncEvent::Error(e.to_string()));
        }
    }

    while let Some(event) = source.next_event().await {
        match event {
            Ok(event) => {
                let snapshot = {
                    let mut feed = feed.lock().await;
                    if feed.apply(&event) {
                        Some(feed.snapshot())
                    } else {
                        None
                    }
                };
                if let Some(tasks) = snapshot {
                    let _ = tx.send(SyncEvent::Snapshot(tasks));
                }
            }
            Err(e) => {
                tracing::warn!(err = %e, "undecodable change event");
                let _ = tx.send(SyncEvent::Error(e.to_string()));
            }
        }
    }

    let _ = tx.send(SyncEvent::Disconnected);
    tracing::debug!("sync driver exiting");
}
