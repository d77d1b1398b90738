//! End-to-end live sync over a real WebSocket.
//!
//! Starts an in-process change-stream stub, connects the production
//! watcher to it, and drives the sync orchestrator with a seeded task
//! store:
//! - subscription handshake and query plumbing
//! - server-pushed create/update/delete flowing into snapshots
//! - replay dedup, skipped topics, and malformed payload handling
//! - disconnect on server close

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use taskline::api::ApiError;
use taskline::api::tasks::TasksApi;
use taskline::sync::{self, SyncError, SyncEvent, SyncHandle, TaskFeed, WatchConfig, Watcher};
use taskline_core::stream::task_channel;
use taskline_core::task::{Task, TaskDraft, TaskId, TaskPatch};

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Change-stream stub
// =============================================================================

#[derive(Clone)]
enum Frame {
    Text(String),
    Close,
}

struct StreamStub {
    frames: broadcast::Sender<Frame>,
    /// Query pairs captured per subscription, in connection order.
    subscriptions: Mutex<Vec<HashMap<String, String>>>,
}

impl StreamStub {
    fn push(&self, frame: String) {
        let _ = self.frames.send(Frame::Text(frame));
    }

    fn close(&self) {
        let _ = self.frames.send(Frame::Close);
    }
}

async fn subscribe(
    State(stub): State<Arc<StreamStub>>,
    Query(params): Query<HashMap<String, String>>,
    upgrade: WebSocketUpgrade,
) -> Response {
    stub.subscriptions.lock().push(params.clone());
    // Subscribe before the upgrade completes so nothing pushed after
    // the client's connect() returns can be missed.
    let frames = stub.frames.subscribe();
    upgrade.on_upgrade(move |socket| serve_stream(socket, params, frames))
}

async fn serve_stream(
    mut socket: WebSocket,
    params: HashMap<String, String>,
    mut frames: broadcast::Receiver<Frame>,
) {
    let channel = params.get("channels[]").cloned().unwrap_or_default();
    let connected = json!({ "type": "connected", "channels": [channel] }).to_string();
    if socket.send(WsMessage::Text(connected.into())).await.is_err() {
        return;
    }
    while let Ok(frame) = frames.recv().await {
        match frame {
            Frame::Text(text) => {
                if socket.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Frame::Close => {
                let _ = socket.send(WsMessage::Close(None)).await;
                break;
            }
        }
    }
}

/// Starts the stub and returns its API endpoint, shared state, and task.
async fn start_stream_stub() -> (String, Arc<StreamStub>, JoinHandle<()>) {
    let (frames, _) = broadcast::channel(64);
    let stub = Arc::new(StreamStub {
        frames,
        subscriptions: Mutex::new(Vec::new()),
    });
    let app = Router::new()
        .route("/v1/realtime", get(subscribe))
        .with_state(Arc::clone(&stub));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stream stub");
    let addr = listener.local_addr().expect("stub addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve stream stub");
    });
    (format!("http://{addr}/v1"), stub, handle)
}

// =============================================================================
// Seeded task store
// =============================================================================

/// Read-only store backing the seed fetch; writes are not part of this
/// harness.
#[derive(Clone, Default)]
struct SeededStore {
    tasks: Vec<Task>,
}

impl TasksApi for SeededStore {
    async fn create_task(&self, _draft: &TaskDraft) -> Result<Task, ApiError> {
        Err(ApiError::Payload("read-only store".to_string()))
    }

    async fn recent_tasks(&self, _limit: usize) -> Result<Vec<Task>, ApiError> {
        Ok(self.tasks.clone())
    }

    async fn all_tasks(&self) -> Result<Vec<Task>, ApiError> {
        Ok(self.tasks.clone())
    }

    async fn update_task(&self, _id: &TaskId, _patch: &TaskPatch) -> Result<Task, ApiError> {
        Err(ApiError::Payload("read-only store".to_string()))
    }

    async fn delete_task(&self, _id: &TaskId) -> Result<(), ApiError> {
        Err(ApiError::Payload("read-only store".to_string()))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn task_payload(id: &str, title: &str) -> Value {
    json!({
        "$id": id,
        "$createdAt": "2024-06-10T12:00:00Z",
        "title": title,
        "priority": 2,
        "status": "pending",
        "assignedTo": ""
    })
}

fn decoded(payload: &Value) -> Task {
    serde_json::from_value(payload.clone()).expect("task payload decodes")
}

fn event_frame(action: &str, payload: Value) -> String {
    let id = payload["$id"].as_str().unwrap_or("unknown");
    json!({
        "type": "event",
        "data": {
            "events": [format!("databases.main.collections.tasks.documents.{id}.{action}")],
            "channels": [task_channel("main", "tasks")],
            "payload": payload
        }
    })
    .to_string()
}

async fn connect(endpoint: &str) -> Watcher {
    let config = WatchConfig::new(endpoint, "proj-1", task_channel("main", "tasks"));
    Watcher::connect(&config).await.expect("watcher connects")
}

async fn next_event(handle: &mut SyncHandle) -> SyncEvent {
    timeout(WAIT, handle.next())
        .await
        .expect("timed out waiting for a sync event")
        .expect("event stream ended early")
}

/// Reads events until a snapshot arrives, skipping the connected marker.
async fn next_snapshot(handle: &mut SyncHandle) -> Vec<Task> {
    loop {
        match next_event(handle).await {
            SyncEvent::Snapshot(tasks) => return tasks,
            SyncEvent::Connected => {}
            other => panic!("expected a snapshot, got {other:?}"),
        }
    }
}

// =============================================================================
// Handshake
// =============================================================================

#[tokio::test]
async fn the_watcher_acknowledges_the_subscription() {
    let (endpoint, stub, _stub_handle) = start_stream_stub().await;

    let watcher = connect(&endpoint).await;
    assert!(watcher.is_connected());

    let subscriptions = stub.subscriptions.lock();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].get("project").map(String::as_str), Some("proj-1"));
    assert_eq!(
        subscriptions[0].get("channels[]").map(String::as_str),
        Some("databases.main.collections.tasks.documents")
    );
}

#[tokio::test]
async fn a_dead_endpoint_fails_to_connect() {
    // Bind then drop, so the port is closed but was recently valid.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let config = WatchConfig::new(format!("http://{addr}/v1"), "proj-1", "ch");
    let result = Watcher::connect(&config).await;
    assert!(matches!(result, Err(SyncError::Ws(_))));
}

// =============================================================================
// Live pipeline
// =============================================================================

#[tokio::test]
async fn startup_emits_connected_then_the_seed_snapshot() {
    let (endpoint, _stub, _stub_handle) = start_stream_stub().await;
    let seed = vec![decoded(&task_payload("t2", "newer")), decoded(&task_payload("t1", "older"))];
    let store = SeededStore { tasks: seed.clone() };

    let watcher = connect(&endpoint).await;
    let mut handle = sync::spawn(store, watcher, TaskFeed::recent(10));

    assert_eq!(next_event(&mut handle).await, SyncEvent::Connected);
    assert_eq!(next_event(&mut handle).await, SyncEvent::Snapshot(seed));
    handle.shutdown();
}

#[tokio::test]
async fn server_pushed_changes_flow_into_snapshots() {
    let (endpoint, stub, _stub_handle) = start_stream_stub().await;
    let t1 = task_payload("t1", "write the report");
    let store = SeededStore { tasks: vec![decoded(&t1)] };

    let watcher = connect(&endpoint).await;
    let mut handle = sync::spawn(store, watcher, TaskFeed::recent(10));
    let seeded = next_snapshot(&mut handle).await;
    assert_eq!(seeded.len(), 1);

    // Create lands at the front of the feed.
    let t2 = task_payload("t2", "file the report");
    stub.push(event_frame("create", t2.clone()));
    let snapshot = next_snapshot(&mut handle).await;
    assert_eq!(snapshot, vec![decoded(&t2), decoded(&t1)]);

    // Update replaces the stored copy in place.
    let mut t1_revised = task_payload("t1", "write the report, v2");
    t1_revised["status"] = json!("completed");
    stub.push(event_frame("update", t1_revised.clone()));
    let snapshot = next_snapshot(&mut handle).await;
    assert!(snapshot.contains(&decoded(&t1_revised)));

    // Delete drops it.
    stub.push(event_frame("delete", json!({ "$id": "t2" })));
    let snapshot = next_snapshot(&mut handle).await;
    assert_eq!(snapshot, vec![decoded(&t1_revised)]);
    assert_eq!(handle.latest().await, vec![decoded(&t1_revised)]);
}

#[tokio::test]
async fn a_create_replayed_after_seeding_stays_silent() {
    let (endpoint, stub, _stub_handle) = start_stream_stub().await;
    let t1 = task_payload("t1", "seeded");
    let store = SeededStore { tasks: vec![decoded(&t1)] };

    let watcher = connect(&endpoint).await;
    let mut handle = sync::spawn(store, watcher, TaskFeed::recent(10));
    next_snapshot(&mut handle).await;

    // The replayed create must not produce a snapshot of its own; the
    // next snapshot to arrive is the one for t2.
    stub.push(event_frame("create", t1.clone()));
    let t2 = task_payload("t2", "fresh");
    stub.push(event_frame("create", t2.clone()));

    let snapshot = next_snapshot(&mut handle).await;
    assert_eq!(snapshot, vec![decoded(&t2), decoded(&t1)]);
}

#[tokio::test]
async fn frames_about_other_topics_are_skipped() {
    let (endpoint, stub, _stub_handle) = start_stream_stub().await;
    let store = SeededStore::default();

    let watcher = connect(&endpoint).await;
    let mut handle = sync::spawn(store, watcher, TaskFeed::recent(10));
    next_snapshot(&mut handle).await;

    stub.push(
        json!({
            "type": "event",
            "data": {
                "events": ["databases.main.collections.tasks.documents.t1.permissions"],
                "channels": [task_channel("main", "tasks")],
                "payload": {}
            }
        })
        .to_string(),
    );
    stub.push(json!({ "type": "pong" }).to_string());
    let t1 = task_payload("t1", "the only real change");
    stub.push(event_frame("create", t1.clone()));

    let snapshot = next_snapshot(&mut handle).await;
    assert_eq!(snapshot, vec![decoded(&t1)]);
}

#[tokio::test]
async fn bad_payloads_surface_as_errors_and_the_stream_survives() {
    let (endpoint, stub, _stub_handle) = start_stream_stub().await;
    let store = SeededStore::default();

    let watcher = connect(&endpoint).await;
    let mut handle = sync::spawn(store, watcher, TaskFeed::recent(10));
    next_snapshot(&mut handle).await;

    stub.push(event_frame("create", json!({ "title": "no id or status" })));
    let event = next_event(&mut handle).await;
    assert!(matches!(
        event,
        SyncEvent::Error(message) if message.contains("malformed task payload")
    ));

    let t1 = task_payload("t1", "still alive");
    stub.push(event_frame("create", t1.clone()));
    let snapshot = next_snapshot(&mut handle).await;
    assert_eq!(snapshot, vec![decoded(&t1)]);
}

#[tokio::test]
async fn a_server_close_ends_the_stream() {
    let (endpoint, stub, _stub_handle) = start_stream_stub().await;
    let store = SeededStore::default();

    let watcher = connect(&endpoint).await;
    let mut handle = sync::spawn(store, watcher, TaskFeed::recent(10));
    next_snapshot(&mut handle).await;

    stub.close();
    assert_eq!(next_event(&mut handle).await, SyncEvent::Disconnected);
    assert_eq!(
        timeout(WAIT, handle.next()).await.expect("driver exits"),
        None
    );
}
