//! Change-stream subscription over a WebSocket.
//!
//! [`Watcher::connect`] dials the platform's realtime endpoint, waits for
//! the `connected` envelope that acknowledges the subscription, and spawns
//! a background reader task. Decoded task events arrive through a channel;
//! undecodable event payloads are forwarded as errors rather than killing
//! the stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use taskline_core::stream::{StreamEnvelope, StreamError, TaskEvent, decode_envelope};

use super::EventSource;

/// The full WebSocket connection; the watcher never writes, so it is not
/// split.
type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Default timeout for connecting and for the subscription handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while establishing or decoding the change stream.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Endpoint did not parse as a URL.
    #[error("invalid realtime endpoint: {0}")]
    Url(#[from] url::ParseError),
    /// Endpoint scheme was not http(s) or ws(s).
    #[error("unsupported endpoint scheme `{0}`")]
    UnsupportedScheme(String),
    /// Connecting or handshaking took longer than the timeout.
    #[error("timed out connecting to the change stream")]
    Timeout,
    /// WebSocket-level failure.
    #[error("change stream connection failed: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    /// The server did not acknowledge the subscription.
    #[error("change stream handshake failed: {0}")]
    Handshake(String),
    /// A stream frame did not decode.
    #[error(transparent)]
    Frame(#[from] StreamError),
}

/// Connection parameters for the change stream.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// The platform API endpoint, e.g. `https://host/v1`.
    pub endpoint: String,
    /// Project the subscription authenticates as.
    pub project_id: String,
    /// Channel to subscribe to, from
    /// [`taskline_core::stream::task_channel`].
    pub channel: String,
    /// Timeout for connecting and for the handshake frame.
    pub connect_timeout: Duration,
}

impl WatchConfig {
    /// Creates a config with the default connect timeout.
    pub fn new(
        endpoint: impl Into<String>,
        project_id: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            project_id: project_id.into(),
            channel: channel.into(),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

/// Builds the realtime WebSocket URL for an API endpoint.
///
/// `http(s)` schemes are mapped to `ws(s)`; the project and channel ride
/// in the query string.
///
/// # Errors
///
/// Returns [`SyncError::Url`] for an unparseable endpoint and
/// [`SyncError::UnsupportedScheme`] for schemes other than http(s)/ws(s).
pub fn realtime_url(endpoint: &str, project_id: &str, channel: &str) -> Result<Url, SyncError> {
    let base = format!("{}/realtime", endpoint.trim_end_matches('/'));
    let mut url = Url::parse(&base)?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(SyncError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|()| SyncError::UnsupportedScheme(scheme.to_string()))?;

    url.query_pairs_mut()
        .append_pair("project", project_id)
        .append_pair("channels[]", channel);
    Ok(url)
}

/// A live change-stream subscription.
///
/// Created via [`Watcher::connect`]. Events are read through the
/// [`EventSource`] impl; dropping the watcher aborts the reader task,
/// which closes the socket and releases the subscription.
pub struct Watcher {
    /// Channel fed by the background reader task.
    events: mpsc::Receiver<Result<TaskEvent, StreamError>>,
    /// Whether the WebSocket connection is still open.
    connected: Arc<AtomicBool>,
    /// Handle to the background reader task.
    reader: tokio::task::JoinHandle<()>,
}

impl Watcher {
    /// Connects to the realtime endpoint and subscribes to the channel.
    ///
    /// Resolves only after the server's `connected` envelope arrives, so a
    /// returned watcher is guaranteed to observe every event published
    /// after this call.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Timeout`] when connecting or handshaking stalls.
    /// - [`SyncError::Ws`] for connection-level failures.
    /// - [`SyncError::Handshake`] when the first frame is not a
    ///   subscription acknowledgment.
    pub async fn connect(config: &WatchConfig) -> Result<Self, SyncError> {
        let url = realtime_url(&config.endpoint, &config.project_id, &config.channel)?;

        let (mut stream, _response) =
            tokio::time::timeout(config.connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| {
                    tracing::warn!(url = %url, "change stream connect timed out");
                    SyncError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = %url, err = %e, "change stream connect failed");
                    SyncError::Ws(e)
                })?;

        let channels = tokio::time::timeout(config.connect_timeout, await_connected(&mut stream))
            .await
            .map_err(|_| {
                tracing::warn!(url = %url, "change stream handshake timed out");
                SyncError::Timeout
            })??;
        tracing::debug!(?channels, "change stream subscribed");

        let (tx, rx) = mpsc::channel(256);
        let connected = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(reader_loop(stream, tx, Arc::clone(&connected)));

        Ok(Self {
            events: rx,
            connected,
            reader,
        })
    }

    /// Whether the WebSocket connection is still open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl EventSource for Watcher {
    async fn next_event(&mut self) -> Option<Result<TaskEvent, StreamError>> {
        self.events.recv().await
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Waits for the `connected` envelope that acknowledges the subscription.
async fn await_connected(stream: &mut WsStream) -> Result<Vec<String>, SyncError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match decode_envelope(&text)? {
                StreamEnvelope::Connected { channels } => return Ok(channels),
                StreamEnvelope::Pong => {}
                StreamEnvelope::Error { data } => {
                    tracing::warn!(%data, "subscription rejected");
                    return Err(SyncError::Handshake(format!(
                        "subscription rejected: {data}"
                    )));
                }
                StreamEnvelope::Event { .. } => {
                    return Err(SyncError::Handshake(
                        "event frame arrived before the subscription was acknowledged".to_string(),
                    ));
                }
            },
            Some(Ok(Message::Close(_))) => {
                return Err(SyncError::Handshake(
                    "server closed the stream during the handshake".to_string(),
                ));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(SyncError::Ws(e)),
            None => {
                return Err(SyncError::Handshake(
                    "stream ended before the subscription was acknowledged".to_string(),
                ));
            }
        }
    }
}

/// Background task that reads stream frames and dispatches task events.
///
/// Frames about other topics are skipped. Undecodable event payloads are
/// forwarded as errors so the consumer can report them; the task does not
/// disconnect on bad data. Sets `connected` to `false` when the WebSocket
/// closes or errors out.
async fn reader_loop(
    mut stream: WsStream,
    tx: mpsc::Sender<Result<TaskEvent, StreamError>>,
    connected: Arc<AtomicBool>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match decode_envelope(&text) {
                Ok(StreamEnvelope::Event { data }) => match TaskEvent::from_event_data(&data) {
                    Ok(Some(event)) => {
                        if tx.send(Ok(event)).await.is_err() {
                            // Receiver dropped, the watcher is gone.
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::trace!("skipping event for another topic");
                    }
                    Err(e) => {
                        if tx.send(Err(e)).await.is_err() {
                            break;
                        }
                    }
                },
                Ok(StreamEnvelope::Error { data }) => {
                    tracing::warn!(%data, "change stream reported an error");
                }
                Ok(StreamEnvelope::Connected { .. } | StreamEnvelope::Pong) => {}
                Err(e) => {
                    tracing::warn!(err = %e, "malformed stream frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("change stream closed by the server");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(err = %e, "change stream read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::debug!("change stream reader exiting");
}
