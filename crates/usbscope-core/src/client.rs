//! Client side of the collector service.
//!
//! Talks HTTP/1.1 to the collector's Unix socket. The plain query methods
//! never fail: when the collector is absent or answers badly they log at
//! debug level and return an empty result, so a viewer can render "no
//! data" without special-casing a stopped service. The `try_*` variants
//! expose the underlying [`ClientError`].
//!
//! ```no_run
//! use usbscope_core::client::CollectorClient;
//! use usbscope_core::service::BusSelection;
//!
//! # async fn demo() {
//! let client = CollectorClient::for_bus(BusSelection::Auto);
//! if client.is_running().await {
//!     for event in client.recent_events(20).await {
//!         println!("{} {}", event.timestamp, event.message);
//!     }
//! }
//! # }
//! ```

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::{Request, Response, StatusCode, header};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use tokio::net::UnixStream;
use tracing::{debug, warn};

use crate::model::{DeviceInfo, Event, StateSummary};
use crate::service::{BusSelection, Endpoint, method, method_path};
use crate::store::Signal;

/// Error type for collector calls.
#[derive(Debug)]
pub enum ClientError {
    /// No collector is listening on the socket.
    Connect(io::Error),
    /// The request could not be built.
    Request(String),
    /// HTTP protocol failure on an open connection.
    Http(hyper::Error),
    /// The collector answered with a non-success status.
    Status(StatusCode),
    /// The reply body was not the expected JSON.
    Decode(serde_json::Error),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Connect(e) => write!(f, "collector unreachable: {}", e),
            ClientError::Request(e) => write!(f, "invalid request: {}", e),
            ClientError::Http(e) => write!(f, "HTTP error: {}", e),
            ClientError::Status(status) => write!(f, "collector replied {}", status),
            ClientError::Decode(e) => write!(f, "invalid reply: {}", e),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<hyper::Error> for ClientError {
    fn from(e: hyper::Error) -> Self {
        ClientError::Http(e)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e)
    }
}

/// Handle on a collector socket. Each call opens its own connection, so a
/// client can be created before the collector starts and survive restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorClient {
    socket_path: PathBuf,
}

impl CollectorClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn from_endpoint(endpoint: &Endpoint) -> Self {
        Self::new(endpoint.socket_path.clone())
    }

    /// Client for the collector a daemon started with the same selection
    /// would bind to.
    pub fn for_bus(selection: BusSelection) -> Self {
        Self::from_endpoint(&Endpoint::from_env(selection))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Whether a collector answers on the socket.
    pub async fn is_running(&self) -> bool {
        self.try_version().await.is_ok()
    }

    /// The `limit` most recent events, oldest first; empty when unavailable.
    pub async fn recent_events(&self, limit: i64) -> Vec<Event> {
        self.try_recent_events(limit)
            .await
            .unwrap_or_else(|e| self.fallback(method::GET_RECENT_EVENTS, e))
    }

    /// Attached devices; empty when unavailable.
    pub async fn current_devices(&self) -> Vec<DeviceInfo> {
        self.try_current_devices()
            .await
            .unwrap_or_else(|e| self.fallback(method::GET_CURRENT_DEVICES, e))
    }

    /// Store sizes; zero counts when unavailable.
    pub async fn state_summary(&self) -> StateSummary {
        self.try_state_summary()
            .await
            .unwrap_or_else(|e| self.fallback(method::GET_STATE_SUMMARY, e))
    }

    /// Collector version, if one is running.
    pub async fn version(&self) -> Option<String> {
        self.try_version().await.ok()
    }

    pub async fn try_recent_events(&self, limit: i64) -> Result<Vec<Event>, ClientError> {
        self.call(&format!(
            "{}?limit={}",
            method_path(method::GET_RECENT_EVENTS),
            limit
        ))
        .await
    }

    pub async fn try_current_devices(&self) -> Result<Vec<DeviceInfo>, ClientError> {
        self.call(&method_path(method::GET_CURRENT_DEVICES)).await
    }

    pub async fn try_state_summary(&self) -> Result<StateSummary, ClientError> {
        self.call(&method_path(method::GET_STATE_SUMMARY)).await
    }

    pub async fn try_version(&self) -> Result<String, ClientError> {
        self.call(&method_path(method::GET_VERSION)).await
    }

    /// Opens the notification stream.
    pub async fn subscribe(&self) -> Result<SignalStream, ClientError> {
        let response = self.get(&method_path(method::SIGNALS)).await?;
        debug!(socket = %self.socket_path.display(), "subscribed to collector notifications");
        Ok(SignalStream {
            body: response.into_body(),
            decoder: SseDecoder::default(),
        })
    }

    fn fallback<T: Default>(&self, method: &str, error: ClientError) -> T {
        debug!(
            method,
            socket = %self.socket_path.display(),
            error = %error,
            "collector call failed, returning empty result"
        );
        T::default()
    }

    async fn call<T: DeserializeOwned>(&self, uri: &str) -> Result<T, ClientError> {
        let body = self.get(uri).await?.into_body().collect().await?.to_bytes();
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get(&self, uri: &str) -> Result<Response<Incoming>, ClientError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(ClientError::Connect)?;
        let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "collector connection ended with error");
            }
        });

        let request = Request::get(uri)
            .header(header::HOST, "localhost")
            .body(Empty::<Bytes>::new())
            .map_err(|e| ClientError::Request(e.to_string()))?;
        let response = sender.send_request(request).await?;
        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }
        Ok(response)
    }
}

/// Live notifications from one collector connection.
pub struct SignalStream {
    body: Incoming,
    decoder: SseDecoder,
}

impl SignalStream {
    /// Next notification, in the order the collector emitted them. `None`
    /// once the collector closes the stream or the connection drops.
    pub async fn next(&mut self) -> Option<Signal> {
        loop {
            while let Some(message) = self.decoder.next_message() {
                match Signal::from_payload(&message.event, &message.data) {
                    Ok(Some(signal)) => return Some(signal),
                    Ok(None) => debug!(event = %message.event, "ignoring unknown notification"),
                    Err(e) => {
                        warn!(event = %message.event, error = %e, "malformed notification payload")
                    }
                }
            }

            let frame = match self.body.frame().await? {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(error = %e, "notification stream failed");
                    return None;
                }
            };
            if let Ok(data) = frame.into_data() {
                self.decoder.push(&data);
            }
        }
    }
}

/// One `text/event-stream` message.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SseMessage {
    event: String,
    data: String,
}

/// Incremental `text/event-stream` decoder; chunks may split messages and
/// UTF-8 sequences anywhere.
#[derive(Debug, Default)]
struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete named message. Comments (keep-alives) and messages
    /// without an event name are skipped.
    fn next_message(&mut self) -> Option<SseMessage> {
        while let Some(end) = self.buf.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buf.drain(..end + 2).collect();
            let block = String::from_utf8_lossy(&block);

            let mut event = None;
            let mut data: Option<String> = None;
            for line in block.lines() {
                let (field, value) = match line.split_once(':') {
                    Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                    None => (line, ""),
                };
                match field {
                    "event" => event = Some(value.to_string()),
                    "data" => match data.as_mut() {
                        Some(d) => {
                            d.push('\n');
                            d.push_str(value);
                        }
                        None => data = Some(value.to_string()),
                    },
                    _ => {}
                }
            }

            if let (Some(event), Some(data)) = (event, data) {
                return Some(SseMessage { event, data });
            }
        }
        None
    }
}
