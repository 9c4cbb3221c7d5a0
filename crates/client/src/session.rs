//! Transport session: one pooled HTTP client plus one event stream.
//!
//! [`ComfySession`] owns both transports for a single server and hands
//! them to the run controller in [`crate::run`]. `connect` is
//! idempotent, `close` is idempotent, and dropping the session releases
//! everything.

use std::time::Duration;

use tokio::sync::broadcast;

use comfykit_protocol::ClientId;

use crate::api::HttpApi;
use crate::events::RunEvent;
use crate::stream::{EventStream, Received, StreamError};

/// Broadcast channel capacity for run events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default bound for one blocking receive call.
const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection configuration for one ComfyUI server.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base HTTP URL, e.g. `http://host:8188`.
    pub api_url: String,
    /// WebSocket base URL, e.g. `ws://host:8188`.
    pub ws_url: String,
    /// Client ID sent during the stream handshake. Generated (UUID v4)
    /// when `None`.
    pub client_id: Option<ClientId>,
    /// Upper bound for a single stream receive call.
    pub recv_timeout: Duration,
}

impl SessionConfig {
    /// Build a config from a bare `host:port` address, deriving both
    /// the HTTP and WebSocket URLs.
    pub fn for_server(address: &str) -> Self {
        Self {
            api_url: format!("http://{address}"),
            ws_url: format!("ws://{address}"),
            client_id: None,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
        }
    }
}

/// One client session against a ComfyUI server.
pub struct ComfySession {
    api: HttpApi,
    ws_url: String,
    client_id: ClientId,
    recv_timeout: Duration,
    stream: Option<EventStream>,
    events: broadcast::Sender<RunEvent>,
}

impl ComfySession {
    pub fn new(config: SessionConfig) -> Self {
        let client_id = config
            .client_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            api: HttpApi::new(config.api_url),
            ws_url: config.ws_url,
            client_id,
            recv_timeout: config.recv_timeout,
            stream: None,
            events,
        }
    }

    /// The HTTP side of the session.
    pub fn api(&self) -> &HttpApi {
        &self.api
    }

    /// Client ID scoping the event stream.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Subscribe to run events (progress, previews, completion).
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub(crate) fn events(&self) -> &broadcast::Sender<RunEvent> {
        &self.events
    }

    /// Establish the event stream. A no-op when already connected.
    pub async fn connect(&mut self) -> Result<(), StreamError> {
        if self.stream.is_some() {
            return Ok(());
        }
        self.stream = Some(EventStream::connect(&self.ws_url, &self.client_id).await?);
        Ok(())
    }

    /// Drop the current stream (if any) and establish a fresh one.
    pub async fn reconnect(&mut self) -> Result<(), StreamError> {
        if let Some(stream) = self.stream.take() {
            stream.close().await;
        }
        self.connect().await
    }

    /// Whether the event stream is currently established.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Receive the next stream frame, bounded by the configured timeout.
    ///
    /// A closed connection drops the stream handle so a later
    /// [`connect`](Self::connect) starts clean.
    pub async fn recv(&mut self) -> Result<Received, StreamError> {
        let stream = self.stream.as_mut().ok_or(StreamError::NotConnected)?;
        match stream.recv(self.recv_timeout).await {
            Ok(received) => Ok(received),
            Err(e) => {
                self.stream = None;
                Err(e)
            }
        }
    }

    /// Close the stream and release transport resources.
    ///
    /// Safe to call any number of times; the pooled HTTP client is
    /// released when the session is dropped.
    pub async fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.close().await;
            tracing::info!(client_id = %self.client_id, "session closed");
        }
    }
}
