//! WebSocket event stream for a ComfyUI server.
//!
//! [`EventStream`] wraps one live connection to `GET /ws?clientId=...`
//! and exposes a timeout-bounded [`recv`](EventStream::recv) that hands
//! raw frames up to the classifier. Transport-level details (ping/pong,
//! close frames) are handled here and never reach the caller.

use std::time::Duration;

use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use comfykit_protocol::RawFrame;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Errors from the WebSocket transport layer.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Failed to establish the WebSocket connection.
    #[error("WebSocket connect failed: {0}")]
    Connect(String),

    /// The established connection dropped or was closed by the server.
    /// The run controller answers this with a single reconnect attempt.
    #[error("WebSocket connection closed: {0}")]
    Closed(String),

    /// `recv` was called with no live connection.
    #[error("event stream is not connected")]
    NotConnected,
}

/// Outcome of one bounded receive call.
#[derive(Debug)]
pub enum Received {
    /// A data frame arrived.
    Frame(RawFrame),
    /// Nothing arrived within the timeout. Not an error; loop again.
    Timeout,
}

/// A live WebSocket connection to the server's event feed.
pub struct EventStream {
    ws: WsStream,
}

impl EventStream {
    /// Connect to the event stream endpoint, scoping the feed to
    /// `client_id` via the `clientId` query parameter.
    pub async fn connect(ws_url: &str, client_id: &str) -> Result<Self, StreamError> {
        let url = format!("{ws_url}/ws?clientId={client_id}");
        let (ws, _response) = connect_async(&url)
            .await
            .map_err(|e| StreamError::Connect(format!("failed to connect to {url}: {e}")))?;

        tracing::info!(client_id = %client_id, url = %ws_url, "connected to event stream");
        Ok(Self { ws })
    }

    /// Wait up to `timeout` for the next data frame.
    ///
    /// Ping/pong and continuation frames are consumed internally; a
    /// close frame or transport error surfaces as [`StreamError::Closed`].
    pub async fn recv(&mut self, timeout: Duration) -> Result<Received, StreamError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let message = match tokio::time::timeout_at(deadline, self.ws.next()).await {
                Err(_elapsed) => return Ok(Received::Timeout),
                Ok(None) => return Err(StreamError::Closed("stream exhausted".into())),
                Ok(Some(Err(e))) => return Err(StreamError::Closed(e.to_string())),
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Text(text) => return Ok(Received::Frame(RawFrame::Text(text))),
                Message::Binary(bytes) => return Ok(Received::Frame(RawFrame::Binary(bytes))),
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(frame) => {
                    tracing::info!(?frame, "event stream closed by server");
                    return Err(StreamError::Closed("close frame received".into()));
                }
                Message::Frame(_) => continue,
            }
        }
    }

    /// Close the connection. Errors here only mean the peer beat us to
    /// it, so they are logged at debug and swallowed.
    pub async fn close(mut self) {
        if let Err(e) = self.ws.close(None).await {
            tracing::debug!(error = %e, "error closing event stream");
        }
    }
}
