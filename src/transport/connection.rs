//! WebSocket transport and event loop.
//!
//! Each login opens a fresh WebSocket and spawns a tokio task that handles:
//!
//! - Incoming frames from the server, forwarded as [`TransportEvent`]s
//! - Outgoing frames queued by [`Transport::send`]
//! - Orderly logout and close
//!
//! The task reports [`TransportEvent::Disconnected`] exactly once when it
//! ends, whatever the cause.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{from_str, to_string};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::session::{LoginParameters, ServerInfo};

use super::wire::TransportFrame;
use super::{Transport, TransportEvent, TransportEvents};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for establishing the WebSocket.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

/// Client-side WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the WebSocket.
type WsSink = SplitSink<WsStream, WsMessage>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write a frame.
    Send(TransportFrame),
    /// Close the connection.
    Shutdown,
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// [`Transport`] over a WebSocket carrying JSON [`TransportFrame`]s.
///
/// # Thread Safety
///
/// `WebSocketTransport` is `Send + Sync`. Sending only queues the frame for
/// the event loop and never blocks.
pub struct WebSocketTransport {
    /// Server endpoint.
    url: Url,
    /// Bound on connection establishment.
    connect_timeout: Duration,
    /// Command channel of the active connection.
    command_tx: Mutex<Option<mpsc::UnboundedSender<ConnectionCommand>>>,
}

impl fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.url.as_str())
            .field("connected", &self.is_connected())
            .finish()
    }
}

// ============================================================================
// WebSocketTransport - Constructors
// ============================================================================

impl WebSocketTransport {
    /// Creates a transport for a `ws://` or `wss://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is invalid or not a WebSocket URL.
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::config(format!("Invalid URL '{url}': {e}")))?;

        match url.scheme() {
            "ws" | "wss" => {}
            scheme => {
                return Err(Error::config(format!(
                    "Unsupported URL scheme '{scheme}', expected ws or wss"
                )));
            }
        }

        Ok(Self {
            url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_tx: Mutex::new(None),
        })
    }

    /// Creates a transport for a server address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the address does not form a valid URL.
    pub fn for_server(server: &ServerInfo) -> Result<Self> {
        Self::new(&server.ws_url())
    }

    /// Sets the timeout for establishing the connection.
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

// ============================================================================
// WebSocketTransport - Accessors
// ============================================================================

impl WebSocketTransport {
    /// Returns the server URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns `true` while an event loop is running.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.command_tx
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

// ============================================================================
// WebSocketTransport - Transport
// ============================================================================

#[async_trait]
impl Transport for WebSocketTransport {
    async fn login(&self, params: &LoginParameters, events: TransportEvents) -> Result<()> {
        debug!(url = %self.url, "Connecting");

        let (ws_stream, _) = timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| {
                Error::timeout_after(format!("connecting to {}", self.url), self.connect_timeout)
            })?
            .map_err(|e| Error::connection(format!("{}: {e}", self.url)))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        command_tx
            .send(ConnectionCommand::Send(TransportFrame::Login {
                username: params.username.clone(),
                password: params.password.clone(),
            }))
            .map_err(|_| Error::ConnectionClosed)?;

        tokio::spawn(Self::run_event_loop(ws_stream, command_rx, events));

        if let Some(previous) = self.command_tx.lock().replace(command_tx) {
            let _ = previous.send(ConnectionCommand::Shutdown);
        }

        info!(url = %self.url, user = %params.username, "Connected, login sent");
        Ok(())
    }

    fn send(&self, frame: Vec<u8>) -> Result<()> {
        let guard = self.command_tx.lock();
        let tx = guard.as_ref().ok_or(Error::ConnectionClosed)?;

        tx.send(ConnectionCommand::Send(TransportFrame::session_message(&frame)))
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn logout(&self) -> Result<()> {
        let Some(tx) = self.command_tx.lock().take() else {
            return Ok(());
        };

        debug!(url = %self.url, "Logging out");
        let _ = tx.send(ConnectionCommand::Send(TransportFrame::Logout));
        let _ = tx.send(ConnectionCommand::Shutdown);
        Ok(())
    }
}

// ============================================================================
// WebSocketTransport - Event Loop
// ============================================================================

impl WebSocketTransport {
    /// Event loop that handles WebSocket I/O for one connection.
    async fn run_event_loop(
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        events: TransportEvents,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();
        let mut graceful = false;
        let mut reason = String::from("Connection closed");

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(WsMessage::Text(text))) => {
                            if let Some(event) = Self::handle_incoming_frame(&text)
                                && events.send(event).is_err()
                            {
                                debug!("Session gone, closing connection");
                                let _ = ws_write.close().await;
                                break;
                            }
                        }

                        Some(Ok(WsMessage::Close(frame))) => {
                            debug!("WebSocket closed by remote");
                            graceful = true;
                            if let Some(frame) = frame
                                && !frame.reason.is_empty()
                            {
                                reason = frame.reason.to_string();
                            }
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            reason = e.to_string();
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send(frame)) => {
                            if let Err(e) = Self::write_frame(&mut ws_write, &frame).await {
                                warn!(error = %e, "Failed to write frame");
                                reason = e.to_string();
                                break;
                            }
                        }

                        Some(ConnectionCommand::Shutdown) | None => {
                            debug!("Shutdown requested");
                            let _ = ws_write.close().await;
                            graceful = true;
                            reason = String::from("Logged out");
                            break;
                        }
                    }
                }
            }
        }

        let _ = events.send(TransportEvent::Disconnected { graceful, reason });
        debug!("Event loop terminated");
    }

    /// Parses an incoming text frame into an event.
    fn handle_incoming_frame(text: &str) -> Option<TransportEvent> {
        let frame = match from_str::<TransportFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to parse incoming frame");
                return None;
            }
        };

        trace!(?frame, "Frame received");

        match frame.into_event() {
            Ok(Some(event)) => Some(event),
            Ok(None) => {
                warn!("Server sent a client-only frame");
                None
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                None
            }
        }
    }

    /// Serializes and writes one frame.
    async fn write_frame(ws_write: &mut WsSink, frame: &TransportFrame) -> Result<()> {
        let json = to_string(frame)?;
        ws_write.send(WsMessage::Text(json.into())).await?;
        trace!(?frame, "Frame sent");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
