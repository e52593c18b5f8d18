//! Transport layer beneath the session.
//!
//! A [`Transport`] moves opaque byte frames between the session and the
//! server and reports what happened through [`TransportEvent`]s. The
//! session never looks below this seam, so tests drive it with an
//! in-process transport and production uses [`WebSocketTransport`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   send(frame)    ┌─────────────────┐    WebSocket    ┌──────────┐
//! │     Session     │─────────────────►│    Transport    │◄───────────────►│  Server  │
//! │  dispatch task  │◄─────────────────│   event loop    │   JSON frames   │          │
//! └─────────────────┘  TransportEvent  └─────────────────┘                 └──────────┘
//! ```
//!
//! # Event Order
//!
//! Events are delivered through one unbounded channel per login and are
//! processed by the session in the order they were sent.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket transport and event loop |
//! | `wire` | JSON frames exchanged with the server |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket transport and event loop.
pub mod connection;

/// JSON frames exchanged with the server.
pub mod wire;

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::session::LoginParameters;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::WebSocketTransport;
pub use wire::TransportFrame;

// ============================================================================
// Types
// ============================================================================

/// Sender half the transport reports events through.
pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// Receiver half consumed by the session's dispatch task.
pub type TransportEventStream = mpsc::UnboundedReceiver<TransportEvent>;

// ============================================================================
// TransportEvent
// ============================================================================

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Transport-level login succeeded.
    LoggedIn,

    /// Transport-level login was refused.
    LoginFailed {
        /// Server-supplied reason.
        reason: String,
    },

    /// The connection is gone.
    Disconnected {
        /// `true` for an orderly logout.
        graceful: bool,
        /// Description of why the connection ended.
        reason: String,
    },

    /// Frame on the session channel: `[u16 client id][message]`.
    SessionMessage(Vec<u8>),

    /// The session was joined to a named channel.
    JoinedChannel {
        /// Channel name.
        channel: String,
    },

    /// Message on a joined channel.
    ChannelMessage {
        /// Channel name.
        channel: String,
        /// Serialized message, no id prefix.
        data: Vec<u8>,
    },

    /// The session left a named channel.
    LeftChannel {
        /// Channel name.
        channel: String,
    },
}

// ============================================================================
// Transport
// ============================================================================

/// Moves session frames to and from the server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connects and starts transport-level login.
    ///
    /// Returns once the login request is on its way. The outcome arrives
    /// later as [`TransportEvent::LoggedIn`] or
    /// [`TransportEvent::LoginFailed`] on `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    async fn login(&self, params: &LoginParameters, events: TransportEvents) -> Result<()>;

    /// Queues a session-channel frame for sending.
    ///
    /// Frames queued by one caller leave in the order they were queued.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ConnectionClosed`] if there is no connection.
    fn send(&self, frame: Vec<u8>) -> Result<()>;

    /// Logs out and closes the connection. Safe to call when not connected.
    ///
    /// # Errors
    ///
    /// Returns an error if the logout could not be delivered.
    async fn logout(&self) -> Result<()>;
}
