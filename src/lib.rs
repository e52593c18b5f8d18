//! Wonderland session - client sessions for Wonderland virtual-world servers.
//!
//! This library logs in to a Wonderland server and multiplexes many
//! independent protocol clients over that one connection.
//!
//! # Architecture
//!
//! The session sits between protocol clients and a transport:
//!
//! - **Clients**: protocol endpoints (chat, cell sync, audio, ...) keyed by
//!   [`ClientType`], each bound to a server-assigned client id on attach
//! - **Session**: login, attach/detach, framing, response correlation and
//!   channel routing
//! - **Transport**: moves byte frames and reports connection events
//!
//! Key design principles:
//!
//! - Session-channel frames carry a 2-byte big-endian client id prefix
//! - A response reuses the id of the request it answers
//! - Inbound traffic is processed on one task per login, in arrival order
//! - No lock is held while calling out to clients or listeners
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use wonderland_session::{Client, LoginParameters, Message, Result, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::builder()
//!         .server_address("localhost", 1139)
//!         .build()?;
//!
//!     session.login(LoginParameters::new("alice", "secret")).await?;
//!
//!     let chat = Client::with_fn("chat", |_client, message| {
//!         println!("chat: {message}");
//!     });
//!     session.attach(&chat).await?;
//!
//!     chat.send(Message::data("chat.say", json!({ "text": "hello" })))?;
//!
//!     session.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Protocol clients: [`Client`], [`MessageHandler`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`listener`] | Response correlation listeners |
//! | [`protocol`] | Messages, responses, framing and channel names |
//! | [`session`] | [`Session`], its builder and options |
//! | [`transport`] | [`Transport`] seam and the WebSocket transport |

// ============================================================================
// Modules
// ============================================================================

/// Protocol clients multiplexed over a session.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing message, client and listener ids.
pub mod identifiers;

/// Response correlation listeners.
pub mod listener;

/// Session protocol message types.
pub mod protocol;

/// Session lifecycle, attach/detach and routing.
///
/// Use [`Session::builder()`] to create a configured session.
pub mod session;

/// Transport seam and WebSocket transport.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientStatus, MessageHandler};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ClientId, ListenerId, MessageId};

// Listener types
pub use listener::{OkErrorResponseListener, ResponseListener, WaitResponseListener};

// Protocol types
pub use protocol::{
    ChannelNames, ClientType, Message, MessageBody, ProtocolVersion, ResponseKind, ResponseMessage,
};

// Session types
pub use session::{
    ChannelJoinedListener, ClientChannelListener, LoginParameters, ServerInfo, Session,
    SessionBuilder, SessionOptions, SessionStatus,
};

// Transport types
pub use transport::{Transport, TransportEvent, TransportEvents, WebSocketTransport};
