//! Error types for Wonderland sessions.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use wonderland_session::{Result, Session};
//!
//! async fn example(session: &Session, chat: &Client) -> Result<()> {
//!     session.attach(chat).await?;
//!     chat.send(Message::data("chat.say", json!({ "text": "hi" })))?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Session lifecycle | [`Error::LoginFailed`], [`Error::AttachFailed`], [`Error::IllegalState`] |
//! | Messaging | [`Error::MessageSend`], [`Error::Protocol`], [`Error::UnknownClient`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | Execution | [`Error::Timeout`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;
use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::ClientId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when session configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Session Lifecycle Errors
    // ========================================================================
    /// Login or protocol selection failed.
    ///
    /// Transport refusals, protocol mismatches, disconnects during login
    /// and login timeouts all collapse into this variant.
    #[error("Login failed: {reason}")]
    LoginFailed {
        /// Human-readable reason.
        reason: String,
        /// Underlying cause, if any.
        #[source]
        cause: Option<Box<Error>>,
    },

    /// Attaching a client to the session failed.
    #[error("Attach failed: {reason}")]
    AttachFailed {
        /// Human-readable reason (server supplied where available).
        reason: String,
        /// Server-supplied cause description.
        cause: Option<String>,
    },

    /// Operation not valid in the current session or client state.
    #[error("Illegal state: {message}")]
    IllegalState {
        /// Description of the violated precondition.
        message: String,
    },

    // ========================================================================
    // Messaging Errors
    // ========================================================================
    /// Sending a message failed in the transport.
    ///
    /// Sends are never retried; retry policy belongs to the caller.
    #[error("Message send failed: {source}")]
    MessageSend {
        /// The transport error.
        #[source]
        source: Box<Error>,
    },

    /// Malformed frame or message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Session-channel frame addressed to a client id with no record.
    #[error("Message to unknown client: {client_id}")]
    UnknownClient {
        /// The client id read from the frame.
        client_id: ClientId,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection closed while an operation was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Operation timeout.
    ///
    /// Returned when a bounded wait exceeds its configured duration.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a login failure without an underlying cause.
    #[inline]
    pub fn login_failed(reason: impl Into<String>) -> Self {
        Self::LoginFailed {
            reason: reason.into(),
            cause: None,
        }
    }

    /// Creates a login failure wrapping another error.
    #[inline]
    pub fn login_failed_with(reason: impl Into<String>, cause: Error) -> Self {
        Self::LoginFailed {
            reason: reason.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Creates an attach failure.
    #[inline]
    pub fn attach_failed(reason: impl Into<String>) -> Self {
        Self::AttachFailed {
            reason: reason.into(),
            cause: None,
        }
    }

    /// Creates an attach failure carrying a server-supplied cause.
    #[inline]
    pub fn attach_failed_with(reason: impl Into<String>, cause: Option<String>) -> Self {
        Self::AttachFailed {
            reason: reason.into(),
            cause,
        }
    }

    /// Creates an illegal state error.
    #[inline]
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Wraps a transport error raised while sending.
    #[inline]
    pub fn message_send(source: Error) -> Self {
        Self::MessageSend {
            source: Box::new(source),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an unknown client error.
    #[inline]
    pub fn unknown_client(client_id: ClientId) -> Self {
        Self::UnknownClient { client_id }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a timeout error from the elapsed limit, saturating at `u64::MAX` ms.
    #[inline]
    pub fn timeout_after(operation: impl Into<String>, limit: Duration) -> Self {
        Self::timeout(
            operation,
            u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        )
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a session or client state violation.
    #[inline]
    #[must_use]
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
