//! JSON frames exchanged with the server over WebSocket.
//!
//! Binary payloads travel base64-encoded inside text frames.
//!
//! # Format
//!
//! ```json
//! { "type": "login", "username": "alice", "password": "secret" }
//! { "type": "loggedIn" }
//! { "type": "sessionMessage", "data": "AAdleyJpZCI6..." }
//! { "type": "channelJoined", "channel": "wonderland.Client.chat" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::TransportEvent;

// ============================================================================
// TransportFrame
// ============================================================================

/// One text frame on the WebSocket.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransportFrame {
    /// Client → server: credentials.
    Login {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },

    /// Server → client: login accepted.
    LoggedIn,

    /// Server → client: login refused.
    LoginFailed {
        /// Reason given by the server.
        reason: String,
    },

    /// Client → server: orderly logout.
    Logout,

    /// Both directions: session-channel frame.
    SessionMessage {
        /// Base64 of `[u16 client id][message]`.
        data: String,
    },

    /// Server → client: joined a channel.
    ChannelJoined {
        /// Channel name.
        channel: String,
    },

    /// Server → client: message on a channel.
    ChannelMessage {
        /// Channel name.
        channel: String,
        /// Base64 of the serialized message.
        data: String,
    },

    /// Server → client: left a channel.
    ChannelLeft {
        /// Channel name.
        channel: String,
    },
}

impl TransportFrame {
    /// Wraps a session-channel frame.
    #[must_use]
    pub fn session_message(bytes: &[u8]) -> Self {
        Self::SessionMessage {
            data: STANDARD.encode(bytes),
        }
    }

    /// Wraps a channel message.
    #[must_use]
    pub fn channel_message(channel: impl Into<String>, bytes: &[u8]) -> Self {
        Self::ChannelMessage {
            channel: channel.into(),
            data: STANDARD.encode(bytes),
        }
    }

    /// Decodes the payload of a `SessionMessage` frame.
    ///
    /// Returns `None` for every other frame type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the payload is not valid base64.
    pub fn session_bytes(&self) -> Result<Option<Vec<u8>>> {
        match self {
            Self::SessionMessage { data } => decode_base64(data).map(Some),
            _ => Ok(None),
        }
    }

    /// Converts a server frame into the event it reports.
    ///
    /// Client-only frames yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if a payload is not valid base64.
    pub fn into_event(self) -> Result<Option<TransportEvent>> {
        let event = match self {
            Self::LoggedIn => TransportEvent::LoggedIn,
            Self::LoginFailed { reason } => TransportEvent::LoginFailed { reason },
            Self::SessionMessage { data } => TransportEvent::SessionMessage(decode_base64(&data)?),
            Self::ChannelJoined { channel } => TransportEvent::JoinedChannel { channel },
            Self::ChannelMessage { channel, data } => TransportEvent::ChannelMessage {
                channel,
                data: decode_base64(&data)?,
            },
            Self::ChannelLeft { channel } => TransportEvent::LeftChannel { channel },
            Self::Login { .. } | Self::Logout => return Ok(None),
        };
        Ok(Some(event))
    }
}

impl fmt::Debug for TransportFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::LoggedIn => f.write_str("LoggedIn"),
            Self::LoginFailed { reason } => {
                f.debug_struct("LoginFailed").field("reason", reason).finish()
            }
            Self::Logout => f.write_str("Logout"),
            Self::SessionMessage { data } => f
                .debug_struct("SessionMessage")
                .field("len", &data.len())
                .finish(),
            Self::ChannelJoined { channel } => f
                .debug_struct("ChannelJoined")
                .field("channel", channel)
                .finish(),
            Self::ChannelMessage { channel, data } => f
                .debug_struct("ChannelMessage")
                .field("channel", channel)
                .field("len", &data.len())
                .finish(),
            Self::ChannelLeft { channel } => f
                .debug_struct("ChannelLeft")
                .field("channel", channel)
                .finish(),
        }
    }
}

fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(data)
        .map_err(|e| Error::protocol(format!("Invalid base64 payload: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
