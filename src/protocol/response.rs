//! Response message types.
//!
//! A response carries the id of the request it answers. Its kind is a
//! closed set matched exhaustively by listeners.
//!
//! # Format
//!
//! ```json
//! { "status": "ok" }
//! { "status": "error", "message": "version mismatch", "cause": null }
//! { "status": "attachedClient", "clientId": 7 }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identifiers::{ClientId, MessageId};

use super::message::Message;

// ============================================================================
// ResponseKind
// ============================================================================

/// Outcome carried by a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ResponseKind {
    /// Request succeeded.
    Ok,

    /// Request failed.
    Error {
        /// Human-readable reason.
        message: String,
        /// Description of the underlying cause, if any.
        #[serde(default)]
        cause: Option<String>,
    },

    /// Attach succeeded and the server assigned a client id.
    #[serde(rename_all = "camelCase")]
    AttachedClient {
        /// Assigned id.
        client_id: ClientId,
    },
}

impl ResponseKind {
    /// Short name of the variant, for logging and diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error { .. } => "error",
            Self::AttachedClient { .. } => "attachedClient",
        }
    }
}

// ============================================================================
// ResponseMessage
// ============================================================================

/// A response correlated to a request by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    /// Id of the request this answers.
    pub id: MessageId,

    /// Outcome.
    pub kind: ResponseKind,
}

impl ResponseMessage {
    /// Creates a success response.
    #[inline]
    #[must_use]
    pub fn ok(id: MessageId) -> Self {
        Self {
            id,
            kind: ResponseKind::Ok,
        }
    }

    /// Creates an error response.
    #[inline]
    #[must_use]
    pub fn error(id: MessageId, message: impl Into<String>, cause: Option<String>) -> Self {
        Self {
            id,
            kind: ResponseKind::Error {
                message: message.into(),
                cause,
            },
        }
    }

    /// Creates an attach success response.
    #[inline]
    #[must_use]
    pub fn attached_client(id: MessageId, client_id: ClientId) -> Self {
        Self {
            id,
            kind: ResponseKind::AttachedClient { client_id },
        }
    }

    /// Returns `true` for [`ResponseKind::Ok`].
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self.kind, ResponseKind::Ok)
    }

    /// Returns `true` for [`ResponseKind::Error`].
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.kind, ResponseKind::Error { .. })
    }

    /// Converts back into a wire message.
    #[inline]
    #[must_use]
    pub fn into_message(self) -> Message {
        Message::response(self.id, self.kind)
    }
}

impl fmt::Display for ResponseMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ResponseKind::Error { message, .. } => write!(f, "error#{}: {message}", self.id),
            kind => write!(f, "{}#{}", kind.name(), self.id),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
