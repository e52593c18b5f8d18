//! Message types exchanged between a session and the server.
//!
//! Every message carries a [`MessageId`] and a [`MessageBody`]. Handshake
//! bodies are defined here; protocol clients put their own content in
//! [`MessageBody::Data`].
//!
//! # Format
//!
//! ```json
//! {
//!   "id": 12,
//!   "body": {
//!     "type": "attachClient",
//!     "data": { "clientType": "chat", "properties": {} }
//!   }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::result::Result as StdResult;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{ClientId, MessageId};

use super::response::{ResponseKind, ResponseMessage};

// ============================================================================
// ClientType
// ============================================================================

/// Identifies a protocol family, e.g. `chat` or `cell-sync`.
///
/// A session holds at most one attached client per type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientType(String);

impl ClientType {
    /// Name of the type used by the session-internal client.
    pub const INTERNAL_NAME: &'static str = "SessionInternal";

    /// Creates a client type from its name.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The client type of the session-internal client.
    #[inline]
    #[must_use]
    pub fn internal() -> Self {
        Self::new(Self::INTERNAL_NAME)
    }

    /// Returns the type name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the session-internal type.
    #[inline]
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.0 == Self::INTERNAL_NAME
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ClientType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

// ============================================================================
// ProtocolVersion
// ============================================================================

/// Version of the session protocol announced during login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    /// Major version; servers reject a mismatch.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl ProtocolVersion {
    /// Creates a protocol version.
    #[inline]
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Returns `true` if a peer speaking `other` can talk to this version.
    #[inline]
    #[must_use]
    pub const fn is_compatible(&self, other: &ProtocolVersion) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ============================================================================
// MessageBody
// ============================================================================

/// Content of a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum MessageBody {
    /// Announces the protocol the session speaks. Reply: `Ok` or `Error`.
    #[serde(rename_all = "camelCase")]
    ProtocolSelection {
        /// Protocol name.
        protocol_name: String,
        /// Protocol version.
        protocol_version: ProtocolVersion,
    },

    /// Requests a client id for a client type. Reply: `AttachedClient` or `Error`.
    #[serde(rename_all = "camelCase")]
    AttachClient {
        /// Type of the attaching client.
        client_type: ClientType,
        /// Optional attach properties forwarded to the server handler.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        properties: BTreeMap<String, String>,
    },

    /// Releases a client id. No reply.
    #[serde(rename_all = "camelCase")]
    DetachClient {
        /// Id being released.
        client_id: ClientId,
    },

    /// Reply to an earlier message with the same id.
    Response(ResponseKind),

    /// Application content for a protocol client.
    Data {
        /// Application-defined message name, e.g. `chat.say`.
        name: String,
        /// Application payload.
        #[serde(default)]
        payload: Value,
    },
}

impl MessageBody {
    /// Short name of the body variant, for logging.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ProtocolSelection { .. } => "protocolSelection",
            Self::AttachClient { .. } => "attachClient",
            Self::DetachClient { .. } => "detachClient",
            Self::Response(kind) => kind.name(),
            Self::Data { .. } => "data",
        }
    }
}

// ============================================================================
// Message
// ============================================================================

/// An immutable unit of communication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Correlation id.
    pub id: MessageId,

    /// Message content.
    pub body: MessageBody,
}

/// Only the id of a message, used to salvage correlation from bad payloads.
#[derive(Deserialize)]
struct MessageIdOnly {
    id: MessageId,
}

impl Message {
    /// Creates a message with a freshly allocated id.
    #[inline]
    #[must_use]
    pub fn new(body: MessageBody) -> Self {
        Self {
            id: MessageId::next(),
            body,
        }
    }

    /// Creates a message with a specific id.
    #[inline]
    #[must_use]
    pub fn with_id(id: MessageId, body: MessageBody) -> Self {
        Self { id, body }
    }

    /// Creates a protocol selection message.
    #[must_use]
    pub fn protocol_selection(name: impl Into<String>, version: ProtocolVersion) -> Self {
        Self::new(MessageBody::ProtocolSelection {
            protocol_name: name.into(),
            protocol_version: version,
        })
    }

    /// Creates an attach request for `client_type`.
    #[must_use]
    pub fn attach_client(client_type: ClientType, properties: BTreeMap<String, String>) -> Self {
        Self::new(MessageBody::AttachClient {
            client_type,
            properties,
        })
    }

    /// Creates a detach notice for `client_id`.
    #[must_use]
    pub fn detach_client(client_id: ClientId) -> Self {
        Self::new(MessageBody::DetachClient { client_id })
    }

    /// Creates an application message.
    #[must_use]
    pub fn data(name: impl Into<String>, payload: Value) -> Self {
        Self::new(MessageBody::Data {
            name: name.into(),
            payload,
        })
    }

    /// Creates a response to the message with id `in_reply_to`.
    #[must_use]
    pub fn response(in_reply_to: MessageId, kind: ResponseKind) -> Self {
        Self::with_id(in_reply_to, MessageBody::Response(kind))
    }

    /// Returns `true` if this message answers an earlier request.
    #[inline]
    #[must_use]
    pub fn is_response(&self) -> bool {
        matches!(self.body, MessageBody::Response(_))
    }

    /// Splits a response off, handing back non-responses unchanged.
    pub fn into_response(self) -> StdResult<ResponseMessage, Message> {
        match self.body {
            MessageBody::Response(kind) => Ok(ResponseMessage { id: self.id, kind }),
            body => Err(Message { id: self.id, body }),
        }
    }

    /// Returns the application payload for `Data` messages.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match &self.body {
            MessageBody::Data { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Deserializes the application payload into `T`.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if this is not a `Data` message
    /// - [`Error::Json`] if the payload does not match `T`
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        let payload = self.payload().ok_or_else(|| {
            Error::protocol(format!("{} message carries no payload", self.body.kind_name()))
        })?;
        Ok(T::deserialize(payload)?)
    }

    /// Serializes the message to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserializes a message from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the bytes are not a valid message.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Reads just the id from a payload that failed to deserialize.
    ///
    /// Returns `None` when not even the id can be recovered.
    #[must_use]
    pub fn recover_id(bytes: &[u8]) -> Option<MessageId> {
        serde_json::from_slice::<MessageIdOnly>(bytes)
            .ok()
            .map(|partial| partial.id)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.body.kind_name(), self.id)
    }
}

// ============================================================================
// Tests
// ============================================================================
