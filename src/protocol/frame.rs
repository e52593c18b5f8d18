//! Session-channel framing and channel naming.
//!
//! # Session channel
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────┐
//! │ client id (u16, BE)  │ serialized message bytes     │
//! └──────────────────────┴──────────────────────────────┘
//! ```
//!
//! # Named channels
//!
//! | Channel | Payload |
//! |---------|---------|
//! | `<namespace>.Client.<ClientType>` | serialized message, no id prefix |
//! | `<namespace>.ALL_CLIENTS` | serialized message, no id prefix |

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};
use crate::identifiers::ClientId;

use super::message::{ClientType, Message};

// ============================================================================
// Constants
// ============================================================================

/// Length of the client id prefix on session-channel frames.
pub const CLIENT_ID_LEN: usize = 2;

/// Default channel namespace.
pub const DEFAULT_NAMESPACE: &str = "wonderland";

/// Segment between the namespace and the client type on client channels.
const CLIENT_SEGMENT: &str = "Client";

/// Suffix of the broadcast channel.
const ALL_CLIENTS_SUFFIX: &str = "ALL_CLIENTS";

// ============================================================================
// Framing
// ============================================================================

/// Frames a message for the session channel.
///
/// # Errors
///
/// Returns [`Error::Json`] if the message cannot be serialized.
pub fn encode(client_id: ClientId, message: &Message) -> Result<Vec<u8>> {
    Ok(encode_bytes(client_id, &message.to_bytes()?))
}

/// Prepends `client_id` to already serialized message bytes.
#[must_use]
pub fn encode_bytes(client_id: ClientId, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(CLIENT_ID_LEN + payload.len());
    frame.extend_from_slice(&client_id.as_u16().to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Splits a session-channel frame into its client id and payload.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the frame is shorter than the id prefix.
pub fn decode(frame: &[u8]) -> Result<(ClientId, &[u8])> {
    match frame {
        [hi, lo, payload @ ..] => Ok((ClientId::new(u16::from_be_bytes([*hi, *lo])), payload)),
        _ => Err(Error::protocol(format!(
            "Session frame too short: {} bytes",
            frame.len()
        ))),
    }
}

// ============================================================================
// ChannelNames
// ============================================================================

/// Builds and parses channel names under one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNames {
    /// `<namespace>.Client.`
    client_prefix: String,
    /// `<namespace>.ALL_CLIENTS`
    all_clients: String,
}

impl ChannelNames {
    /// Creates channel names for `namespace`.
    #[must_use]
    pub fn new(namespace: &str) -> Self {
        Self {
            client_prefix: format!("{namespace}.{CLIENT_SEGMENT}."),
            all_clients: format!("{namespace}.{ALL_CLIENTS_SUFFIX}"),
        }
    }

    /// Name of the dedicated channel for `client_type`.
    #[must_use]
    pub fn client_channel(&self, client_type: &ClientType) -> String {
        format!("{}{}", self.client_prefix, client_type.name())
    }

    /// Name of the broadcast channel.
    #[inline]
    #[must_use]
    pub fn all_clients_channel(&self) -> &str {
        &self.all_clients
    }

    /// Extracts the client type from a dedicated channel name.
    #[must_use]
    pub fn parse_client_channel(&self, channel: &str) -> Option<ClientType> {
        channel
            .strip_prefix(&self.client_prefix)
            .filter(|name| !name.is_empty())
            .map(ClientType::from)
    }

    /// Returns `true` if `channel` is the broadcast channel.
    #[inline]
    #[must_use]
    pub fn is_all_clients_channel(&self, channel: &str) -> bool {
        channel == self.all_clients
    }
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_encode_prefixes_big_endian_id() {
        let frame = encode_bytes(ClientId::new(0x0107), b"abc");
        assert_eq!(frame, vec![0x01, 0x07, b'a', b'b', b'c']);
    }

    #[test]
    fn test_every_client_id_survives_framing() {
        for raw_id in 0..=u16::MAX {
            let frame = encode_bytes(ClientId::new(raw_id), b"{}");
            let (client_id, payload) = decode(&frame).expect("decode");
            assert_eq!(client_id.as_u16(), raw_id);
            assert_eq!(payload, b"{}");
        }
    }

    #[test]
    fn test_decode_short_frame() {
        assert!(decode(&[]).is_err());
        assert!(decode(&[0x00]).is_err());

        let (id, payload) = decode(&[0x00, 0x05]).expect("id only");
        assert_eq!(id, ClientId::new(5));
        assert!(payload.is_empty());
    }

    #[test]
    fn test_channel_names() {
        let names = ChannelNames::new("wonderland");
        let chat = ClientType::new("chat");

        assert_eq!(names.client_channel(&chat), "wonderland.Client.chat");
        assert_eq!(names.all_clients_channel(), "wonderland.ALL_CLIENTS");
        assert_eq!(
            names.parse_client_channel("wonderland.Client.chat"),
            Some(chat)
        );
        assert_eq!(names.parse_client_channel("wonderland.Client."), None);
        assert_eq!(names.parse_client_channel("other.Client.chat"), None);
        assert!(names.is_all_clients_channel("wonderland.ALL_CLIENTS"));
    }

    proptest! {
        #[test]
        fn prop_frame_round_trip(raw_id in any::<u16>(), text in ".{0,64}") {
            let message = Message::data("test.echo", json!({ "text": text }));
            let serialized = message.to_bytes().expect("serialize");

            let frame = encode(ClientId::new(raw_id), &message).expect("encode");
            let (client_id, payload) = decode(&frame).expect("decode");

            prop_assert_eq!(client_id, ClientId::new(raw_id));
            prop_assert_eq!(payload, serialized.as_slice());
        }
    }
}
