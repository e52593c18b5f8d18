//! Session protocol message types.
//!
//! This module defines what travels between a session and the server,
//! independent of the transport carrying it.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Reply |
//! |---------|-----------|-------|
//! | `ProtocolSelection` | Client → Server | `Ok` or `Error` |
//! | `AttachClient` | Client → Server | `AttachedClient` or `Error` |
//! | `DetachClient` | Client → Server | none |
//! | `Data` | both | application defined |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Session-channel framing and channel names |
//! | `message` | Message, body and client type definitions |
//! | `response` | Response messages and kinds |

// ============================================================================
// Submodules
// ============================================================================

/// Session-channel framing and channel naming.
pub mod frame;

/// Message definitions.
pub mod message;

/// Response message types.
pub mod response;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{ChannelNames, DEFAULT_NAMESPACE};
pub use message::{ClientType, Message, MessageBody, ProtocolVersion};
pub use response::{ResponseKind, ResponseMessage};
