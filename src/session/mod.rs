//! Session lifecycle and client multiplexing.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──login──► Connecting ──protocol accepted──► Connected
//!       ▲                      │                                │
//!       └──────── failure ─────┘◄──────── disconnect / lost ────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent session configuration |
//! | `channel` | Named-channel routing |
//! | `core` | The session itself |
//! | `login` | Login attempt state and the dispatch task |
//! | `options` | Server, credentials and timeouts |
//! | `record` | Client records and attach completion |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent session configuration.
pub mod builder;

/// Named-channel routing.
pub mod channel;

/// Session core implementation.
pub mod core;

/// Login attempt and dispatch loop.
mod login;

/// Session options.
pub mod options;

/// Client records.
mod record;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SessionBuilder;
pub use channel::{ChannelJoinedListener, ClientChannelListener};
pub use core::{Session, SessionStatus};
pub use options::{
    DEFAULT_PROTOCOL_NAME, DEFAULT_PROTOCOL_VERSION, LoginParameters, ServerInfo, SessionOptions,
};

pub(crate) use core::SessionInner;
