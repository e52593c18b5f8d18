//! Session configuration options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use wonderland_session::{ServerInfo, SessionOptions};
//!
//! let options = SessionOptions::new()
//!     .with_server(ServerInfo::new("localhost", 1139))
//!     .with_namespace("wonderland")
//!     .with_timeouts(Duration::from_secs(30));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use crate::protocol::{DEFAULT_NAMESPACE, ProtocolVersion};

// ============================================================================
// Constants
// ============================================================================

/// Protocol name announced during login.
pub const DEFAULT_PROTOCOL_NAME: &str = "wonderland_client";

/// Protocol version announced during login.
pub const DEFAULT_PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion::new(0, 5);

// ============================================================================
// ServerInfo
// ============================================================================

/// Address of a Wonderland server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerInfo {
    /// Host name or IP address.
    pub hostname: String,
    /// Port.
    pub port: u16,
}

impl ServerInfo {
    /// Creates server info.
    #[inline]
    #[must_use]
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// WebSocket URL of the server.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.hostname, self.port)
    }
}

impl fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

// ============================================================================
// LoginParameters
// ============================================================================

/// Credentials for one login.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginParameters {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl LoginParameters {
    /// Creates login parameters.
    #[inline]
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginParameters")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// SessionOptions
// ============================================================================

/// Session configuration.
///
/// All waits are unbounded unless a timeout is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Server to connect to.
    pub server: Option<ServerInfo>,

    /// Channel namespace.
    pub namespace: String,

    /// Protocol announced during login.
    pub protocol_name: String,

    /// Protocol version announced during login.
    pub protocol_version: ProtocolVersion,

    /// Bound on [`Session::login`](super::Session::login).
    pub login_timeout: Option<Duration>,

    /// Bound on [`Session::attach`](super::Session::attach).
    pub attach_timeout: Option<Duration>,

    /// Bound on [`Client::send_and_wait`](crate::Client::send_and_wait).
    pub response_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl SessionOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            server: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            protocol_name: DEFAULT_PROTOCOL_NAME.to_string(),
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            login_timeout: None,
            attach_timeout: None,
            response_timeout: None,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionOptions {
    /// Sets the server.
    #[inline]
    #[must_use]
    pub fn with_server(mut self, server: ServerInfo) -> Self {
        self.server = Some(server);
        self
    }

    /// Sets the channel namespace.
    #[inline]
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the protocol announced during login.
    #[inline]
    #[must_use]
    pub fn with_protocol(mut self, name: impl Into<String>, version: ProtocolVersion) -> Self {
        self.protocol_name = name.into();
        self.protocol_version = version;
        self
    }

    /// Bounds login.
    #[inline]
    #[must_use]
    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = Some(timeout);
        self
    }

    /// Bounds attach.
    #[inline]
    #[must_use]
    pub fn with_attach_timeout(mut self, timeout: Duration) -> Self {
        self.attach_timeout = Some(timeout);
        self
    }

    /// Bounds waiting for a response.
    #[inline]
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    /// Bounds login, attach and response waits with the same timeout.
    #[inline]
    #[must_use]
    pub fn with_timeouts(self, timeout: Duration) -> Self {
        self.with_login_timeout(timeout)
            .with_attach_timeout(timeout)
            .with_response_timeout(timeout)
    }
}

// ============================================================================
// Tests
// ============================================================================
