//! Builder pattern for session configuration.
//!
//! Provides a fluent API for configuring and creating [`Session`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use wonderland_session::Session;
//!
//! # fn example() -> wonderland_session::Result<()> {
//! let session = Session::builder()
//!     .server_address("localhost", 1139)
//!     .timeouts(Duration::from_secs(30))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::ProtocolVersion;
use crate::transport::{Transport, WebSocketTransport};

use super::core::Session;
use super::options::{ServerInfo, SessionOptions};

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for configuring a [`Session`] instance.
///
/// Use [`Session::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct SessionBuilder {
    /// Session options.
    options: SessionOptions,
    /// Explicit transport, overriding the one derived from the server.
    transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("options", &self.options)
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

// ============================================================================
// SessionBuilder Implementation
// ============================================================================

impl SessionBuilder {
    /// Creates a new builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the server.
    #[inline]
    #[must_use]
    pub fn server(mut self, server: ServerInfo) -> Self {
        self.options.server = Some(server);
        self
    }

    /// Sets the server by host name and port.
    #[inline]
    #[must_use]
    pub fn server_address(self, hostname: impl Into<String>, port: u16) -> Self {
        self.server(ServerInfo::new(hostname, port))
    }

    /// Sets the channel namespace.
    #[inline]
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.options.namespace = namespace.into();
        self
    }

    /// Sets the protocol announced during login.
    #[inline]
    #[must_use]
    pub fn protocol(mut self, name: impl Into<String>, version: ProtocolVersion) -> Self {
        self.options.protocol_name = name.into();
        self.options.protocol_version = version;
        self
    }

    /// Bounds login.
    #[inline]
    #[must_use]
    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.options.login_timeout = Some(timeout);
        self
    }

    /// Bounds attach.
    #[inline]
    #[must_use]
    pub fn attach_timeout(mut self, timeout: Duration) -> Self {
        self.options.attach_timeout = Some(timeout);
        self
    }

    /// Bounds waiting for responses.
    #[inline]
    #[must_use]
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.options.response_timeout = Some(timeout);
        self
    }

    /// Bounds login, attach and response waits with the same timeout.
    #[inline]
    #[must_use]
    pub fn timeouts(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_timeouts(timeout);
        self
    }

    /// Uses `transport` instead of a WebSocket to the server.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Uses a shared transport.
    #[inline]
    #[must_use]
    pub fn transport_arc(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the session with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the namespace or protocol name is invalid
    /// - [`Error::Config`] if neither a server nor a transport is set
    pub fn build(self) -> Result<Session> {
        self.validate_namespace()?;
        self.validate_protocol()?;
        let transport = self.resolve_transport()?;

        Ok(Session::new(self.options, transport))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SessionBuilder {
    /// Validates the channel namespace.
    fn validate_namespace(&self) -> Result<()> {
        let namespace = &self.options.namespace;

        if namespace.is_empty() {
            return Err(Error::config(
                "Namespace must not be empty. Use .namespace() to set it.\n\
                 Example: Session::builder().namespace(\"wonderland\")",
            ));
        }

        if namespace.chars().any(char::is_whitespace) {
            return Err(Error::config(format!(
                "Namespace '{namespace}' must not contain whitespace"
            )));
        }

        Ok(())
    }

    /// Validates the protocol name.
    fn validate_protocol(&self) -> Result<()> {
        if self.options.protocol_name.trim().is_empty() {
            return Err(Error::config("Protocol name must not be empty"));
        }
        Ok(())
    }

    /// Picks the explicit transport or derives one from the server.
    fn resolve_transport(&self) -> Result<Arc<dyn Transport>> {
        if let Some(transport) = &self.transport {
            return Ok(Arc::clone(transport));
        }

        let server = self.options.server.as_ref().ok_or_else(|| {
            Error::config(
                "Server is required. Use .server() or .server_address() to set it.\n\
                 Example: Session::builder().server_address(\"localhost\", 1139)",
            )
        })?;

        Ok(Arc::new(WebSocketTransport::for_server(server)?))
    }
}

// ============================================================================
// Tests
// ============================================================================
