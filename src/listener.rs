//! Response correlation listeners.
//!
//! A [`ResponseListener`] registered alongside a sent message is invoked
//! once with the response carrying the same id. Two ready-made listeners
//! cover the common cases:
//!
//! - [`WaitResponseListener`] turns the callback into an awaitable result
//! - [`OkErrorResponseListener`] splits the callback into success/failure
//!
//! # Example
//!
//! ```ignore
//! let listener = Arc::new(WaitResponseListener::new());
//! client.send_with_listener(request, listener.clone())?;
//! let response = listener.wait_for_response(None).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::MessageId;
use crate::protocol::{ResponseKind, ResponseMessage};

// ============================================================================
// Types
// ============================================================================

/// Success callback of an [`OkErrorResponseListener`].
type SuccessFn = Box<dyn Fn(MessageId) + Send + Sync>;

/// Failure callback of an [`OkErrorResponseListener`]: id, message, cause.
type FailureFn = Box<dyn Fn(MessageId, &str, Option<&str>) + Send + Sync>;

// ============================================================================
// ResponseListener
// ============================================================================

/// Receives the response to one sent message.
///
/// Invoked on the session's delivery task. Implementations must not block.
pub trait ResponseListener: Send + Sync {
    /// Called once with the correlated response.
    fn response_received(&self, response: ResponseMessage);
}

impl<F> ResponseListener for F
where
    F: Fn(ResponseMessage) + Send + Sync,
{
    fn response_received(&self, response: ResponseMessage) {
        self(response);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Awaits a oneshot reply, optionally bounded.
///
/// A dropped sender means the connection went away.
pub(crate) async fn wait_reply<T>(
    receiver: oneshot::Receiver<T>,
    limit: Option<Duration>,
    operation: &str,
) -> Result<T> {
    let received = match limit {
        Some(limit) => timeout(limit, receiver)
            .await
            .map_err(|_| Error::timeout_after(operation, limit))?,
        None => receiver.await,
    };

    received.map_err(|_| Error::ConnectionClosed)
}

// ============================================================================
// WaitResponseListener
// ============================================================================

/// Listener whose response can be awaited.
///
/// Only the first response is kept; later deliveries are ignored.
pub struct WaitResponseListener {
    /// Taken on first delivery.
    sender: Mutex<Option<oneshot::Sender<ResponseMessage>>>,
    /// Taken by the single waiter.
    receiver: Mutex<Option<oneshot::Receiver<ResponseMessage>>>,
}

impl WaitResponseListener {
    /// Creates a listener that has not yet received a response.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Returns `true` once a response has been delivered.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Waits for the response.
    ///
    /// `None` waits without bound, matching the plain blocking semantics;
    /// the session still releases the waiter when the connection drops.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if `limit` elapses first
    /// - [`Error::ConnectionClosed`] if the listener was dropped undelivered
    /// - [`Error::IllegalState`] if the response was already awaited
    pub async fn wait_for_response(&self, limit: Option<Duration>) -> Result<ResponseMessage> {
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or_else(|| Error::illegal_state("Response already awaited"))?;

        wait_reply(receiver, limit, "waiting for response").await
    }
}

impl Default for WaitResponseListener {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WaitResponseListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitResponseListener")
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl ResponseListener for WaitResponseListener {
    fn response_received(&self, response: ResponseMessage) {
        match self.sender.lock().take() {
            Some(sender) => {
                trace!(id = %response.id, "Response delivered to waiter");
                let _ = sender.send(response);
            }
            None => warn!(id = %response.id, "Duplicate response ignored"),
        }
    }
}

// ============================================================================
// OkErrorResponseListener
// ============================================================================

/// Classifies a response into success or failure.
///
/// Any kind other than `Ok` or `Error` is reported as a failure naming the
/// unexpected kind.
pub struct OkErrorResponseListener {
    on_success: SuccessFn,
    on_failure: FailureFn,
}

impl OkErrorResponseListener {
    /// Creates a listener from success and failure callbacks.
    pub fn new<S, F>(on_success: S, on_failure: F) -> Self
    where
        S: Fn(MessageId) + Send + Sync + 'static,
        F: Fn(MessageId, &str, Option<&str>) + Send + Sync + 'static,
    {
        Self {
            on_success: Box::new(on_success),
            on_failure: Box::new(on_failure),
        }
    }
}

impl ResponseListener for OkErrorResponseListener {
    fn response_received(&self, response: ResponseMessage) {
        match response.kind {
            ResponseKind::Ok => (self.on_success)(response.id),
            ResponseKind::Error { message, cause } => {
                (self.on_failure)(response.id, &message, cause.as_deref());
            }
            other @ ResponseKind::AttachedClient { .. } => {
                warn!(id = %response.id, kind = other.name(), "Unexpected response type");
                let message = format!("Unexpected response type: {}", other.name());
                (self.on_failure)(response.id, &message, None);
            }
        }
    }
}

impl fmt::Debug for OkErrorResponseListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OkErrorResponseListener").finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
