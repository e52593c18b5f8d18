//! Logical protocol endpoints multiplexed over a session.
//!
//! A [`Client`] is identified by its [`ClientType`]. It receives messages
//! through [`Client::message_received`] and sends only through the session
//! it is attached to; it never touches the transport.
//!
//! # Lifecycle
//!
//! ```text
//! Detached ──Session::attach──► Attached ──detach / channel lost──► Detached
//! ```
//!
//! # Example
//!
//! ```ignore
//! let chat = Client::with_fn("chat", |_client, message| {
//!     println!("chat: {message}");
//! });
//!
//! session.attach(&chat).await?;
//! chat.send(Message::data("chat.say", json!({ "text": "hello" })))?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::identifiers::{ListenerId, MessageId};
use crate::listener::{ResponseListener, WaitResponseListener};
use crate::protocol::{ClientType, Message, MessageBody, ResponseMessage};
use crate::session::{Session, SessionInner};

// ============================================================================
// Types
// ============================================================================

/// Outstanding response listeners keyed by request id.
type ResponseMap = FxHashMap<MessageId, Arc<dyn ResponseListener>>;

/// Observer of data messages with one name.
type MessageListener = Arc<dyn Fn(&Client, &Message) + Send + Sync>;

/// Message listeners keyed by data message name.
type MessageListenerMap = FxHashMap<String, Vec<(ListenerId, MessageListener)>>;

// ============================================================================
// ClientStatus
// ============================================================================

/// Attachment state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientStatus {
    /// Not attached to any session.
    Detached,
    /// Attached and bound to a server-assigned id.
    Attached,
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detached => f.write_str("DETACHED"),
            Self::Attached => f.write_str("ATTACHED"),
        }
    }
}

// ============================================================================
// MessageHandler
// ============================================================================

/// Protocol-specific behaviour of a client.
///
/// Called on the session's delivery task, in arrival order.
pub trait MessageHandler: Send + Sync + 'static {
    /// Handles a message that was not claimed by a response listener.
    fn handle_message(&self, client: &Client, message: Message);

    /// Called once the client is attached.
    fn attached(&self, client: &Client) {
        let _ = client;
    }

    /// Called once the client is detached.
    fn detached(&self, client: &Client) {
        let _ = client;
    }
}

impl<F> MessageHandler for F
where
    F: Fn(&Client, Message) + Send + Sync + 'static,
{
    fn handle_message(&self, client: &Client, message: Message) {
        self(client, message);
    }
}

/// Handler of the session-internal client.
struct InternalHandler;

impl MessageHandler for InternalHandler {
    fn handle_message(&self, _client: &Client, message: Message) {
        warn!(%message, "Unhandled message on session channel");
    }
}

// ============================================================================
// ClientInner
// ============================================================================

/// Internal shared state for a client.
struct ClientInner {
    /// Instance identity, distinguishes clients of the same type in logs.
    instance: Uuid,
    /// Protocol family.
    client_type: ClientType,
    /// Attachment state.
    status: RwLock<ClientStatus>,
    /// Owning session, set on attach.
    session: RwLock<Weak<SessionInner>>,
    /// Listeners waiting for responses to messages this client sent.
    responses: Mutex<ResponseMap>,
    /// Observers of data messages by name.
    message_listeners: RwLock<MessageListenerMap>,
    /// Protocol behaviour.
    handler: Box<dyn MessageHandler>,
}

// ============================================================================
// Client
// ============================================================================

/// A logical protocol endpoint attached to a session.
///
/// Cloning yields another handle to the same client. Two handles are the
/// same client only if [`Client::ptr_eq`] holds; a fresh client of the same
/// type is a different client.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("client_type", &self.inner.client_type)
            .field("instance", &self.inner.instance)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client{{type: {}, status: {}}}", self.inner.client_type, self.status())
    }
}

// ============================================================================
// Client - Constructors
// ============================================================================

impl Client {
    /// Creates a detached client.
    pub fn new(client_type: impl Into<ClientType>, handler: impl MessageHandler) -> Self {
        Self::build(
            client_type.into(),
            Box::new(handler),
            ClientStatus::Detached,
            Weak::new(),
        )
    }

    /// Creates a detached client from a message callback.
    pub fn with_fn<F>(client_type: impl Into<ClientType>, on_message: F) -> Self
    where
        F: Fn(&Client, Message) + Send + Sync + 'static,
    {
        Self::new(client_type, on_message)
    }

    /// Creates the session-internal client, attached from the start.
    pub(crate) fn internal(session: Weak<SessionInner>) -> Self {
        Self::build(
            ClientType::internal(),
            Box::new(InternalHandler),
            ClientStatus::Attached,
            session,
        )
    }

    fn build(
        client_type: ClientType,
        handler: Box<dyn MessageHandler>,
        status: ClientStatus,
        session: Weak<SessionInner>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                instance: Uuid::new_v4(),
                client_type,
                status: RwLock::new(status),
                session: RwLock::new(session),
                responses: Mutex::new(ResponseMap::default()),
                message_listeners: RwLock::new(MessageListenerMap::default()),
                handler,
            }),
        }
    }
}

// ============================================================================
// Client - Accessors
// ============================================================================

impl Client {
    /// Returns the client type.
    #[inline]
    #[must_use]
    pub fn client_type(&self) -> &ClientType {
        &self.inner.client_type
    }

    /// Returns the current attachment state.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ClientStatus {
        *self.inner.status.read()
    }

    /// Returns `true` while attached.
    #[inline]
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.status() == ClientStatus::Attached
    }

    /// Returns the session this client was last attached to, if alive.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        Session::upgrade(&self.inner.session.read())
    }

    /// Returns `true` if both handles refer to the same client instance.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Client) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the number of responses this client is waiting for.
    #[inline]
    #[must_use]
    pub fn pending_responses(&self) -> usize {
        self.inner.responses.lock().len()
    }
}

// ============================================================================
// Client - Outbound
// ============================================================================

impl Client {
    /// Sends a message through the owning session.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] if the client is not attached
    /// - [`Error::MessageSend`] if the transport rejects the frame
    pub fn send(&self, message: Message) -> Result<()> {
        self.owning_session()?.send(self, message)
    }

    /// Sends a message and registers `listener` for its response.
    ///
    /// The listener is registered before the frame leaves, so a fast reply
    /// cannot overtake it. It is removed again if the send fails.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] if a response to the same message id is
    ///   still outstanding
    /// - Any error of [`Client::send`]
    pub fn send_with_listener(
        &self,
        message: Message,
        listener: Arc<dyn ResponseListener>,
    ) -> Result<()> {
        let id = message.id;
        match self.inner.responses.lock().entry(id) {
            Entry::Occupied(_) => {
                return Err(Error::illegal_state(format!(
                    "Response to message {id} is already pending"
                )));
            }
            Entry::Vacant(entry) => {
                entry.insert(listener);
            }
        }

        let result = self.send(message);
        if result.is_err() {
            self.forget_response(id);
        }
        result
    }

    /// Sends a message and waits for its response.
    ///
    /// Bounded by the session's response timeout, if one is configured.
    ///
    /// # Errors
    ///
    /// - Any error of [`Client::send`]
    /// - [`Error::Timeout`] if the response timeout elapses
    pub async fn send_and_wait(&self, message: Message) -> Result<ResponseMessage> {
        let session = self.owning_session()?;
        let id = message.id;
        let listener = Arc::new(WaitResponseListener::new());

        self.send_with_listener(message, Arc::clone(&listener) as Arc<dyn ResponseListener>)?;

        let result = listener
            .wait_for_response(session.options().response_timeout)
            .await;
        if result.is_err() {
            self.forget_response(id);
        }
        result
    }

    /// Registers an observer for data messages named `name`.
    ///
    /// Observers run before the message handler, which still receives the
    /// message.
    pub fn add_message_listener<F>(&self, name: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&Client, &Message) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.inner
            .message_listeners
            .write()
            .entry(name.into())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes a message observer. Returns `false` if it was not registered.
    pub fn remove_message_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.message_listeners.write();
        let mut removed = false;

        listeners.retain(|_, registered| {
            let before = registered.len();
            registered.retain(|(listener_id, _)| *listener_id != id);
            removed |= registered.len() != before;
            !registered.is_empty()
        });
        removed
    }

    /// Detaches this client from its session.
    ///
    /// # Errors
    ///
    /// See [`Session::detach`].
    pub fn detach(&self) -> Result<()> {
        self.owning_session()?.detach(self)
    }

    fn owning_session(&self) -> Result<Session> {
        self.session().ok_or_else(|| {
            Error::illegal_state(format!(
                "Client {} is not attached to a session",
                self.inner.client_type
            ))
        })
    }

    /// Drops a registered response listener without invoking it.
    pub(crate) fn forget_response(&self, id: MessageId) {
        if self.inner.responses.lock().remove(&id).is_some() {
            debug!(client_type = %self.inner.client_type, %id, "Response listener removed");
        }
    }
}

// ============================================================================
// Client - Inbound
// ============================================================================

impl Client {
    /// Delivers an inbound message to this client.
    ///
    /// A response with a registered listener goes to that listener, which is
    /// removed first so it fires at most once. Everything else goes to the
    /// message handler.
    pub fn message_received(&self, message: Message) {
        let message = match message.into_response() {
            Ok(response) => {
                let listener = self.inner.responses.lock().remove(&response.id);
                match listener {
                    Some(listener) => {
                        trace!(
                            client_type = %self.inner.client_type,
                            id = %response.id,
                            "Response correlated"
                        );
                        listener.response_received(response);
                        return;
                    }
                    None => response.into_message(),
                }
            }
            Err(message) => message,
        };

        trace!(client_type = %self.inner.client_type, %message, "Message received");
        self.notify_message_listeners(&message);
        self.inner.handler.handle_message(self, message);
    }

    fn notify_message_listeners(&self, message: &Message) {
        let MessageBody::Data { name, .. } = &message.body else {
            return;
        };

        let listeners: Vec<MessageListener> = match self.inner.message_listeners.read().get(name) {
            Some(registered) => registered
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect(),
            None => return,
        };

        for listener in listeners {
            listener(self, message);
        }
    }

    /// Releases every outstanding listener with a synthetic error reply.
    pub(crate) fn fail_pending_responses(&self, reason: &str) {
        let pending: Vec<_> = self.inner.responses.lock().drain().collect();
        let count = pending.len();

        for (id, listener) in pending {
            listener.response_received(ResponseMessage::error(id, reason, None));
        }

        if count > 0 {
            debug!(client_type = %self.inner.client_type, count, "Failed pending responses");
        }
    }
}

// ============================================================================
// Client - State Transitions
// ============================================================================

impl Client {
    /// Marks the client attached to `session`.
    pub(crate) fn set_attached(&self, session: Weak<SessionInner>) {
        *self.inner.session.write() = session;
        let changed = {
            let mut status = self.inner.status.write();
            let changed = *status != ClientStatus::Attached;
            *status = ClientStatus::Attached;
            changed
        };

        if changed {
            debug!(client_type = %self.inner.client_type, "Client attached");
            self.inner.handler.attached(self);
        }
    }

    /// Marks the client detached. Repeated calls notify the handler once.
    pub(crate) fn set_detached(&self) {
        let changed = {
            let mut status = self.inner.status.write();
            let changed = *status != ClientStatus::Detached;
            *status = ClientStatus::Detached;
            changed
        };

        if changed {
            debug!(client_type = %self.inner.client_type, "Client detached");
            self.inner.handler.detached(self);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
