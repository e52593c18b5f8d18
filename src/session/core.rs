//! Session core implementation.
//!
//! A [`Session`] owns one login to a server and multiplexes protocol
//! clients over it. Inbound traffic is processed on one dispatch task per
//! login, so every client sees its messages in arrival order.
//!
//! # Locks
//!
//! | Lock | Guards |
//! |------|--------|
//! | `status` | session status only |
//! | `login` | the outstanding login attempt |
//! | `registry` | client records by type and by id |
//! | `channels` | joined channel bindings |
//!
//! No lock is held while calling into clients, listeners or the transport.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::identifiers::{ClientId, ListenerId, MessageId};
use crate::listener::{OkErrorResponseListener, wait_reply};
use crate::protocol::{ChannelNames, ClientType, Message, frame};
use crate::transport::{Transport, TransportEvent};

use super::builder::SessionBuilder;
use super::channel::{
    AllClientsRouter, ChannelJoinedListener, ClientChannelListener, ClientChannelRouter,
};
use super::login::{LoginAttempt, LoginPhase, run_dispatch_loop};
use super::options::{LoginParameters, ServerInfo, SessionOptions};
use super::record::{AttachResponseListener, ClientRecord, ClientRegistry};

// ============================================================================
// Constants
// ============================================================================

/// Message of the synthetic reply released listeners receive.
const CONNECTION_CLOSED: &str = "Connection closed";

// ============================================================================
// Types
// ============================================================================

/// Session status callback.
type StatusListener = Arc<dyn Fn(&Session, SessionStatus) + Send + Sync>;

/// Registered channel-joined listeners, consulted in order.
type JoinedListeners = Vec<(ListenerId, Arc<dyn ChannelJoinedListener>)>;

// ============================================================================
// SessionStatus
// ============================================================================

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Not logged in.
    Disconnected,
    /// Login in progress.
    Connecting,
    /// Logged in with the protocol accepted.
    Connected,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("DISCONNECTED"),
            Self::Connecting => f.write_str("CONNECTING"),
            Self::Connected => f.write_str("CONNECTED"),
        }
    }
}

// ============================================================================
// SessionInner
// ============================================================================

/// Internal shared state for a session.
pub(crate) struct SessionInner {
    /// Instance identity for logs.
    id: Uuid,
    /// Configuration.
    options: SessionOptions,
    /// Channel naming under the configured namespace.
    names: ChannelNames,
    /// Underlying transport.
    transport: Arc<dyn Transport>,
    /// Current status.
    status: Mutex<SessionStatus>,
    /// Status callbacks of this session.
    status_listeners: RwLock<Vec<(ListenerId, StatusListener)>>,
    /// Outstanding login, if any.
    login: Mutex<Option<LoginAttempt>>,
    /// Incremented per login and on disconnect; stale dispatch loops stop.
    generation: AtomicU64,
    /// Client records.
    registry: Mutex<ClientRegistry>,
    /// Channel-joined listeners, built-in routers first.
    channel_joined: RwLock<JoinedListeners>,
    /// Listener bound to each joined channel.
    channels: Mutex<FxHashMap<String, Arc<dyn ClientChannelListener>>>,
    /// The session-internal client, always attached as id 0.
    internal: Client,
}

// ============================================================================
// Session
// ============================================================================

/// A login to a Wonderland server carrying multiplexed protocol clients.
///
/// Cloning yields another handle to the same session.
///
/// # Example
///
/// ```ignore
/// let session = Session::builder()
///     .server_address("localhost", 1139)
///     .build()?;
///
/// session.login(LoginParameters::new("alice", "secret")).await?;
/// session.attach(&chat).await?;
/// ```
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("server", &self.inner.options.server)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.options.server {
            Some(server) => write!(f, "Session{{{server}, {}}}", self.status()),
            None => write!(f, "Session{{{}, {}}}", self.inner.id, self.status()),
        }
    }
}

// ============================================================================
// Session - Constructors
// ============================================================================

impl Session {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Creates a disconnected session over `transport`.
    pub(crate) fn new(options: SessionOptions, transport: Arc<dyn Transport>) -> Self {
        let names = ChannelNames::new(&options.namespace);

        let inner = Arc::new_cyclic(|weak: &Weak<SessionInner>| SessionInner {
            id: Uuid::new_v4(),
            options,
            names,
            transport,
            status: Mutex::new(SessionStatus::Disconnected),
            status_listeners: RwLock::new(Vec::new()),
            login: Mutex::new(None),
            generation: AtomicU64::new(0),
            registry: Mutex::new(ClientRegistry::default()),
            channel_joined: RwLock::new(Vec::new()),
            channels: Mutex::new(FxHashMap::default()),
            internal: Client::internal(weak.clone()),
        });
        let session = Self { inner };

        let internal = Arc::new(ClientRecord::new(
            session.inner.internal.clone(),
            Arc::downgrade(&session.inner),
        ));
        {
            let mut registry = session.inner.registry.lock();
            // Fresh registry, the internal type cannot be taken yet.
            let _ = registry.insert(Arc::clone(&internal));
            registry.bind(&internal, ClientId::INTERNAL);
        }

        session.add_channel_joined_listener(ClientChannelRouter);
        session.add_channel_joined_listener(AllClientsRouter);

        debug!(session = %session.inner.id, "Session created");
        session
    }

    /// Upgrades a weak handle.
    pub(crate) fn upgrade(weak: &Weak<SessionInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Returns the session's instance id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns the current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.inner.status.lock()
    }

    /// Returns `true` while connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status() == SessionStatus::Connected
    }

    /// Returns the configured server, if any.
    #[inline]
    #[must_use]
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.inner.options.server.as_ref()
    }

    /// Returns the session options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    /// Returns the channel names under this session's namespace.
    #[inline]
    #[must_use]
    pub fn channel_names(&self) -> &ChannelNames {
        &self.inner.names
    }

    /// Returns the client attached for `client_type`, if any.
    #[must_use]
    pub fn client(&self, client_type: &ClientType) -> Option<Client> {
        if client_type.is_internal() {
            return None;
        }
        self.record_for_type(client_type)
            .map(|record| record.client().clone())
    }

    /// Returns every client registered with this session.
    #[must_use]
    pub fn clients(&self) -> Vec<Client> {
        self.inner.registry.lock().clients()
    }

    pub(crate) fn internal_client(&self) -> &Client {
        &self.inner.internal
    }
}

// ============================================================================
// Session - Status
// ============================================================================

impl Session {
    /// Registers a status callback.
    pub fn add_status_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Session, SessionStatus) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.inner
            .status_listeners
            .write()
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes a status callback. Returns `false` if it was not registered.
    pub fn remove_status_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.status_listeners.write();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    /// Sets the status and notifies listeners if it changed.
    ///
    /// Returns `true` if the status changed.
    pub(crate) fn set_status(&self, status: SessionStatus) -> bool {
        let previous = {
            let mut current = self.inner.status.lock();
            if *current == status {
                return false;
            }
            std::mem::replace(&mut *current, status)
        };

        debug!(session = %self.inner.id, from = %previous, to = %status, "Status changed");

        let listeners: Vec<StatusListener> = self
            .inner
            .status_listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(self, status);
        }
        true
    }
}

// ============================================================================
// Session - Login
// ============================================================================

impl Session {
    /// Logs in and selects the session protocol.
    ///
    /// Resolves once the session is [`SessionStatus::Connected`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::LoginFailed`] if a login is already in progress or
    /// the session is not disconnected, or if the transport, the server or
    /// the configured login timeout ends the attempt. The session is then
    /// [`SessionStatus::Disconnected`].
    pub async fn login(&self, params: LoginParameters) -> Result<()> {
        let (generation, completion) = self.begin_login(params.clone())?;
        info!(session = %self.inner.id, user = %params.username, "Logging in");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_dispatch_loop(
            Arc::downgrade(&self.inner),
            generation,
            events_rx,
        ));

        if let Err(e) = self.inner.transport.login(&params, events_tx).await {
            self.finish_login(Err(Error::login_failed_with("Transport login failed", e)));
        }

        let result = match wait_reply(completion, self.inner.options.login_timeout, "login").await
        {
            Ok(result) => result,
            Err(e) => {
                self.finish_login(Err(Error::login_failed("Login abandoned")));
                Err(Error::login_failed_with("Login did not complete", e))
            }
        };

        if let Err(e) = &result {
            warn!(session = %self.inner.id, error = %e, "Login failed");
        } else {
            info!(session = %self.inner.id, "Logged in");
            return result;
        }

        if let Err(e) = self.inner.transport.logout().await {
            debug!(error = %e, "Logout after failed login");
        }
        result
    }

    /// Registers a login attempt if none is outstanding.
    fn begin_login(
        &self,
        params: LoginParameters,
    ) -> Result<(u64, oneshot::Receiver<Result<()>>)> {
        let (generation, completion) = {
            let mut login = self.inner.login.lock();
            if login.is_some() || self.status() != SessionStatus::Disconnected {
                return Err(Error::login_failed("Login already in progress"));
            }

            let (attempt, completion) = LoginAttempt::new(params);
            *login = Some(attempt);
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (generation, completion)
        };

        self.set_status(SessionStatus::Connecting);
        Ok((generation, completion))
    }

    /// Ends the outstanding login attempt, if any.
    ///
    /// Returns `false` if there was no attempt to end.
    pub(crate) fn finish_login(&self, result: Result<()>) -> bool {
        let Some(attempt) = self.inner.login.lock().take() else {
            return false;
        };

        match &result {
            Ok(()) => debug!(session = %self.inner.id, "Login attempt succeeded"),
            Err(e) => debug!(
                session = %self.inner.id,
                phase = ?attempt.phase(),
                error = %e,
                "Login attempt failed"
            ),
        }

        let status = if result.is_ok() {
            SessionStatus::Connected
        } else {
            SessionStatus::Disconnected
        };
        self.set_status(status);
        attempt.complete(result);
        true
    }

    /// Returns `true` if `generation` belongs to the current login.
    pub(crate) fn is_current_login(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    /// Transport login succeeded: select the protocol.
    fn on_logged_in(&self) {
        {
            let mut login = self.inner.login.lock();
            let Some(attempt) = login.as_mut() else {
                warn!(session = %self.inner.id, "Logged in without a login in progress");
                return;
            };
            attempt.set_phase(LoginPhase::ProtocolSelection);
            debug!(user = %attempt.params().username, "Transport logged in, selecting protocol");
        }

        let options = &self.inner.options;
        let message = Message::protocol_selection(options.protocol_name.clone(), options.protocol_version);

        let on_success = Arc::downgrade(&self.inner);
        let on_failure = Arc::downgrade(&self.inner);
        let listener = OkErrorResponseListener::new(
            move |_id: MessageId| {
                if let Some(session) = Session::upgrade(&on_success) {
                    session.finish_login(Ok(()));
                }
            },
            move |_id: MessageId, message: &str, cause: Option<&str>| {
                if let Some(session) = Session::upgrade(&on_failure) {
                    let reason = format!("Protocol selection rejected: {message}");
                    let error = match cause {
                        Some(cause) => Error::login_failed_with(reason, Error::protocol(cause)),
                        None => Error::login_failed(reason),
                    };
                    session.finish_login(Err(error));
                }
            },
        );

        if let Err(e) = self
            .inner
            .internal
            .send_with_listener(message, Arc::new(listener))
        {
            self.finish_login(Err(Error::login_failed_with(
                "Unable to send protocol selection",
                e,
            )));
        }
    }
}

// ============================================================================
// Session - Clients
// ============================================================================

impl Session {
    /// Attaches `client` and binds it to a server-assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AttachFailed`] if the session is not connected, a
    /// client of the same type is registered, or the server refuses. A
    /// failed attach leaves no trace, so it may be retried.
    pub async fn attach(&self, client: &Client) -> Result<()> {
        self.attach_with_properties(client, BTreeMap::new()).await
    }

    /// Attaches `client`, forwarding `properties` to the server.
    ///
    /// # Errors
    ///
    /// See [`Session::attach`].
    pub async fn attach_with_properties(
        &self,
        client: &Client,
        properties: BTreeMap<String, String>,
    ) -> Result<()> {
        let client_type = client.client_type();
        debug!(session = %self.inner.id, %client_type, "Attaching client");

        if self.status() != SessionStatus::Connected {
            return Err(Error::attach_failed("Session not connected"));
        }
        if client_type.is_internal() {
            return Err(Error::attach_failed(format!(
                "Client type {client_type} is reserved"
            )));
        }

        let record = Arc::new(ClientRecord::new(client.clone(), Arc::downgrade(&self.inner)));
        self.inner.registry.lock().insert(Arc::clone(&record))?;

        let result = self.request_attach(&record, properties).await;
        if let Err(e) = &result {
            warn!(%client_type, error = %e, "Attach failed");
            self.abandon_attach(&record);
        }
        result
    }

    /// Sends the attach request and waits for the listener to finish.
    async fn request_attach(
        &self,
        record: &Arc<ClientRecord>,
        properties: BTreeMap<String, String>,
    ) -> Result<()> {
        let message = Message::attach_client(record.client().client_type().clone(), properties);
        let request_id = message.id;
        let (listener, completion) = AttachResponseListener::new(Arc::clone(record));

        self.inner
            .internal
            .send_with_listener(message, Arc::new(listener))
            .map_err(|e| Error::attach_failed(format!("Unable to send attach request: {e}")))?;

        match wait_reply(completion, self.inner.options.attach_timeout, "attach").await {
            Ok(result) => result,
            Err(e) => {
                self.inner.internal.forget_response(request_id);
                Err(Error::attach_failed(e.to_string()))
            }
        }
    }

    /// Rolls back a failed attach.
    fn abandon_attach(&self, record: &Arc<ClientRecord>) {
        if !self.inner.registry.lock().remove_exact(record) {
            return;
        }

        // The reply raced the failure: give the id back.
        if let Some(client_id) = record.client_id() {
            if let Err(e) = self.inner.internal.send(Message::detach_client(client_id)) {
                warn!(%client_id, error = %e, "Failed to release client id");
            }
            record.client().set_detached();
        }
    }

    /// Detaches `client`.
    ///
    /// The record stays until the server closes the client's channel, so a
    /// new client of the same type can attach only after that.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] if `client` is not attached to this session
    /// - [`Error::MessageSend`] if the detach notice cannot be sent
    pub fn detach(&self, client: &Client) -> Result<()> {
        let client_type = client.client_type();
        if client_type.is_internal() {
            return Err(Error::illegal_state(
                "The session-internal client cannot be detached",
            ));
        }

        let client_id = self
            .inner
            .registry
            .lock()
            .for_client(client)
            .and_then(|record| record.client_id())
            .filter(|_| client.is_attached())
            .ok_or_else(|| {
                Error::illegal_state(format!("Client {client_type} is not attached to this session"))
            })?;

        debug!(%client_type, %client_id, "Detaching client");
        self.inner.internal.send(Message::detach_client(client_id))?;
        client.set_detached();
        Ok(())
    }

    /// Sends `message` on behalf of `client`.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] if the session is not connected (except
    ///   for the internal client), or `client` is not attached to it
    /// - [`Error::MessageSend`] if encoding or the transport fails
    pub fn send(&self, client: &Client, message: Message) -> Result<()> {
        let internal = client.ptr_eq(&self.inner.internal);
        if !internal && self.status() != SessionStatus::Connected {
            return Err(Error::illegal_state("Session not connected"));
        }

        if !client.is_attached() {
            return Err(Error::illegal_state(format!(
                "Client {} not attached",
                client.client_type()
            )));
        }

        let client_id = self
            .inner
            .registry
            .lock()
            .for_client(client)
            .and_then(|record| record.client_id())
            .ok_or_else(|| {
                Error::illegal_state(format!(
                    "Client {} is not attached to this session",
                    client.client_type()
                ))
            })?;

        trace!(%client_id, %message, "Sending");
        let frame = frame::encode(client_id, &message).map_err(Error::message_send)?;
        self.inner.transport.send(frame).map_err(Error::message_send)
    }

    /// Logs out and detaches every client.
    ///
    /// # Errors
    ///
    /// Returns the transport's logout error; the session is disconnected
    /// regardless.
    pub async fn disconnect(&self) -> Result<()> {
        info!(session = %self.inner.id, "Disconnecting");
        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        let result = self.inner.transport.logout().await;
        self.handle_disconnected(true, "Logged out");
        result
    }

    pub(crate) fn record_for_type(&self, client_type: &ClientType) -> Option<Arc<ClientRecord>> {
        self.inner.registry.lock().by_type(client_type)
    }

    pub(crate) fn attached_records(&self) -> Vec<Arc<ClientRecord>> {
        self.inner.registry.lock().attached()
    }

    pub(crate) fn bind_record(&self, record: &Arc<ClientRecord>, client_id: ClientId) -> bool {
        self.inner.registry.lock().bind(record, client_id)
    }

    pub(crate) fn remove_record(&self, client: &Client) -> Option<Arc<ClientRecord>> {
        let record = self.inner.registry.lock().remove(client);
        if record.is_some() {
            debug!(client_type = %client.client_type(), "Client record removed");
        }
        record
    }
}

// ============================================================================
// Session - Channels
// ============================================================================

impl Session {
    /// Registers a channel-joined listener after the existing ones.
    pub fn add_channel_joined_listener(
        &self,
        listener: impl ChannelJoinedListener + 'static,
    ) -> ListenerId {
        let id = ListenerId::next();
        self.inner
            .channel_joined
            .write()
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes a channel-joined listener. Returns `false` if not registered.
    pub fn remove_channel_joined_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.channel_joined.write();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    fn on_channel_joined(&self, channel: &str) {
        let listeners: Vec<_> = self
            .inner
            .channel_joined
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            if let Some(bound) = listener.joined_channel(self, channel) {
                debug!(channel, "Channel joined");
                self.inner.channels.lock().insert(channel.to_string(), bound);
                return;
            }
        }

        warn!(channel, "No listener for joined channel");
    }

    fn on_channel_message(&self, channel: &str, data: &[u8]) {
        let listener = self.inner.channels.lock().get(channel).cloned();
        match listener {
            Some(listener) => listener.received_message(channel, data),
            None => debug!(channel, "Message on unbound channel dropped"),
        }
    }

    fn on_channel_left(&self, channel: &str) {
        let listener = self.inner.channels.lock().remove(channel);
        match listener {
            Some(listener) => listener.left_channel(channel),
            None => debug!(channel, "Unbound channel left"),
        }
    }
}

// ============================================================================
// Session - Inbound
// ============================================================================

impl Session {
    /// Processes one transport event.
    pub(crate) fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::LoggedIn => self.on_logged_in(),

            TransportEvent::LoginFailed { reason } => {
                warn!(session = %self.inner.id, %reason, "Login refused");
                if !self.finish_login(Err(Error::login_failed(reason))) {
                    warn!(session = %self.inner.id, "Login refusal without a login in progress");
                }
            }

            TransportEvent::Disconnected { graceful, reason } => {
                self.handle_disconnected(graceful, &reason);
            }

            TransportEvent::SessionMessage(frame) => {
                if let Err(e) = self.on_session_message(&frame) {
                    match e {
                        Error::UnknownClient { .. } => {
                            warn!(error = %e, "Dropping session message");
                        }
                        _ => error!(error = %e, "Dropping session message"),
                    }
                }
            }

            TransportEvent::JoinedChannel { channel } => self.on_channel_joined(&channel),

            TransportEvent::ChannelMessage { channel, data } => {
                self.on_channel_message(&channel, &data);
            }

            TransportEvent::LeftChannel { channel } => self.on_channel_left(&channel),
        }
    }

    /// Routes a session-channel frame to the record bound to its id.
    fn on_session_message(&self, frame: &[u8]) -> Result<()> {
        let (client_id, payload) = frame::decode(frame)?;
        let record = self
            .inner
            .registry
            .lock()
            .by_id(client_id)
            .ok_or_else(|| Error::unknown_client(client_id))?;

        trace!(%client_id, len = payload.len(), "Session message");
        record.deliver(payload);
        Ok(())
    }

    /// Connection lost or closed.
    pub(crate) fn handle_disconnected(&self, graceful: bool, reason: &str) {
        let failed_login = self.finish_login(Err(Error::login_failed_with(
            format!("Disconnected during login: {reason}"),
            Error::ConnectionClosed,
        )));

        if failed_login || self.set_status(SessionStatus::Disconnected) {
            info!(session = %self.inner.id, graceful, reason, "Session disconnected");
        }

        self.teardown();
    }

    /// Detaches every client and releases every waiter.
    fn teardown(&self) {
        let records = self.inner.registry.lock().drain_external();
        let channels: Vec<_> = self.inner.channels.lock().drain().collect();

        for record in &records {
            record.client().set_detached();
            record.client().fail_pending_responses(CONNECTION_CLOSED);
        }
        self.inner.internal.fail_pending_responses(CONNECTION_CLOSED);

        for (channel, listener) in channels {
            listener.left_channel(&channel);
        }

        if !records.is_empty() {
            debug!(count = records.len(), "Clients detached on disconnect");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::listener::ResponseListener;
    use crate::protocol::{MessageBody, ResponseMessage};
    use crate::transport::TransportEvents;

    /// Transport that accepts everything and reports nothing.
    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn login(&self, _params: &LoginParameters, _events: TransportEvents) -> Result<()> {
            Ok(())
        }

        fn send(&self, _frame: Vec<u8>) -> Result<()> {
            Ok(())
        }

        async fn logout(&self) -> Result<()> {
            Ok(())
        }
    }

    fn session() -> Session {
        Session::new(SessionOptions::new(), Arc::new(NullTransport))
    }

    /// Transport keeping every frame, or refusing all of them.
    #[derive(Default)]
    struct RecordingTransport {
        refuse: bool,
        frames: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn login(&self, _params: &LoginParameters, _events: TransportEvents) -> Result<()> {
            Ok(())
        }

        fn send(&self, frame: Vec<u8>) -> Result<()> {
            if self.refuse {
                return Err(Error::ConnectionClosed);
            }
            self.frames.lock().push(frame);
            Ok(())
        }

        async fn logout(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Delivers an attach reply for a record that is not registered.
    fn late_attach_reply(session: &Session, client: &Client) -> Result<()> {
        let record = Arc::new(ClientRecord::new(client.clone(), Arc::downgrade(&session.inner)));
        let (listener, mut completion) = AttachResponseListener::new(record);

        listener.response_received(ResponseMessage::attached_client(
            MessageId::next(),
            ClientId::new(7),
        ));
        completion.try_recv().expect("completed")
    }

    #[test]
    fn test_new_session_is_disconnected() {
        let session = session();

        assert_eq!(session.status(), SessionStatus::Disconnected);
        assert!(session.clients().is_empty());
        assert!(session.client(&ClientType::internal()).is_none());
        assert!(session.internal_client().is_attached());
    }

    #[test]
    fn test_set_status_notifies_once() {
        let session = session();
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        session.add_status_listener(move |_, status| {
            assert_eq!(status, SessionStatus::Connecting);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(session.set_status(SessionStatus::Connecting));
        assert!(!session.set_status(SessionStatus::Connecting));

        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_status_listeners_are_per_session() {
        let first = session();
        let second = session();
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        first.add_status_listener(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        second.set_status(SessionStatus::Connecting);
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remove_status_listener() {
        let session = session();
        let id = session.add_status_listener(|_, _| {});

        assert!(session.remove_status_listener(id));
        assert!(!session.remove_status_listener(id));
    }

    #[test]
    fn test_send_requires_connected_session() {
        let session = session();
        let chat = Client::with_fn("chat", |_: &Client, _: Message| {});

        let err = session
            .send(&chat, Message::data("chat.say", json!({})))
            .expect_err("disconnected");
        assert!(err.is_illegal_state());
        assert!(err.to_string().contains("Session not connected"));
    }

    #[tokio::test]
    async fn test_attach_requires_connected_session() {
        let session = session();
        let chat = Client::with_fn("chat", |_: &Client, _: Message| {});

        let err = session.attach(&chat).await.expect_err("disconnected");
        assert!(matches!(err, Error::AttachFailed { ref reason, .. } if reason == "Session not connected"));
        assert!(session.clients().is_empty());
    }

    #[test]
    fn test_detach_unknown_client_is_illegal() {
        let session = session();
        let chat = Client::with_fn("chat", |_: &Client, _: Message| {});

        assert!(session.detach(&chat).expect_err("unknown").is_illegal_state());
        assert!(
            session
                .detach(&session.internal_client().clone())
                .expect_err("internal")
                .is_illegal_state()
        );
    }

    #[test]
    fn test_unknown_client_frame_is_dropped() {
        let session = session();
        let frame = frame::encode_bytes(ClientId::new(42), b"{}");

        let err = session.on_session_message(&frame).expect_err("unknown id");
        assert!(matches!(err, Error::UnknownClient { .. }));

        // Through the event path it is only logged.
        session.handle_event(TransportEvent::SessionMessage(frame));
        session.handle_event(TransportEvent::SessionMessage(vec![0x01]));
    }

    #[test]
    fn test_builtin_routers_registered_first() {
        let session = session();
        assert_eq!(session.inner.channel_joined.read().len(), 2);

        // No client of that type: the router passes and nothing is bound.
        session.handle_event(TransportEvent::JoinedChannel {
            channel: "wonderland.Client.chat".into(),
        });
        assert!(session.inner.channels.lock().is_empty());

        session.handle_event(TransportEvent::JoinedChannel {
            channel: "wonderland.ALL_CLIENTS".into(),
        });
        assert!(session.inner.channels.lock().contains_key("wonderland.ALL_CLIENTS"));
    }

    #[test]
    fn test_late_attach_reply_releases_id() {
        let transport = Arc::new(RecordingTransport::default());
        let session = Session::new(SessionOptions::new(), transport.clone());
        let chat = Client::with_fn("chat", |_: &Client, _: Message| {});

        let err = late_attach_reply(&session, &chat).expect_err("abandoned");
        assert!(err.to_string().contains("Attach abandoned before the reply"));
        assert!(!chat.is_attached());

        let frames = transport.frames.lock();
        assert_eq!(frames.len(), 1);
        let (client_id, payload) = frame::decode(&frames[0]).expect("frame");
        assert!(client_id.is_internal());
        assert_eq!(
            Message::from_bytes(payload).expect("message").body,
            MessageBody::DetachClient {
                client_id: ClientId::new(7)
            }
        );
    }

    #[test]
    fn test_failed_id_release_still_fails_attach() {
        let transport = Arc::new(RecordingTransport {
            refuse: true,
            ..RecordingTransport::default()
        });
        let session = Session::new(SessionOptions::new(), transport.clone());
        let chat = Client::with_fn("chat", |_: &Client, _: Message| {});

        let err = late_attach_reply(&session, &chat).expect_err("abandoned");
        assert!(matches!(err, Error::AttachFailed { .. }));
        assert!(!chat.is_attached());
        assert!(transport.frames.lock().is_empty());
    }
}
