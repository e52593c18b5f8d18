//! Shared utilities for integration tests.
//!
//! Provides:
//! - Logging initialization
//! - A scripted in-process transport standing in for the server
//! - Polling helpers for asynchronous assertions

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;
use wonderland_session::protocol::frame;
use wonderland_session::{
    ClientId, Error, LoginParameters, Message, MessageBody, ResponseKind, ResponseMessage, Result,
    Session, Transport, TransportEvent, TransportEvents,
};

// ============================================================================
// Constants
// ============================================================================

/// First client id handed out by the default responder.
pub const FIRST_CLIENT_ID: u16 = 7;

/// Upper bound for [`eventually`].
const EVENTUALLY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Logging
// ============================================================================

/// Initialize tracing once per test binary.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wonderland_session=debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Types
// ============================================================================

/// Decides which events answer an outbound frame.
pub type Responder = Box<dyn Fn(ClientId, &Message) -> Vec<TransportEvent> + Send + Sync>;

/// What the transport does with a login.
#[derive(Debug, Clone)]
pub enum LoginBehavior {
    /// Report `LoggedIn`.
    Accept,
    /// Report `LoginFailed` with the reason.
    Refuse(String),
    /// Fail `Transport::login` itself.
    Unreachable,
    /// Report nothing; the test drives events.
    Silent,
}

// ============================================================================
// Event Helpers
// ============================================================================

/// Session-channel event carrying `message` for `client_id`.
pub fn session_message(client_id: u16, message: &Message) -> TransportEvent {
    let frame = frame::encode(ClientId::new(client_id), message).expect("encode");
    TransportEvent::SessionMessage(frame)
}

/// Reply from the server to the internal client.
pub fn internal_reply(response: ResponseMessage) -> TransportEvent {
    session_message(0, &response.into_message())
}

/// Default server behaviour: accept the protocol, hand out ids from 7.
pub fn default_responder() -> Responder {
    let next_id = AtomicU16::new(FIRST_CLIENT_ID);

    Box::new(move |client_id: ClientId, message: &Message| -> Vec<TransportEvent> {
        if !client_id.is_internal() {
            return Vec::new();
        }

        match &message.body {
            MessageBody::ProtocolSelection { .. } => {
                vec![internal_reply(ResponseMessage::ok(message.id))]
            }
            MessageBody::AttachClient { .. } => {
                let assigned = ClientId::new(next_id.fetch_add(1, Ordering::SeqCst));
                vec![internal_reply(ResponseMessage::attached_client(
                    message.id, assigned,
                ))]
            }
            _ => Vec::new(),
        }
    })
}

// ============================================================================
// ScriptedTransport
// ============================================================================

struct ScriptState {
    login: LoginBehavior,
    responder: Responder,
    events: Mutex<Option<TransportEvents>>,
    sent: Mutex<Vec<Vec<u8>>>,
    logins: AtomicUsize,
    logouts: AtomicUsize,
}

/// In-process transport answering frames through a [`Responder`].
///
/// Cloning yields another handle to the same script, so a test keeps one
/// handle while the session owns the other.
#[derive(Clone)]
pub struct ScriptedTransport {
    state: Arc<ScriptState>,
}

impl ScriptedTransport {
    /// Accepting transport with the default responder.
    pub fn new() -> Self {
        Self::scripted(LoginBehavior::Accept, default_responder())
    }

    /// Transport with explicit login behaviour and responder.
    pub fn scripted(login: LoginBehavior, responder: Responder) -> Self {
        Self {
            state: Arc::new(ScriptState {
                login,
                responder,
                events: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
                logins: AtomicUsize::new(0),
                logouts: AtomicUsize::new(0),
            }),
        }
    }

    /// Transport with explicit login behaviour and the default responder.
    pub fn with_login(login: LoginBehavior) -> Self {
        Self::scripted(login, default_responder())
    }

    /// Accepting transport with a custom responder.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(ClientId, &Message) -> Vec<TransportEvent> + Send + Sync + 'static,
    {
        Self::scripted(LoginBehavior::Accept, Box::new(responder))
    }

    /// Injects an event as if the server sent it.
    pub fn push(&self, event: TransportEvent) {
        let events = self.state.events.lock().clone().expect("no login yet");
        events.send(event).expect("session dispatch loop gone");
    }

    /// Drops the connection abruptly.
    pub fn drop_connection(&self, reason: &str) {
        self.push(TransportEvent::Disconnected {
            graceful: false,
            reason: reason.to_string(),
        });
    }

    /// Raw frames the session sent.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state.sent.lock().clone()
    }

    /// Decoded frames the session sent.
    pub fn sent_messages(&self) -> Vec<(ClientId, Message)> {
        self.sent_frames()
            .iter()
            .map(|raw| {
                let (client_id, payload) = frame::decode(raw).expect("frame");
                (client_id, Message::from_bytes(payload).expect("message"))
            })
            .collect()
    }

    /// Most recent attach request for `client_type`.
    pub fn attach_request(&self, client_type: &str) -> Option<Message> {
        self.sent_messages()
            .into_iter()
            .map(|(_, message)| message)
            .filter(|message| {
                matches!(
                    &message.body,
                    MessageBody::AttachClient { client_type: sent, .. } if sent.name() == client_type
                )
            })
            .last()
    }

    /// Logins seen; an accepted login is counted once its events are wired.
    pub fn logins(&self) -> usize {
        self.state.logins.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.state.logouts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn login(&self, _params: &LoginParameters, events: TransportEvents) -> Result<()> {
        if let LoginBehavior::Unreachable = self.state.login {
            self.state.logins.fetch_add(1, Ordering::SeqCst);
            return Err(Error::connection("server unreachable"));
        }
        *self.state.events.lock() = Some(events.clone());
        self.state.logins.fetch_add(1, Ordering::SeqCst);

        match &self.state.login {
            LoginBehavior::Unreachable | LoginBehavior::Silent => {}
            LoginBehavior::Accept => {
                let _ = events.send(TransportEvent::LoggedIn);
            }
            LoginBehavior::Refuse(reason) => {
                let _ = events.send(TransportEvent::LoginFailed {
                    reason: reason.clone(),
                });
            }
        }
        Ok(())
    }

    fn send(&self, raw: Vec<u8>) -> Result<()> {
        let events = self
            .state
            .events
            .lock()
            .clone()
            .ok_or(Error::ConnectionClosed)?;

        let (client_id, payload) = frame::decode(&raw)?;
        let message = Message::from_bytes(payload)?;
        self.state.sent.lock().push(raw);

        for event in (self.state.responder)(client_id, &message) {
            let _ = events.send(event);
        }
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        self.state.logouts.fetch_add(1, Ordering::SeqCst);

        if let Some(events) = self.state.events.lock().take() {
            let _ = events.send(TransportEvent::Disconnected {
                graceful: true,
                reason: "Logged out".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Session Helpers
// ============================================================================

/// Builds a session over `transport` and logs in.
pub async fn connected_session(transport: &ScriptedTransport) -> Session {
    let session = Session::builder()
        .transport(transport.clone())
        .build()
        .expect("session");

    session
        .login(LoginParameters::new("alice", "secret"))
        .await
        .expect("login");
    session
}

/// Error reply to `request`.
pub fn error_reply(request: &Message, message: &str) -> ResponseMessage {
    ResponseMessage {
        id: request.id,
        kind: ResponseKind::Error {
            message: message.to_string(),
            cause: None,
        },
    }
}

// ============================================================================
// Polling
// ============================================================================

/// Polls `condition` until it holds, panicking after a generous bound.
pub async fn eventually<F>(description: &str, condition: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + EVENTUALLY_TIMEOUT;

    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time: {description}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
