//! Login attempt state and the per-login dispatch task.
//!
//! # Login Sequence
//!
//! ```text
//! login() ─► Connecting ─► Transport::login ─► LoggedIn event
//!                                                  │
//!                                                  ▼
//!                         ProtocolSelection via the internal client
//!                                                  │
//!                                  Ok ─► Connected │ Error ─► Disconnected
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Weak;

use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::Result;
use crate::transport::TransportEventStream;

use super::core::{Session, SessionInner};
use super::options::LoginParameters;

// ============================================================================
// LoginPhase
// ============================================================================

/// How far a login attempt has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoginPhase {
    /// Waiting for the transport to accept the credentials.
    Transport,
    /// Waiting for the server to accept the protocol.
    ProtocolSelection,
}

// ============================================================================
// LoginAttempt
// ============================================================================

/// The single outstanding login of a session.
pub(crate) struct LoginAttempt {
    params: LoginParameters,
    phase: LoginPhase,
    completion: oneshot::Sender<Result<()>>,
}

impl LoginAttempt {
    /// Starts an attempt; the receiver resolves when it completes.
    pub(crate) fn new(params: LoginParameters) -> (Self, oneshot::Receiver<Result<()>>) {
        let (completion, rx) = oneshot::channel();
        let attempt = Self {
            params,
            phase: LoginPhase::Transport,
            completion,
        };
        (attempt, rx)
    }

    #[inline]
    pub(crate) fn params(&self) -> &LoginParameters {
        &self.params
    }

    #[inline]
    pub(crate) fn phase(&self) -> LoginPhase {
        self.phase
    }

    #[inline]
    pub(crate) fn set_phase(&mut self, phase: LoginPhase) {
        self.phase = phase;
    }

    /// Releases the waiting caller.
    pub(crate) fn complete(self, result: Result<()>) {
        let _ = self.completion.send(result);
    }
}

// ============================================================================
// Dispatch Loop
// ============================================================================

/// Processes transport events of one login, in order.
///
/// Holds only a weak reference so an abandoned session is dropped. Events
/// from a superseded login are discarded.
pub(crate) async fn run_dispatch_loop(
    session: Weak<SessionInner>,
    generation: u64,
    mut events: TransportEventStream,
) {
    while let Some(event) = events.recv().await {
        let Some(session) = Session::upgrade(&session) else {
            debug!("Session dropped, dispatch loop exiting");
            return;
        };

        if !session.is_current_login(generation) {
            trace!(generation, "Discarding event of a superseded login");
            return;
        }

        session.handle_event(event);
    }

    if let Some(session) = Session::upgrade(&session)
        && session.is_current_login(generation)
    {
        session.handle_disconnected(false, "Transport event stream closed");
    }

    debug!(generation, "Dispatch loop terminated");
}

// ============================================================================
// Tests
// ============================================================================
