//! Named-channel routing.
//!
//! When the server joins the session to a channel, the session asks its
//! [`ChannelJoinedListener`]s in registration order which
//! [`ClientChannelListener`] should receive that channel's traffic. The
//! first listener to claim the channel is bound to it until the channel is
//! left.
//!
//! Two routers are always registered first:
//!
//! | Channel | Bound to |
//! |---------|----------|
//! | `<namespace>.Client.<Type>` | the record of the attached client of that type |
//! | `<namespace>.ALL_CLIENTS` | a broadcaster to every attached client |

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};

use tracing::{trace, warn};

use crate::protocol::Message;

use super::core::{Session, SessionInner};

// ============================================================================
// Traits
// ============================================================================

/// Receives traffic of one joined channel.
pub trait ClientChannelListener: Send + Sync {
    /// Called for each message on the channel.
    fn received_message(&self, channel: &str, data: &[u8]);

    /// Called when the session leaves the channel.
    fn left_channel(&self, channel: &str) {
        let _ = channel;
    }
}

/// Decides who receives a newly joined channel.
pub trait ChannelJoinedListener: Send + Sync {
    /// Returns the listener for `channel`, or `None` to pass.
    fn joined_channel(
        &self,
        session: &Session,
        channel: &str,
    ) -> Option<Arc<dyn ClientChannelListener>>;
}

impl<F> ChannelJoinedListener for F
where
    F: Fn(&Session, &str) -> Option<Arc<dyn ClientChannelListener>> + Send + Sync,
{
    fn joined_channel(
        &self,
        session: &Session,
        channel: &str,
    ) -> Option<Arc<dyn ClientChannelListener>> {
        self(session, channel)
    }
}

// ============================================================================
// ClientChannelRouter
// ============================================================================

/// Binds `<namespace>.Client.<Type>` to the record of that client type.
pub(crate) struct ClientChannelRouter;

impl ChannelJoinedListener for ClientChannelRouter {
    fn joined_channel(
        &self,
        session: &Session,
        channel: &str,
    ) -> Option<Arc<dyn ClientChannelListener>> {
        let client_type = session.channel_names().parse_client_channel(channel)?;

        match session.record_for_type(&client_type) {
            Some(record) => Some(record as Arc<dyn ClientChannelListener>),
            None => {
                warn!(channel, %client_type, "Client channel joined with no client of that type");
                None
            }
        }
    }
}

// ============================================================================
// AllClientsRouter
// ============================================================================

/// Binds `<namespace>.ALL_CLIENTS` to a broadcaster.
pub(crate) struct AllClientsRouter;

impl ChannelJoinedListener for AllClientsRouter {
    fn joined_channel(
        &self,
        session: &Session,
        channel: &str,
    ) -> Option<Arc<dyn ClientChannelListener>> {
        if !session.channel_names().is_all_clients_channel(channel) {
            return None;
        }

        Some(Arc::new(AllClientsListener {
            session: Arc::downgrade(&session.inner),
        }))
    }
}

/// Delivers broadcast messages to every attached client.
struct AllClientsListener {
    session: Weak<SessionInner>,
}

impl ClientChannelListener for AllClientsListener {
    fn received_message(&self, channel: &str, data: &[u8]) {
        let Some(session) = Session::upgrade(&self.session) else {
            return;
        };

        let message = match Message::from_bytes(data) {
            Ok(message) => message,
            Err(e) => {
                warn!(channel, error = %e, "Dropping undecodable broadcast");
                return;
            }
        };

        let records = session.attached_records();
        trace!(channel, %message, recipients = records.len(), "Broadcast");

        for record in records {
            record.client().message_received(message.clone());
        }
    }
}
