//! Per-client bookkeeping inside a session.
//!
//! A [`ClientRecord`] ties one client instance to the id the server
//! assigned it. Records live in a [`ClientRegistry`] indexed by client type
//! and, once bound, by client id. Both indexes are guarded by one lock so a
//! duplicate check and its placeholder insert are a single step.

// ============================================================================
// Imports
// ============================================================================

use std::collections::hash_map::Entry;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::identifiers::ClientId;
use crate::listener::ResponseListener;
use crate::protocol::{ClientType, Message, ResponseKind, ResponseMessage};

use super::channel::ClientChannelListener;
use super::core::{Session, SessionInner};

// ============================================================================
// Constants
// ============================================================================

/// Message of the synthetic reply waiters get when their client's channel closes.
const CLIENT_DETACHED: &str = "Client detached";

// ============================================================================
// ClientRecord
// ============================================================================

/// One client's entry in the session.
pub(crate) struct ClientRecord {
    /// The client instance.
    client: Client,
    /// Server-assigned id, `None` while the attach is outstanding.
    client_id: Mutex<Option<ClientId>>,
    /// Owning session.
    session: Weak<SessionInner>,
}

impl ClientRecord {
    /// Creates an unbound record.
    pub(crate) fn new(client: Client, session: Weak<SessionInner>) -> Self {
        Self {
            client,
            client_id: Mutex::new(None),
            session,
        }
    }

    #[inline]
    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    #[inline]
    pub(crate) fn client_id(&self) -> Option<ClientId> {
        *self.client_id.lock()
    }

    /// Decodes a payload and hands it to the client.
    ///
    /// If decoding fails but the id survives, the client receives an error
    /// response with that id so a waiting caller is released.
    pub(crate) fn deliver(&self, payload: &[u8]) {
        match Message::from_bytes(payload) {
            Ok(message) => self.client.message_received(message),
            Err(e) => match Message::recover_id(payload) {
                Some(id) => {
                    warn!(
                        client_type = %self.client.client_type(),
                        %id,
                        error = %e,
                        "Undecodable message, delivering error reply"
                    );
                    let reply = ResponseMessage::error(id, "Message decode failed", Some(e.to_string()));
                    self.client.message_received(reply.into_message());
                }
                None => error!(
                    client_type = %self.client.client_type(),
                    error = %e,
                    len = payload.len(),
                    "Dropping undecodable message"
                ),
            },
        }
    }
}

impl ClientChannelListener for ClientRecord {
    fn received_message(&self, _channel: &str, data: &[u8]) {
        self.deliver(data);
    }

    fn left_channel(&self, channel: &str) {
        debug!(channel, client_type = %self.client.client_type(), "Client channel left");
        self.client.set_detached();

        if let Some(session) = Session::upgrade(&self.session) {
            session.remove_record(&self.client);
        }
        self.client.fail_pending_responses(CLIENT_DETACHED);
    }
}

// ============================================================================
// ClientRegistry
// ============================================================================

/// Records indexed by client type and client id.
#[derive(Default)]
pub(crate) struct ClientRegistry {
    by_type: FxHashMap<ClientType, Arc<ClientRecord>>,
    by_id: FxHashMap<ClientId, Arc<ClientRecord>>,
}

impl ClientRegistry {
    pub(crate) fn by_type(&self, client_type: &ClientType) -> Option<Arc<ClientRecord>> {
        self.by_type.get(client_type).cloned()
    }

    pub(crate) fn by_id(&self, client_id: ClientId) -> Option<Arc<ClientRecord>> {
        self.by_id.get(&client_id).cloned()
    }

    /// Returns the record of this exact client instance.
    pub(crate) fn for_client(&self, client: &Client) -> Option<Arc<ClientRecord>> {
        self.by_type(client.client_type())
            .filter(|record| record.client.ptr_eq(client))
    }

    /// Registers an unbound record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AttachFailed`] if the type already has a record.
    pub(crate) fn insert(&mut self, record: Arc<ClientRecord>) -> Result<()> {
        match self.by_type.entry(record.client.client_type().clone()) {
            Entry::Occupied(entry) => Err(Error::attach_failed(format!(
                "Duplicate attach for client type {}",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(())
            }
        }
    }

    /// Binds `record` to `client_id`.
    ///
    /// Returns `false` if the record is no longer registered.
    pub(crate) fn bind(&mut self, record: &Arc<ClientRecord>, client_id: ClientId) -> bool {
        let registered = self
            .by_type
            .get(record.client.client_type())
            .is_some_and(|current| Arc::ptr_eq(current, record));
        if !registered {
            return false;
        }

        *record.client_id.lock() = Some(client_id);
        if let Some(previous) = self.by_id.insert(client_id, Arc::clone(record))
            && !Arc::ptr_eq(&previous, record)
        {
            warn!(
                %client_id,
                previous = %previous.client.client_type(),
                current = %record.client.client_type(),
                "Client id reassigned"
            );
        }
        true
    }

    /// Removes the record of this exact client instance.
    pub(crate) fn remove(&mut self, client: &Client) -> Option<Arc<ClientRecord>> {
        let record = self.for_client(client)?;
        self.by_type.remove(client.client_type());

        if let Some(client_id) = record.client_id()
            && self
                .by_id
                .get(&client_id)
                .is_some_and(|current| Arc::ptr_eq(current, &record))
        {
            self.by_id.remove(&client_id);
        }
        Some(record)
    }

    /// Removes `record` only if it is still the registered one.
    pub(crate) fn remove_exact(&mut self, record: &Arc<ClientRecord>) -> bool {
        let registered = self
            .by_type
            .get(record.client.client_type())
            .is_some_and(|current| Arc::ptr_eq(current, record));

        registered && self.remove(&record.client).is_some()
    }

    /// Removes every record except the internal client's.
    pub(crate) fn drain_external(&mut self) -> Vec<Arc<ClientRecord>> {
        let external: Vec<_> = self
            .by_type
            .values()
            .filter(|record| !record.client.client_type().is_internal())
            .cloned()
            .collect();

        self.by_type.retain(|client_type, _| client_type.is_internal());
        self.by_id.retain(|client_id, _| client_id.is_internal());
        external
    }

    /// Registered non-internal clients, ordered by type.
    pub(crate) fn clients(&self) -> Vec<Client> {
        let mut records: Vec<_> = self
            .by_type
            .iter()
            .filter(|(client_type, _)| !client_type.is_internal())
            .collect();
        records.sort_by(|(a, _), (b, _)| a.cmp(b));
        records
            .into_iter()
            .map(|(_, record)| record.client.clone())
            .collect()
    }

    /// Bound non-internal records, ordered by id.
    pub(crate) fn attached(&self) -> Vec<Arc<ClientRecord>> {
        let mut records: Vec<_> = self
            .by_id
            .iter()
            .filter(|(client_id, _)| !client_id.is_internal())
            .collect();
        records.sort_by_key(|(client_id, _)| **client_id);
        records
            .into_iter()
            .map(|(_, record)| Arc::clone(record))
            .collect()
    }
}

// ============================================================================
// AttachResponseListener
// ============================================================================

/// Completes an attach when the server replies.
///
/// Binding the id and marking the client attached happen on the delivery
/// task before the waiting caller is released, so messages that follow the
/// reply already find the client bound.
pub(crate) struct AttachResponseListener {
    record: Arc<ClientRecord>,
    completion: Mutex<Option<oneshot::Sender<Result<()>>>>,
}

impl AttachResponseListener {
    pub(crate) fn new(record: Arc<ClientRecord>) -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        let listener = Self {
            record,
            completion: Mutex::new(Some(tx)),
        };
        (listener, rx)
    }

    fn complete(&self, response: ResponseMessage) -> Result<()> {
        match response.kind {
            ResponseKind::AttachedClient { client_id } => {
                let session = Session::upgrade(&self.record.session)
                    .ok_or_else(|| Error::attach_failed("Session dropped"))?;

                if !session.bind_record(&self.record, client_id) {
                    warn!(%client_id, "Attach reply for an abandoned attach, releasing id");
                    let release = Message::detach_client(client_id);
                    if let Err(e) = session.internal_client().send(release) {
                        warn!(%client_id, error = %e, "Failed to release client id");
                    }
                    return Err(Error::attach_failed("Attach abandoned before the reply"));
                }

                self.record.client.set_attached(self.record.session.clone());
                info!(
                    client_type = %self.record.client.client_type(),
                    %client_id,
                    "Client attached"
                );
                Ok(())
            }

            ResponseKind::Error { message, cause } => Err(Error::attach_failed_with(message, cause)),

            other => Err(Error::attach_failed(format!(
                "Unexpected response type: {}",
                other.name()
            ))),
        }
    }
}

impl ResponseListener for AttachResponseListener {
    fn response_received(&self, response: ResponseMessage) {
        let result = self.complete(response);
        if let Some(tx) = self.completion.lock().take() {
            let _ = tx.send(result);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
