//! Session lifecycle tests over the scripted transport.
//!
//! Covers login, attach/detach, framing, response correlation, ordering,
//! connection loss and channel routing.

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use wonderland_session::protocol::frame;
use wonderland_session::{
    ChannelJoinedListener, Client, ClientChannelListener, ClientId, ClientStatus, ClientType,
    Error, LoginParameters, Message, MessageBody, ResponseKind, ResponseMessage, Session,
    SessionStatus, TransportEvent, WaitResponseListener,
};

use common::{
    FIRST_CLIENT_ID, LoginBehavior, ScriptedTransport, connected_session, default_responder,
    error_reply, eventually, init_logging, internal_reply, session_message,
};

// ============================================================================
// Helpers
// ============================================================================

type MessageLog = Arc<Mutex<Vec<Message>>>;

/// Client recording every message its handler receives.
fn recording_client(client_type: &str) -> (Client, MessageLog) {
    let log: MessageLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let client = Client::with_fn(client_type, move |_client, message| {
        sink.lock().push(message);
    });
    (client, log)
}

/// Names of the data messages in a log.
fn data_names(log: &MessageLog) -> Vec<String> {
    log.lock()
        .iter()
        .filter_map(|message| match &message.body {
            MessageBody::Data { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

fn credentials() -> LoginParameters {
    LoginParameters::new("alice", "secret")
}

fn chat() -> ClientType {
    ClientType::new("chat")
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_connects_and_notifies_status() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = Session::builder()
        .transport(transport.clone())
        .build()
        .expect("session");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    session.add_status_listener(move |_, status| sink.lock().push(status));

    session.login(credentials()).await.expect("login");

    assert_eq!(session.status(), SessionStatus::Connected);
    assert_eq!(
        *seen.lock(),
        vec![SessionStatus::Connecting, SessionStatus::Connected]
    );

    let (client_id, selection) = transport.sent_messages().remove(0);
    assert!(client_id.is_internal());
    assert!(matches!(
        selection.body,
        MessageBody::ProtocolSelection { ref protocol_name, .. } if protocol_name == "wonderland_client"
    ));
}

#[tokio::test]
async fn test_second_login_rejected_while_in_progress() {
    init_logging();
    let transport = ScriptedTransport::with_login(LoginBehavior::Silent);
    let session = Session::builder()
        .transport(transport.clone())
        .build()
        .expect("session");

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.login(credentials()).await })
    };
    eventually("transport login started", || transport.logins() == 1).await;

    let err = session.login(credentials()).await.expect_err("second login");
    assert!(matches!(err, Error::LoginFailed { ref reason, .. } if reason == "Login already in progress"));

    transport.push(TransportEvent::LoggedIn);
    first.await.expect("join").expect("first login");
    assert_eq!(session.status(), SessionStatus::Connected);
}

#[tokio::test]
async fn test_login_refused_by_server() {
    init_logging();
    let transport = ScriptedTransport::with_login(LoginBehavior::Refuse("bad password".into()));
    let session = Session::builder()
        .transport(transport.clone())
        .build()
        .expect("session");

    let err = session.login(credentials()).await.expect_err("refused");

    assert!(matches!(err, Error::LoginFailed { ref reason, .. } if reason == "bad password"));
    assert_eq!(session.status(), SessionStatus::Disconnected);
    assert_eq!(transport.logouts(), 1);
}

#[tokio::test]
async fn test_login_fails_when_transport_unreachable() {
    init_logging();
    let transport = ScriptedTransport::with_login(LoginBehavior::Unreachable);
    let session = Session::builder()
        .transport(transport.clone())
        .build()
        .expect("session");

    let err = session.login(credentials()).await.expect_err("unreachable");

    assert!(matches!(
        err,
        Error::LoginFailed { cause: Some(ref cause), .. } if cause.is_connection_error()
    ));
    assert_eq!(session.status(), SessionStatus::Disconnected);
}

#[tokio::test]
async fn test_login_fails_on_protocol_rejection() {
    init_logging();
    let transport = ScriptedTransport::with_responder(|client_id, message| {
        match &message.body {
            MessageBody::ProtocolSelection { .. } if client_id.is_internal() => {
                vec![internal_reply(error_reply(message, "version mismatch"))]
            }
            _ => Vec::new(),
        }
    });
    let session = Session::builder()
        .transport(transport.clone())
        .build()
        .expect("session");

    let err = session.login(credentials()).await.expect_err("rejected");

    assert!(err.to_string().contains("Protocol selection rejected: version mismatch"));
    assert_eq!(session.status(), SessionStatus::Disconnected);
}

#[tokio::test]
async fn test_login_times_out() {
    init_logging();
    let transport = ScriptedTransport::with_login(LoginBehavior::Silent);
    let session = Session::builder()
        .transport(transport.clone())
        .login_timeout(Duration::from_millis(50))
        .build()
        .expect("session");

    let err = session.login(credentials()).await.expect_err("timeout");

    assert!(matches!(
        err,
        Error::LoginFailed { cause: Some(ref cause), .. } if cause.is_timeout()
    ));
    assert_eq!(session.status(), SessionStatus::Disconnected);
}

#[tokio::test]
async fn test_disconnect_during_login_fails_login() {
    init_logging();
    let transport = ScriptedTransport::with_login(LoginBehavior::Silent);
    let session = Session::builder()
        .transport(transport.clone())
        .build()
        .expect("session");

    let login = {
        let session = session.clone();
        tokio::spawn(async move { session.login(credentials()).await })
    };
    eventually("transport login started", || transport.logins() == 1).await;

    transport.drop_connection("connection reset");

    let err = login.await.expect("join").expect_err("disconnected");
    assert!(err.to_string().contains("Disconnected during login"));
    assert_eq!(session.status(), SessionStatus::Disconnected);
}

#[tokio::test]
async fn test_login_again_after_disconnect() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = connected_session(&transport).await;

    session.disconnect().await.expect("disconnect");
    assert_eq!(session.status(), SessionStatus::Disconnected);

    session.login(credentials()).await.expect("second login");
    assert_eq!(session.status(), SessionStatus::Connected);
    assert_eq!(transport.logins(), 2);
}

// ============================================================================
// Attach
// ============================================================================

#[tokio::test]
async fn test_concurrent_duplicate_attach_fails_and_first_survives() {
    init_logging();
    // Answers the protocol selection but leaves attach requests pending.
    let transport = ScriptedTransport::with_responder(|client_id, message| {
        match &message.body {
            MessageBody::ProtocolSelection { .. } if client_id.is_internal() => {
                vec![internal_reply(ResponseMessage::ok(message.id))]
            }
            _ => Vec::new(),
        }
    });
    let session = connected_session(&transport).await;
    let (first, _) = recording_client("chat");

    let attaching = {
        let session = session.clone();
        let first = first.clone();
        tokio::spawn(async move { session.attach(&first).await })
    };
    eventually("attach request sent", || transport.attach_request("chat").is_some()).await;

    let (second, _) = recording_client("chat");
    let err = session.attach(&second).await.expect_err("duplicate");
    assert!(matches!(err, Error::AttachFailed { .. }));
    assert!(err.to_string().contains("Duplicate attach for client type chat"));

    let request = transport.attach_request("chat").expect("request");
    transport.push(internal_reply(ResponseMessage::attached_client(
        request.id,
        ClientId::new(FIRST_CLIENT_ID),
    )));
    attaching.await.expect("join").expect("first attach");

    let registered = session.client(&chat()).expect("registered");
    assert!(registered.ptr_eq(&first));
    assert!(first.is_attached());
    assert!(!second.is_attached());
}

#[tokio::test]
async fn test_failed_attach_rolls_back_and_permits_retry() {
    init_logging();
    let fallback = default_responder();
    let attempts = AtomicUsize::new(0);
    let transport = ScriptedTransport::with_responder(move |client_id, message| {
        let is_attach = matches!(message.body, MessageBody::AttachClient { .. });
        if is_attach && attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return vec![internal_reply(error_reply(message, "server busy"))];
        }
        fallback(client_id, message)
    });
    let session = connected_session(&transport).await;
    let (client, _) = recording_client("chat");

    let err = session.attach(&client).await.expect_err("refused");
    assert!(matches!(err, Error::AttachFailed { ref reason, .. } if reason == "server busy"));
    assert!(session.client(&chat()).is_none());
    assert_eq!(client.status(), ClientStatus::Detached);

    session.attach(&client).await.expect("retry");
    assert!(client.is_attached());
    assert!(session.client(&chat()).is_some());
}

#[tokio::test]
async fn test_attach_requires_connected_session() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = Session::builder()
        .transport(transport.clone())
        .build()
        .expect("session");
    let (client, _) = recording_client("chat");

    let err = session.attach(&client).await.expect_err("not connected");
    assert!(matches!(err, Error::AttachFailed { ref reason, .. } if reason == "Session not connected"));
}

#[tokio::test]
async fn test_messages_after_attach_arrive_in_order() {
    init_logging();
    let fallback = default_responder();
    let transport = ScriptedTransport::with_responder(move |client_id, message| {
        let mut events = fallback(client_id, message);
        if matches!(message.body, MessageBody::AttachClient { .. }) {
            for name in ["m1", "m2", "m3"] {
                events.push(session_message(FIRST_CLIENT_ID, &Message::data(name, json!({}))));
            }
        }
        events
    });
    let session = connected_session(&transport).await;
    let (client, log) = recording_client("chat");

    session.attach(&client).await.expect("attach");

    eventually("three messages delivered", || log.lock().len() == 3).await;
    assert_eq!(data_names(&log), vec!["m1", "m2", "m3"]);
}

// ============================================================================
// Send / Detach
// ============================================================================

#[tokio::test]
async fn test_end_to_end_attach_send_detach() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = connected_session(&transport).await;
    let (client, _) = recording_client("chat");

    session.attach(&client).await.expect("attach");
    assert!(client.is_attached());

    let message = Message::data("chat.say", json!({ "text": "hi" }));
    let expected = frame::encode_bytes(
        ClientId::new(FIRST_CLIENT_ID),
        &message.to_bytes().expect("serialize"),
    );
    session.send(&client, message).expect("send");

    let sent = transport.sent_frames();
    let last = sent.last().expect("frame sent");
    assert_eq!(&last[..2], &[0x00, 0x07]);
    assert_eq!(last, &expected);

    transport.push(TransportEvent::JoinedChannel {
        channel: "wonderland.Client.chat".into(),
    });
    session.detach(&client).expect("detach");
    assert_eq!(client.status(), ClientStatus::Detached);

    let (client_id, notice) = transport.sent_messages().pop().expect("detach notice");
    assert!(client_id.is_internal());
    assert_eq!(
        notice.body,
        MessageBody::DetachClient {
            client_id: ClientId::new(FIRST_CLIENT_ID)
        }
    );

    transport.push(TransportEvent::LeftChannel {
        channel: "wonderland.Client.chat".into(),
    });
    eventually("record removed", || session.client(&chat()).is_none()).await;

    let err = session
        .send(&client, Message::data("chat.say", json!({})))
        .expect_err("detached");
    assert!(err.is_illegal_state());
}

#[tokio::test]
async fn test_client_send_goes_through_session() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = connected_session(&transport).await;
    let (client, _) = recording_client("chat");
    session.attach(&client).await.expect("attach");

    client
        .send(Message::data("chat.say", json!({ "text": "hello" })))
        .expect("send");

    let (client_id, message) = transport.sent_messages().pop().expect("sent");
    assert_eq!(client_id, ClientId::new(FIRST_CLIENT_ID));
    assert_eq!(message.payload(), Some(&json!({ "text": "hello" })));
}

#[tokio::test]
async fn test_detached_type_stays_reserved_until_channel_left() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = connected_session(&transport).await;
    let channel = session.channel_names().client_channel(&chat());
    let (first, _) = recording_client("chat");
    session.attach(&first).await.expect("attach");

    transport.push(TransportEvent::JoinedChannel {
        channel: channel.clone(),
    });
    first.detach().expect("detach");

    let (second, _) = recording_client("chat");
    let err = session.attach(&second).await.expect_err("still reserved");
    assert!(err.to_string().contains("Duplicate attach for client type chat"));

    transport.push(TransportEvent::LeftChannel { channel });
    eventually("record removed", || session.client(&chat()).is_none()).await;

    session.attach(&second).await.expect("attach after channel left");
    let registered = session.client(&chat()).expect("registered");
    assert!(registered.ptr_eq(&second));
}

#[tokio::test]
async fn test_send_rejects_foreign_instance_of_attached_type() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = connected_session(&transport).await;
    let (attached, _) = recording_client("chat");
    session.attach(&attached).await.expect("attach");

    let (impostor, _) = recording_client("chat");
    let err = session
        .send(&impostor, Message::data("chat.say", json!({})))
        .expect_err("not this instance");
    assert!(err.is_illegal_state());
}

// ============================================================================
// Response Correlation
// ============================================================================

#[tokio::test]
async fn test_response_listener_fires_exactly_once() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = connected_session(&transport).await;
    let (client, log) = recording_client("chat");
    session.attach(&client).await.expect("attach");

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let request = Message::data("chat.history", json!({}));
    let reply = ResponseMessage::ok(request.id).into_message();

    client
        .send_with_listener(
            request,
            Arc::new(move |_: ResponseMessage| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .expect("send");

    transport.push(session_message(FIRST_CLIENT_ID, &reply));
    transport.push(session_message(FIRST_CLIENT_ID, &reply));

    eventually("duplicate reached the handler", || log.lock().len() == 1).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(log.lock()[0].is_response());
}

#[tokio::test]
async fn test_send_and_wait_round_trip() {
    init_logging();
    let fallback = default_responder();
    let transport = ScriptedTransport::with_responder(move |client_id, message| {
        match &message.body {
            MessageBody::Data { name, .. } if name == "chat.ping" => {
                let pong = ResponseMessage::ok(message.id).into_message();
                vec![session_message(client_id.as_u16(), &pong)]
            }
            _ => fallback(client_id, message),
        }
    });
    let session = connected_session(&transport).await;
    let (client, log) = recording_client("chat");
    session.attach(&client).await.expect("attach");

    let response = client
        .send_and_wait(Message::data("chat.ping", json!({})))
        .await
        .expect("response");

    assert!(response.is_ok());
    assert_eq!(client.pending_responses(), 0);
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn test_resent_message_id_is_rejected_while_pending() {
    init_logging();
    let fallback = default_responder();
    let transport = ScriptedTransport::with_responder(move |client_id, message| {
        match &message.body {
            MessageBody::Data { .. } => {
                let reply = ResponseMessage::ok(message.id).into_message();
                vec![session_message(client_id.as_u16(), &reply)]
            }
            _ => fallback(client_id, message),
        }
    });
    let session = connected_session(&transport).await;
    let (client, _) = recording_client("chat");
    session.attach(&client).await.expect("attach");

    let request = Message::data("chat.history", json!({}));
    let (first, second) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(
            client.send_and_wait(request.clone()),
            client.send_and_wait(request)
        )
    })
    .await
    .expect("both waits finish");

    assert!(first.expect("first reply").is_ok());
    assert!(second.expect_err("duplicate id").is_illegal_state());
    assert_eq!(client.pending_responses(), 0);
}

#[tokio::test]
async fn test_send_and_wait_times_out() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = Session::builder()
        .transport(transport.clone())
        .response_timeout(Duration::from_millis(50))
        .build()
        .expect("session");
    session.login(credentials()).await.expect("login");
    let (client, _) = recording_client("chat");
    session.attach(&client).await.expect("attach");

    let err = client
        .send_and_wait(Message::data("chat.history", json!({})))
        .await
        .expect_err("no reply");

    assert!(err.is_timeout());
    assert_eq!(client.pending_responses(), 0);
}

#[tokio::test]
async fn test_undecodable_reply_releases_waiter_with_error() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = connected_session(&transport).await;
    let (client, _) = recording_client("chat");
    session.attach(&client).await.expect("attach");

    let listener = Arc::new(WaitResponseListener::new());
    let request = Message::data("chat.history", json!({}));
    let request_id = request.id;
    client
        .send_with_listener(request, listener.clone())
        .expect("send");

    let garbled = format!(
        r#"{{ "id": {}, "body": {{ "type": "noSuchThing" }} }}"#,
        request_id.as_u64()
    );
    transport.push(TransportEvent::SessionMessage(frame::encode_bytes(
        ClientId::new(FIRST_CLIENT_ID),
        garbled.as_bytes(),
    )));

    let response = listener
        .wait_for_response(Some(Duration::from_secs(5)))
        .await
        .expect("released");
    assert_eq!(response.id, request_id);
    assert!(matches!(
        response.kind,
        ResponseKind::Error { ref message, cause: Some(_) } if message == "Message decode failed"
    ));
}

#[tokio::test]
async fn test_unknown_client_id_is_dropped() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = connected_session(&transport).await;
    let (client, log) = recording_client("chat");
    session.attach(&client).await.expect("attach");

    transport.push(session_message(99, &Message::data("lost", json!({}))));
    transport.push(TransportEvent::SessionMessage(vec![0x00]));
    transport.push(session_message(FIRST_CLIENT_ID, &Message::data("after", json!({}))));

    eventually("later message delivered", || log.lock().len() == 1).await;
    assert_eq!(data_names(&log), vec!["after"]);
    assert_eq!(session.status(), SessionStatus::Connected);
}

// ============================================================================
// Connection Loss
// ============================================================================

#[tokio::test]
async fn test_connection_loss_releases_waiters_and_detaches() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = connected_session(&transport).await;
    let (client, _) = recording_client("chat");
    session.attach(&client).await.expect("attach");

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send_and_wait(Message::data("chat.history", json!({})))
                .await
        })
    };
    eventually("request registered", || client.pending_responses() == 1).await;

    transport.drop_connection("network unreachable");

    let response = waiter.await.expect("join").expect("released with a reply");
    assert!(matches!(
        response.kind,
        ResponseKind::Error { ref message, .. } if message == "Connection closed"
    ));
    assert_eq!(session.status(), SessionStatus::Disconnected);
    assert!(!client.is_attached());
    assert!(session.clients().is_empty());
}

#[tokio::test]
async fn test_channel_left_releases_pending_waiter() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = connected_session(&transport).await;
    let channel = session.channel_names().client_channel(&chat());
    let (client, _) = recording_client("chat");
    session.attach(&client).await.expect("attach");
    transport.push(TransportEvent::JoinedChannel {
        channel: channel.clone(),
    });

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .send_and_wait(Message::data("chat.history", json!({})))
                .await
        })
    };
    eventually("request registered", || client.pending_responses() == 1).await;

    transport.push(TransportEvent::LeftChannel { channel });

    let response = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter released")
        .expect("join")
        .expect("released with a reply");
    assert!(matches!(
        response.kind,
        ResponseKind::Error { ref message, .. } if message == "Client detached"
    ));
    assert!(!client.is_attached());
    assert_eq!(client.pending_responses(), 0);

    transport.drop_connection("network unreachable");
    eventually("session disconnected", || {
        session.status() == SessionStatus::Disconnected
    })
    .await;
}

#[tokio::test]
async fn test_disconnect_detaches_every_client() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = connected_session(&transport).await;
    let (chat_client, _) = recording_client("chat");
    let (cell_client, _) = recording_client("cell");
    session.attach(&chat_client).await.expect("attach chat");
    session.attach(&cell_client).await.expect("attach cell");
    assert_eq!(session.clients().len(), 2);

    session.disconnect().await.expect("disconnect");

    assert_eq!(session.status(), SessionStatus::Disconnected);
    assert_eq!(transport.logouts(), 1);
    assert!(!chat_client.is_attached());
    assert!(!cell_client.is_attached());
    assert!(session.clients().is_empty());

    let err = session
        .send(&chat_client, Message::data("chat.say", json!({})))
        .expect_err("disconnected");
    assert!(err.is_illegal_state());
}

// ============================================================================
// Channels
// ============================================================================

/// Channel listener counting what it sees.
#[derive(Default)]
struct CountingChannel {
    messages: AtomicUsize,
    left: AtomicUsize,
}

impl ClientChannelListener for CountingChannel {
    fn received_message(&self, _channel: &str, _data: &[u8]) {
        self.messages.fetch_add(1, Ordering::SeqCst);
    }

    fn left_channel(&self, _channel: &str) {
        self.left.fetch_add(1, Ordering::SeqCst);
    }
}

/// Claims every channel under a prefix.
struct PrefixRouter {
    prefix: &'static str,
    listener: Arc<CountingChannel>,
}

impl ChannelJoinedListener for PrefixRouter {
    fn joined_channel(
        &self,
        _session: &Session,
        channel: &str,
    ) -> Option<Arc<dyn ClientChannelListener>> {
        channel
            .starts_with(self.prefix)
            .then(|| Arc::clone(&self.listener) as Arc<dyn ClientChannelListener>)
    }
}

#[tokio::test]
async fn test_client_channel_routes_to_client() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = connected_session(&transport).await;
    let (client, log) = recording_client("chat");
    session.attach(&client).await.expect("attach");

    let channel = session.channel_names().client_channel(&chat());
    let data = Message::data("chat.said", json!({ "from": "bob" }))
        .to_bytes()
        .expect("serialize");

    transport.push(TransportEvent::JoinedChannel {
        channel: channel.clone(),
    });
    transport.push(TransportEvent::ChannelMessage { channel, data });

    eventually("channel message delivered", || log.lock().len() == 1).await;
    assert_eq!(data_names(&log), vec!["chat.said"]);
}

#[tokio::test]
async fn test_all_clients_broadcast_reaches_every_client() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = connected_session(&transport).await;
    let (chat_client, chat_log) = recording_client("chat");
    let (cell_client, cell_log) = recording_client("cell");
    session.attach(&chat_client).await.expect("attach chat");
    session.attach(&cell_client).await.expect("attach cell");

    let channel = session.channel_names().all_clients_channel().to_string();
    let data = Message::data("server.notice", json!({ "text": "restart soon" }))
        .to_bytes()
        .expect("serialize");

    transport.push(TransportEvent::JoinedChannel {
        channel: channel.clone(),
    });
    transport.push(TransportEvent::ChannelMessage { channel, data });

    eventually("broadcast delivered", || {
        chat_log.lock().len() == 1 && cell_log.lock().len() == 1
    })
    .await;
}

#[tokio::test]
async fn test_first_channel_listener_wins() {
    init_logging();
    let transport = ScriptedTransport::new();
    let session = connected_session(&transport).await;

    let first = Arc::new(CountingChannel::default());
    let second = Arc::new(CountingChannel::default());
    session.add_channel_joined_listener(PrefixRouter {
        prefix: "custom.",
        listener: Arc::clone(&first),
    });
    let second_id = session.add_channel_joined_listener(PrefixRouter {
        prefix: "custom.",
        listener: Arc::clone(&second),
    });

    transport.push(TransportEvent::JoinedChannel {
        channel: "custom.weather".into(),
    });
    transport.push(TransportEvent::ChannelMessage {
        channel: "custom.weather".into(),
        data: b"{}".to_vec(),
    });
    transport.push(TransportEvent::LeftChannel {
        channel: "custom.weather".into(),
    });

    eventually("channel left", || first.left.load(Ordering::SeqCst) == 1).await;
    assert_eq!(first.messages.load(Ordering::SeqCst), 1);
    assert_eq!(second.messages.load(Ordering::SeqCst), 0);

    assert!(session.remove_channel_joined_listener(second_id));
    assert!(!session.remove_channel_joined_listener(second_id));
}
