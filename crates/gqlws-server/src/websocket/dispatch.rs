//! Client frame dispatch.

use std::sync::Arc;

use gqlws_core::connection::display_user;
use gqlws_core::protocol::{ClientMessage, InitMessagePayload, OperationMessage};
use gqlws_core::{
    AuthenticateFn, Connection, ConnectionEvents, ProtocolError, StartMessagePayload,
    SubscriptionError,
};
use tracing::{debug, warn};

use super::connection::WsConnection;

/// Routes decoded client frames to the hook set and answers the peer.
pub struct Dispatcher {
    conn: Arc<WsConnection>,
    handle: Arc<dyn Connection>,
    events: Arc<dyn ConnectionEvents>,
    authenticate: Option<AuthenticateFn>,
    keep_alive: bool,
}

impl Dispatcher {
    /// Dispatcher for one connection. With `keep_alive` set, a `ka` frame
    /// follows every `connection_ack`.
    pub fn new(
        conn: Arc<WsConnection>,
        events: Arc<dyn ConnectionEvents>,
        authenticate: Option<AuthenticateFn>,
        keep_alive: bool,
    ) -> Self {
        let handle: Arc<dyn Connection> = conn.clone();
        Self {
            conn,
            handle,
            events,
            authenticate,
            keep_alive,
        }
    }

    /// The connection as seen by hooks and managers.
    pub fn handle(&self) -> &Arc<dyn Connection> {
        &self.handle
    }

    /// Handle one text frame.
    pub fn handle_text(&self, text: &str) {
        match ClientMessage::parse(text) {
            Ok(ClientMessage::Init(payload)) => self.on_init(payload),
            Ok(ClientMessage::Start { id, payload }) => self.on_start(&id, payload),
            Ok(ClientMessage::Stop { id }) => self.events.on_stop_operation(&self.handle, &id),
            Ok(ClientMessage::Terminate) => {
                debug!(conn_id = %self.conn.id(), "peer terminated connection");
                self.conn.close();
            }
            Err(err) => self.on_protocol_error(&err),
        }
    }

    fn on_init(&self, payload: InitMessagePayload) {
        if let Some(authenticate) = &self.authenticate {
            let token = payload.auth_token.unwrap_or_default();
            match authenticate(&token) {
                Ok(user) => {
                    debug!(conn_id = %self.conn.id(), user = %user, "authenticated");
                    self.conn.set_user(Some(user));
                }
                Err(err) => {
                    warn!(conn_id = %self.conn.id(), error = %err, "authentication failed");
                    let _ = self.conn.enqueue(OperationMessage::connection_error(&format!(
                        "Failed to authenticate user: {err}"
                    )));
                    return;
                }
            }
        }

        self.conn.mark_acknowledged();
        let _ = self.conn.enqueue(OperationMessage::ack());
        if self.keep_alive {
            let _ = self.conn.enqueue(OperationMessage::keep_alive());
        }
        debug!(
            conn_id = %self.conn.id(),
            user = %display_user(self.conn.user().as_ref()),
            "connection acknowledged"
        );
    }

    fn on_start(&self, op_id: &str, payload: StartMessagePayload) {
        let errors = self.events.on_start_operation(&self.handle, op_id, payload);
        if !errors.is_empty() {
            let _ = self
                .conn
                .enqueue(OperationMessage::operation_errors(op_id, &errors));
        }
    }

    fn on_protocol_error(&self, err: &ProtocolError) {
        debug!(conn_id = %self.conn.id(), error = %err, "rejecting client frame");
        let frame = match (err.operation_id(), err) {
            (Some(id), ProtocolError::InvalidPayload { message, .. }) => {
                OperationMessage::operation_errors(
                    id,
                    &[SubscriptionError::InvalidPayload(message.clone())],
                )
            }
            _ => OperationMessage::error(&err.to_string()),
        };
        let _ = self.conn.enqueue(frame);
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("conn", &self.conn)
            .field("authenticate", &self.authenticate.is_some())
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gqlws_core::protocol::message_type;
    use gqlws_core::{AuthError, ConnectionId, User};
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct RecordingEvents {
        started: Mutex<Vec<(String, StartMessagePayload)>>,
        stopped: Mutex<Vec<String>>,
        reply: Vec<SubscriptionError>,
    }

    impl ConnectionEvents for RecordingEvents {
        fn on_start_operation(
            &self,
            _conn: &Arc<dyn Connection>,
            op_id: &str,
            payload: StartMessagePayload,
        ) -> Vec<SubscriptionError> {
            self.started.lock().push((op_id.to_owned(), payload));
            self.reply.clone()
        }

        fn on_stop_operation(&self, _conn: &Arc<dyn Connection>, op_id: &str) {
            self.stopped.lock().push(op_id.to_owned());
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        conn: Arc<WsConnection>,
        events: Arc<RecordingEvents>,
        rx: mpsc::Receiver<OperationMessage>,
    }

    impl Fixture {
        fn frames(&mut self) -> Vec<OperationMessage> {
            let mut out = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                out.push(frame);
            }
            out
        }
    }

    fn fixture(
        events: RecordingEvents,
        authenticate: Option<AuthenticateFn>,
        keep_alive: bool,
    ) -> Fixture {
        let (tx, rx) = mpsc::channel(16);
        let conn = Arc::new(WsConnection::new(
            ConnectionId::from("c1"),
            tx,
            CancellationToken::new(),
        ));
        let events = Arc::new(events);
        let dispatcher = Dispatcher::new(conn.clone(), events.clone(), authenticate, keep_alive);
        Fixture {
            dispatcher,
            conn,
            events,
            rx,
        }
    }

    fn token_auth() -> AuthenticateFn {
        Arc::new(|token: &str| match token {
            "" => Err(AuthError::MissingToken),
            "good" => Ok(User::new("alice")),
            other => Err(AuthError::InvalidToken(other.to_owned())),
        })
    }

    #[test]
    fn init_without_authenticate_acks() {
        let mut fx = fixture(RecordingEvents::default(), None, false);
        fx.dispatcher.handle_text(r#"{"type":"connection_init"}"#);
        assert_eq!(fx.frames(), vec![OperationMessage::ack()]);
        assert!(fx.conn.is_acknowledged());
        assert!(fx.conn.user().is_none());
    }

    #[test]
    fn init_with_valid_token_stores_user() {
        let mut fx = fixture(RecordingEvents::default(), Some(token_auth()), false);
        fx.dispatcher
            .handle_text(r#"{"type":"connection_init","payload":{"authToken":"good"}}"#);
        assert_eq!(fx.frames(), vec![OperationMessage::ack()]);
        assert_eq!(fx.conn.user().unwrap().id, "alice");
    }

    #[test]
    fn init_with_bad_token_sends_connection_error() {
        let mut fx = fixture(RecordingEvents::default(), Some(token_auth()), false);
        fx.dispatcher
            .handle_text(r#"{"type":"connection_init","payload":{"authToken":"nope"}}"#);
        let frames = fx.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, message_type::CONNECTION_ERROR);
        assert_eq!(
            frames[0].payload,
            Some(json!("Failed to authenticate user: invalid auth token: nope"))
        );
        assert!(!fx.conn.is_acknowledged());
        assert!(!fx.conn.is_closed());
    }

    #[test]
    fn init_with_keep_alive_sends_ka_after_ack() {
        let mut fx = fixture(RecordingEvents::default(), None, true);
        fx.dispatcher.handle_text(r#"{"type":"connection_init","payload":{}}"#);
        assert_eq!(
            fx.frames(),
            vec![OperationMessage::ack(), OperationMessage::keep_alive()]
        );
    }

    #[test]
    fn start_invokes_hook_with_payload() {
        let mut fx = fixture(RecordingEvents::default(), None, false);
        fx.dispatcher.handle_text(
            r#"{"id":"op1","type":"start","payload":{"query":"subscription { a }","variables":{"x":1},"operationName":"A"}}"#,
        );
        let started = fx.events.started.lock();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].0, "op1");
        assert_eq!(started[0].1.query, "subscription { a }");
        assert_eq!(started[0].1.variables.get("x"), Some(&json!(1)));
        assert_eq!(started[0].1.operation_name.as_deref(), Some("A"));
        drop(started);
        assert!(fx.frames().is_empty());
    }

    #[test]
    fn start_errors_become_one_error_frame() {
        let events = RecordingEvents {
            reply: vec![
                SubscriptionError::EmptyQuery,
                SubscriptionError::validation("bad variable"),
            ],
            ..RecordingEvents::default()
        };
        let mut fx = fixture(events, None, false);
        fx.dispatcher
            .handle_text(r#"{"id":"op1","type":"start","payload":{"query":""}}"#);
        let frames = fx.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, message_type::ERROR);
        assert_eq!(frames[0].id.as_deref(), Some("op1"));
        assert_eq!(
            frames[0].payload,
            Some(json!([
                {"message": "query must not be empty"},
                {"message": "bad variable"}
            ]))
        );
    }

    #[test]
    fn start_without_id_is_rejected() {
        let mut fx = fixture(RecordingEvents::default(), None, false);
        fx.dispatcher
            .handle_text(r#"{"type":"start","payload":{"query":"subscription { a }"}}"#);
        assert_eq!(
            fx.frames(),
            vec![OperationMessage::error("Received start message without ID")]
        );
        assert!(fx.events.started.lock().is_empty());
    }

    #[test]
    fn start_with_bad_payload_reports_against_operation() {
        let mut fx = fixture(RecordingEvents::default(), None, false);
        fx.dispatcher
            .handle_text(r#"{"id":"op4","type":"start","payload":{"query":42}}"#);
        let frames = fx.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, message_type::ERROR);
        assert_eq!(frames[0].id.as_deref(), Some("op4"));
        assert!(fx.events.started.lock().is_empty());
    }

    #[test]
    fn stop_invokes_hook() {
        let mut fx = fixture(RecordingEvents::default(), None, false);
        fx.dispatcher.handle_text(r#"{"id":"op1","type":"stop"}"#);
        assert_eq!(*fx.events.stopped.lock(), vec!["op1".to_owned()]);
        assert!(fx.frames().is_empty());
    }

    #[test]
    fn stop_without_id_is_rejected() {
        let mut fx = fixture(RecordingEvents::default(), None, false);
        fx.dispatcher.handle_text(r#"{"type":"stop"}"#);
        assert_eq!(
            fx.frames(),
            vec![OperationMessage::error("Received stop message without ID")]
        );
        assert!(fx.events.stopped.lock().is_empty());
    }

    #[test]
    fn terminate_closes_connection() {
        let fx = fixture(RecordingEvents::default(), None, false);
        fx.dispatcher.handle_text(r#"{"type":"connection_terminate"}"#);
        assert!(fx.conn.is_closed());
        assert!(fx.conn.cancel_token().is_cancelled());
    }

    #[test]
    fn unknown_type_is_reported() {
        let mut fx = fixture(RecordingEvents::default(), None, false);
        fx.dispatcher.handle_text(r#"{"type":"subscribe","id":"1"}"#);
        assert_eq!(
            fx.frames(),
            vec![OperationMessage::error("Unhandled message type: subscribe")]
        );
        assert!(!fx.conn.is_closed());
    }

    #[test]
    fn invalid_json_is_reported_and_connection_stays_open() {
        let mut fx = fixture(RecordingEvents::default(), None, false);
        fx.dispatcher.handle_text("{not json");
        let frames = fx.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, message_type::ERROR);
        assert!(!fx.conn.is_closed());
    }

    #[test]
    fn handle_exposes_same_connection() {
        let fx = fixture(RecordingEvents::default(), None, false);
        assert_eq!(fx.dispatcher.handle().id(), fx.conn.id());
    }
}
