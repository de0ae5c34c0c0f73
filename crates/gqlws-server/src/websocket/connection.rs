//! Per-socket connection state.

use std::sync::atomic::{AtomicBool, Ordering};

use gqlws_core::protocol::OperationMessage;
use gqlws_core::{Connection, ConnectionId, DataMessagePayload, User};
use metrics::counter;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::WS_SEND_DROPS_TOTAL;

/// One upgraded socket.
///
/// Outbound frames go through a bounded queue drained by the session's
/// writer task. Closing cancels the connection's token, which ends both
/// session tasks.
pub struct WsConnection {
    id: ConnectionId,
    user: RwLock<Option<User>>,
    outbound: mpsc::Sender<OperationMessage>,
    acknowledged: AtomicBool,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl WsConnection {
    /// Connection that writes into `outbound` and stops when `cancel` fires.
    ///
    /// Pass a child of the server shutdown token so shutdown closes it.
    pub fn new(
        id: ConnectionId,
        outbound: mpsc::Sender<OperationMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            user: RwLock::new(None),
            outbound,
            acknowledged: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            cancel,
        }
    }

    /// Queue a frame for the writer.
    ///
    /// Returns `false` when the connection is closed or the queue is full;
    /// a full queue drops the frame.
    pub fn enqueue(&self, frame: OperationMessage) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.outbound.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => {
                counter!(WS_SEND_DROPS_TOTAL).increment(1);
                warn!(
                    conn_id = %self.id,
                    kind = %frame.kind,
                    op_id = frame.id.as_deref().unwrap_or_default(),
                    "send queue full, dropping frame"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Record the authenticated user.
    pub fn set_user(&self, user: Option<User>) {
        *self.user.write() = user;
    }

    /// Mark `connection_init` as acknowledged.
    pub fn mark_acknowledged(&self) {
        self.acknowledged.store(true, Ordering::Release);
    }

    /// Whether `connection_ack` has been sent.
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::Acquire)
    }

    /// Whether [`Connection::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Token cancelled when this connection closes or the server shuts down.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Connection for WsConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn user(&self) -> Option<User> {
        self.user.read().clone()
    }

    fn send_data(&self, op_id: &str, payload: DataMessagePayload) {
        let _ = self.enqueue(OperationMessage::data(op_id, &payload));
    }

    fn send_error(&self, message: &str) {
        let _ = self.enqueue(OperationMessage::error(message));
    }

    fn send_complete(&self, op_id: &str) {
        let _ = self.enqueue(OperationMessage::complete(op_id));
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(conn_id = %self.id, "closing socket");
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("id", &self.id)
            .field("user", &*self.user.read())
            .field("acknowledged", &self.is_acknowledged())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
