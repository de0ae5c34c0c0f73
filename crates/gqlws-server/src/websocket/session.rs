//! Session lifecycle for one upgraded socket, from registration to close.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use gqlws_core::protocol::OperationMessage;
use gqlws_core::{AuthenticateFn, Connection, ConnectionEvents};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, instrument};

use super::connection::WsConnection;
use super::dispatch::Dispatcher;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_DISCONNECTIONS_TOTAL,
};

/// How long the writer may spend flushing and closing after the connection ends.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Run a registered connection until it closes.
///
/// 1. Spawns the writer, which drains `outbound` and emits `ka` frames
/// 2. Dispatches inbound text frames until the peer leaves, a read fails,
///    or the connection's token is cancelled
/// 3. Closes the connection and fires the close hook exactly once
#[instrument(skip_all, fields(conn_id = %conn.id()))]
pub async fn run_connection(
    socket: WebSocket,
    conn: Arc<WsConnection>,
    outbound: mpsc::Receiver<OperationMessage>,
    events: Arc<dyn ConnectionEvents>,
    authenticate: Option<AuthenticateFn>,
    keep_alive: Option<Duration>,
) {
    let started = Instant::now();
    let (ws_tx, mut ws_rx) = socket.split();
    let writer = tokio::spawn(write_loop(ws_tx, outbound, conn.clone(), keep_alive));

    let dispatcher = Dispatcher::new(
        conn.clone(),
        events.clone(),
        authenticate,
        keep_alive.is_some(),
    );
    let cancel = conn.cancel_token().clone();

    loop {
        let msg = tokio::select! {
            () = cancel.cancelled() => break,
            msg = ws_rx.next() => msg,
        };
        match msg {
            Some(Ok(Message::Text(text))) => dispatcher.handle_text(text.as_str()),
            Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => dispatcher.handle_text(text),
                Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) => {
                debug!("peer sent close frame");
                break;
            }
            Some(Err(err)) => {
                debug!(error = %err, "socket read failed");
                break;
            }
            None => break,
        }
    }

    conn.close();
    events.on_close(dispatcher.handle());

    info!(
        user = %gqlws_core::connection::display_user(conn.user().as_ref()),
        "connection closed"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

    let _ = writer.await;
}

/// Drain the send queue into the socket until the connection closes.
async fn write_loop<S>(
    mut ws_tx: S,
    mut outbound: mpsc::Receiver<OperationMessage>,
    conn: Arc<WsConnection>,
    keep_alive: Option<Duration>,
) where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let cancel = conn.cancel_token().clone();
    let mut ka_interval = keep_alive.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            () = next_tick(ka_interval.as_mut()) => {
                if !conn.is_acknowledged() {
                    continue;
                }
                OperationMessage::keep_alive()
            }
        };
        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            sent = write_frame(&mut ws_tx, &frame) => sent,
        };
        if sent.is_err() {
            break;
        }
    }

    // Frames queued before the close (e.g. a final error) still go out.
    if tokio::time::timeout(CLOSE_TIMEOUT, flush_and_close(&mut ws_tx, &mut outbound))
        .await
        .is_err()
    {
        debug!(timeout = ?CLOSE_TIMEOUT, "peer stalled while closing, abandoning socket");
    }

    // A failed write ends the reader too.
    conn.close();
}

async fn flush_and_close<S>(ws_tx: &mut S, outbound: &mut mpsc::Receiver<OperationMessage>)
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    while let Ok(frame) = outbound.try_recv() {
        if write_frame(ws_tx, &frame).await.is_err() {
            return;
        }
    }
    if let Err(err) = ws_tx.close().await {
        debug!(error = %err, "error closing socket");
    }
}

async fn write_frame<S>(ws_tx: &mut S, frame: &OperationMessage) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    match serde_json::to_string(frame) {
        Ok(json) => ws_tx.send(Message::Text(json.into())).await,
        Err(err) => {
            debug!(error = %err, kind = %frame.kind, "failed to encode frame");
            Ok(())
        }
    }
}

async fn next_tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
