//! Composition root: turns upgrade requests into registered connections.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use gqlws_core::{AuthenticateFn, Connection, ConnectionEvents, ConnectionId};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ConnectionOptions, HandlerConfig};
use crate::hooks::SubscriptionHooks;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_NEGOTIATION_FAILURES_TOTAL};
use crate::registry::ConnectionRegistry;
use crate::upgrade::{OriginPolicy, Upgrader};
use crate::websocket::{WsConnection, run_connection};

/// Request handler owning the connection registry.
///
/// The registry lives as long as the handler; entries are added on upgrade
/// and removed by each connection's close hook.
pub struct Handler {
    upgrader: Upgrader,
    origin_policy: OriginPolicy,
    registry: Arc<ConnectionRegistry>,
    hooks: Arc<SubscriptionHooks>,
    authenticate: Option<AuthenticateFn>,
    options: ConnectionOptions,
    shutdown: CancellationToken,
}

impl Handler {
    /// Build a handler. Its connections close when `shutdown` is cancelled.
    pub fn new(config: HandlerConfig, shutdown: CancellationToken) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let hooks = Arc::new(SubscriptionHooks::new(
            config.subscription_manager,
            registry.clone(),
            config.event_handlers,
        ));
        Self {
            upgrader: Upgrader::new(config.subprotocol, config.connection.max_message_size),
            origin_policy: config.origin_policy,
            registry,
            hooks,
            authenticate: config.authenticate,
            options: config.connection,
            shutdown,
        }
    }

    /// Open connections.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Router serving the upgrade endpoint at `path`.
    pub fn router(self: &Arc<Self>, path: &str) -> Router {
        Router::new()
            .route(path, get(upgrade_handler))
            .with_state(self.clone())
    }

    /// Handle one upgrade request.
    pub fn handle(
        self: &Arc<Self>,
        headers: &HeaderMap,
        ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    ) -> Response {
        if !self.origin_policy.allows_request(headers) {
            counter!(WS_NEGOTIATION_FAILURES_TOTAL, "reason" => "origin").increment(1);
            warn!(origin = ?headers.get(axum::http::header::ORIGIN), "origin not allowed");
            return StatusCode::FORBIDDEN.into_response();
        }

        let ws = match ws {
            Ok(ws) => ws,
            Err(rejection) => {
                counter!(WS_NEGOTIATION_FAILURES_TOTAL, "reason" => "request").increment(1);
                warn!(error = %rejection, "Failed to establish WebSocket connection");
                return rejection.into_response();
            }
        };

        let handler = self.clone();
        self.upgrader
            .upgrade(ws, move |socket| async move { handler.serve(socket).await })
    }

    /// Register a negotiated socket and run it until it closes.
    async fn serve(&self, socket: WebSocket) {
        let (tx, rx) = mpsc::channel(self.options.send_queue_size);
        let conn = Arc::new(WsConnection::new(
            ConnectionId::new(),
            tx,
            self.shutdown.child_token(),
        ));

        // Registered before the read loop starts, so the close hook always
        // finds the entry it removes.
        self.registry.insert(conn.clone());
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(conn_id = %conn.id(), "connection opened");

        let events: Arc<dyn ConnectionEvents> = self.hooks.clone();
        run_connection(
            socket,
            conn,
            rx,
            events,
            self.authenticate.clone(),
            self.options.keep_alive,
        )
        .await;
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("upgrader", &self.upgrader)
            .field("origin_policy", &self.origin_policy)
            .field("registry", &self.registry)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

async fn upgrade_handler(
    State(handler): State<Arc<Handler>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    handler.handle(&headers, ws)
}
