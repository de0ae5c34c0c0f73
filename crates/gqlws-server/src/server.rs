//! `GqlWsServer`: Axum HTTP server hosting the graphql-ws endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use gqlws_settings::ServerSettings;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::HandlerConfig;
use crate::errors::ServerError;
use crate::handler::Handler;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The upgrade handler and its registry.
    pub handler: Arc<Handler>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
}

/// The graphql-ws server.
pub struct GqlWsServer {
    settings: ServerSettings,
    handler: Arc<Handler>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl GqlWsServer {
    /// Create a server; socket-level settings override `config`.
    pub fn new(settings: ServerSettings, config: HandlerConfig) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let handler = Arc::new(Handler::new(
            config.with_settings(&settings),
            shutdown.token(),
        ));
        Self {
            settings,
            handler,
            shutdown,
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from this Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            handler: self.handler.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        let mut routes = Router::new().route("/health", get(health_handler));
        if self.metrics.is_some() {
            routes = routes.route("/metrics", get(metrics_handler));
        }

        self.handler
            .router(&self.settings.path)
            .merge(routes.with_state(state))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind `host:port` and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.settings.bind_addr();
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => return Err(ServerError::Bind { addr, source }),
        };
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(err) = result {
                error!(error = %err, "server error");
            }
        });

        info!(addr = %local_addr, path = %self.settings.path, "graphql-ws server listening");
        Ok((local_addr, handle))
    }

    /// The upgrade handler.
    pub fn handler(&self) -> &Arc<Handler> {
        &self.handler
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server settings.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.handler.registry().len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(crate::metrics::render)
        .unwrap_or_default()
}
