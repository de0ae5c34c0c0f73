//! # gqlws
//!
//! graphql-ws subscription server binary: loads settings, installs logging
//! and metrics, and serves the subscription endpoint until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gqlws_core::connection::display_user;
use gqlws_core::logging::{init_json_subscriber, init_subscriber};
use gqlws_core::{Connection, EventHandlers};
use gqlws_server::{GqlWsServer, HandlerConfig, InMemorySubscriptionManager};
use gqlws_settings::{GqlWsSettings, LogFormat};

/// graphql-ws subscription server.
#[derive(Parser, Debug)]
#[command(name = "gqlws", about = "graphql-ws subscription server")]
struct Cli {
    /// Settings file (JSON). Missing files fall back to defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level or filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Load settings and apply flag overrides on top.
    fn settings(&self) -> Result<GqlWsSettings> {
        let mut settings = gqlws_settings::load_settings(self.config.as_deref())
            .context("Failed to load settings")?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

/// Observers that log subscription activity.
fn logging_observers() -> EventHandlers {
    EventHandlers::new()
        .on_close(|conn: &Arc<dyn Connection>| {
            tracing::info!(
                conn_id = %conn.id(),
                user = %display_user(conn.user().as_ref()),
                "client disconnected"
            );
        })
        .on_new_subscription(|sub, errors| {
            if errors.is_empty() {
                tracing::info!(op_id = %sub.id, "subscription started");
            } else {
                tracing::info!(op_id = %sub.id, errors = errors.len(), "subscription rejected");
            }
        })
        .on_stop_subscription(|op_id| tracing::info!(op_id, "subscription stopped"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.settings()?;

    match settings.logging.format {
        LogFormat::Compact => init_subscriber(&settings.logging.level),
        LogFormat::Json => init_json_subscriber(&settings.logging.level),
    }

    let metrics = gqlws_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let manager = Arc::new(InMemorySubscriptionManager::new());
    let config = HandlerConfig::new(manager).with_event_handlers(logging_observers());
    let server = GqlWsServer::new(settings.server, config).with_metrics(metrics);

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;
    tracing::info!(
        "gqlws listening on ws://{addr}{}",
        server.settings().path
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server.shutdown().graceful_shutdown(vec![handle], None).await {
        tracing::warn!("Some connections did not close before the deadline");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
