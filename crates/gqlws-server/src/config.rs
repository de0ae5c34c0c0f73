//! Handler configuration.

use std::sync::Arc;
use std::time::Duration;

use gqlws_core::{AuthenticateFn, EventHandlers, GRAPHQL_WS_PROTOCOL, SubscriptionManager};
use gqlws_settings::ServerSettings;

use crate::upgrade::OriginPolicy;

/// Per-connection socket options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Interval between `ka` frames after `connection_ack`. `None` disables them.
    pub keep_alive: Option<Duration>,
    /// Outbound frames buffered before new frames are dropped.
    pub send_queue_size: usize,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ConnectionOptions {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            keep_alive: (settings.keep_alive_interval_ms > 0)
                .then(|| Duration::from_millis(settings.keep_alive_interval_ms)),
            send_queue_size: settings.send_queue_size.max(1),
            max_message_size: settings.max_message_size,
        }
    }
}

/// Everything a [`Handler`](crate::Handler) is built from.
#[derive(Clone)]
pub struct HandlerConfig {
    /// Shared subscription bookkeeping.
    pub subscription_manager: Arc<dyn SubscriptionManager>,
    /// Resolves `connection_init` tokens into users. `None` acknowledges every init.
    pub authenticate: Option<AuthenticateFn>,
    /// Application observers.
    pub event_handlers: EventHandlers,
    /// Sub-protocol token the peer must offer.
    pub subprotocol: String,
    /// Which request origins may upgrade.
    pub origin_policy: OriginPolicy,
    /// Socket options applied to every connection.
    pub connection: ConnectionOptions,
}

impl HandlerConfig {
    /// Defaults around a subscription manager: no authentication, no
    /// observers, every origin accepted.
    pub fn new(subscription_manager: Arc<dyn SubscriptionManager>) -> Self {
        Self {
            subscription_manager,
            authenticate: None,
            event_handlers: EventHandlers::default(),
            subprotocol: GRAPHQL_WS_PROTOCOL.to_owned(),
            origin_policy: OriginPolicy::AllowAll,
            connection: ConnectionOptions::default(),
        }
    }

    /// Apply the socket-level parts of loaded settings.
    #[must_use]
    pub fn with_settings(mut self, settings: &ServerSettings) -> Self {
        self.subprotocol.clone_from(&settings.subprotocol);
        self.origin_policy = OriginPolicy::from(settings.allowed_origins.clone());
        self.connection = ConnectionOptions::from(settings);
        self
    }

    /// Set the authenticate function.
    #[must_use]
    pub fn with_authenticate(mut self, authenticate: AuthenticateFn) -> Self {
        self.authenticate = Some(authenticate);
        self
    }

    /// Set the application observers.
    #[must_use]
    pub fn with_event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }
}

impl std::fmt::Debug for HandlerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerConfig")
            .field("authenticate", &self.authenticate.is_some())
            .field("event_handlers", &self.event_handlers)
            .field("subprotocol", &self.subprotocol)
            .field("origin_policy", &self.origin_policy)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}
