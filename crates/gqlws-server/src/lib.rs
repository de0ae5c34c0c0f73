//! # gqlws-server
//!
//! Axum endpoint that upgrades requests into graphql-ws connections and
//! wires each connection's events to a [`SubscriptionManager`].
//!
//! - [`upgrade`]: sub-protocol negotiation and origin policy
//! - [`registry`]: process-wide set of open connections
//! - [`hooks`]: close / start / stop hooks bridging connections to the manager
//! - [`handler`]: composition root producing the upgrade route
//! - [`websocket`]: socket-backed [`Connection`] with graphql-ws framing
//! - [`subscriptions`]: in-memory [`SubscriptionManager`]
//! - [`server`]: listener, `/health`, `/metrics`, graceful shutdown
//!
//! [`SubscriptionManager`]: gqlws_core::SubscriptionManager
//! [`Connection`]: gqlws_core::Connection

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod handler;
pub mod health;
pub mod hooks;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod subscriptions;
pub mod upgrade;
pub mod websocket;

pub use config::{ConnectionOptions, HandlerConfig};
pub use errors::ServerError;
pub use handler::Handler;
pub use registry::ConnectionRegistry;
pub use server::GqlWsServer;
pub use subscriptions::InMemorySubscriptionManager;
pub use upgrade::OriginPolicy;
