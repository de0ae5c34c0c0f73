//! # gqlws-core
//!
//! Foundation types shared by every gqlws crate.
//!
//! - **Branded IDs**: [`ConnectionId`] as a newtype over a UUID v7 string
//! - **Wire frames**: [`protocol::OperationMessage`] and the graphql-ws payloads
//! - **Collaborator traits**: [`Connection`], [`ConnectionEvents`], [`SubscriptionManager`]
//! - **Subscriptions**: [`Subscription`] with its bound send callback
//! - **Observers**: [`EventHandlers`] supplied by the embedding application
//! - **Errors**: [`SubscriptionError`], [`AuthError`], [`ProtocolError`] via `thiserror`
//! - **Logging**: `tracing` subscriber bootstrap and log capture for tests

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod protocol;
pub mod subscription;

pub use connection::{AuthenticateFn, Connection, ConnectionEvents, User};
pub use errors::{AuthError, ProtocolError, SubscriptionError};
pub use events::EventHandlers;
pub use ids::ConnectionId;
pub use protocol::{DataMessagePayload, GRAPHQL_WS_PROTOCOL, StartMessagePayload};
pub use subscription::{SendDataFn, Subscription, SubscriptionManager};
