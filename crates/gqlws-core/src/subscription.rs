//! Subscriptions and the manager contract.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::connection::Connection;
use crate::errors::SubscriptionError;
use crate::ids::ConnectionId;
use crate::protocol::{DataMessagePayload, StartMessagePayload};

/// Callback that pushes a result to the peer for one bound operation.
pub type SendDataFn = Arc<dyn Fn(DataMessagePayload) + Send + Sync>;

/// One active operation on one connection.
///
/// The operation id is unique per connection, not globally; managers key
/// subscriptions by `(connection id, operation id)`.
///
/// A subscription built with [`Subscription::with_id`] carries only the id.
/// That is all a manager needs to remove one.
#[derive(Clone, Default)]
pub struct Subscription {
    /// Client-chosen operation id.
    pub id: String,
    /// Query document text.
    pub query: String,
    /// Query variables.
    pub variables: HashMap<String, Value>,
    /// Operation to run when the document holds several.
    pub operation_name: Option<String>,
    /// Owning connection.
    pub connection: Option<Arc<dyn Connection>>,
    send_data: Option<SendDataFn>,
}

impl Subscription {
    /// Build a fully bound subscription from a start payload.
    pub fn new(
        id: impl Into<String>,
        payload: StartMessagePayload,
        connection: Arc<dyn Connection>,
        send_data: SendDataFn,
    ) -> Self {
        Self {
            id: id.into(),
            query: payload.query,
            variables: payload.variables,
            operation_name: payload.operation_name,
            connection: Some(connection),
            send_data: Some(send_data),
        }
    }

    /// Id-only subscription, used to identify one for removal.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Id of the owning connection, when bound.
    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.connection.as_ref().map(|c| c.id())
    }

    /// Push a result to the peer. No-op on an id-only subscription.
    pub fn send_data(&self, payload: DataMessagePayload) {
        if let Some(send) = &self.send_data {
            send(payload);
        }
    }

    /// Whether a send callback is bound.
    pub fn is_bound(&self) -> bool {
        self.send_data.is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("variables", &self.variables)
            .field("operation_name", &self.operation_name)
            .field("connection", &self.connection_id())
            .finish_non_exhaustive()
    }
}

/// Owns the live subscriptions and whatever executes them.
///
/// Shared by every connection; implementations must tolerate concurrent
/// calls from many connections.
pub trait SubscriptionManager: Send + Sync {
    /// Register a subscription for a connection.
    ///
    /// Returns every problem found; an empty list means the subscription is
    /// live. Problems are reported together rather than stopping at the
    /// first one.
    fn add_subscription(
        &self,
        conn: &Arc<dyn Connection>,
        subscription: &Subscription,
    ) -> Vec<SubscriptionError>;

    /// Remove the subscription with `subscription.id` from a connection.
    /// Removing an id that is not live is a no-op.
    fn remove_subscription(&self, conn: &Arc<dyn Connection>, subscription: &Subscription);

    /// Remove every subscription owned by a connection.
    fn remove_subscriptions(&self, conn: &Arc<dyn Connection>);
}
