//! In-memory subscription bookkeeping.
//!
//! Stores bound subscriptions keyed by connection and operation id so an
//! external execution engine can push results through [`publish`] and
//! [`publish_to`]. No query execution happens here.
//!
//! [`publish`]: InMemorySubscriptionManager::publish
//! [`publish_to`]: InMemorySubscriptionManager::publish_to

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use dashmap::DashMap;
use gqlws_core::{
    Connection, ConnectionId, DataMessagePayload, Subscription, SubscriptionError,
    SubscriptionManager,
};
use tracing::debug;

/// Thread-safe [`SubscriptionManager`] holding subscriptions in memory.
#[derive(Default)]
pub struct InMemorySubscriptionManager {
    /// connection id → operation id → subscription
    connections: DashMap<ConnectionId, HashMap<String, Subscription>>,
}

impl InMemorySubscriptionManager {
    /// Empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a result to every live subscription. Returns how many received it.
    pub fn publish(&self, payload: &DataMessagePayload) -> usize {
        let targets: Vec<Subscription> = self
            .connections
            .iter()
            .flat_map(|entry| entry.value().values().cloned().collect::<Vec<_>>())
            .collect();
        for subscription in &targets {
            subscription.send_data(payload.clone());
        }
        targets.len()
    }

    /// Push a result to one operation. Returns whether it exists.
    pub fn publish_to(
        &self,
        connection_id: &ConnectionId,
        op_id: &str,
        payload: DataMessagePayload,
    ) -> bool {
        let target = self
            .connections
            .get(connection_id)
            .and_then(|subs| subs.get(op_id).cloned());
        match target {
            Some(subscription) => {
                subscription.send_data(payload);
                true
            }
            None => false,
        }
    }

    /// Whether this operation is live on the connection.
    pub fn contains(&self, connection_id: &ConnectionId, op_id: &str) -> bool {
        self.connections
            .get(connection_id)
            .is_some_and(|subs| subs.contains_key(op_id))
    }

    /// Total live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.connections.iter().map(|e| e.value().len()).sum()
    }

    /// Connections holding at least one subscription.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl SubscriptionManager for InMemorySubscriptionManager {
    fn add_subscription(
        &self,
        conn: &Arc<dyn Connection>,
        subscription: &Subscription,
    ) -> Vec<SubscriptionError> {
        let mut errors = Vec::new();
        if subscription.id.is_empty() {
            errors.push(SubscriptionError::MissingOperationId);
        }
        if subscription.query.trim().is_empty() {
            errors.push(SubscriptionError::EmptyQuery);
        }

        let mut subs = self.connections.entry(conn.id().clone()).or_default();
        match subs.entry(subscription.id.clone()) {
            Entry::Occupied(_) => {
                errors.push(SubscriptionError::DuplicateOperationId(
                    subscription.id.clone(),
                ));
            }
            Entry::Vacant(slot) if errors.is_empty() => {
                let _ = slot.insert(subscription.clone());
                debug!(conn_id = %conn.id(), op_id = %subscription.id, "subscription added");
            }
            Entry::Vacant(_) => {}
        }
        let now_empty = subs.is_empty();
        drop(subs);
        if now_empty {
            let _ = self
                .connections
                .remove_if(conn.id(), |_, subs| subs.is_empty());
        }
        errors
    }

    fn remove_subscription(&self, conn: &Arc<dyn Connection>, subscription: &Subscription) {
        let removed = self
            .connections
            .get_mut(conn.id())
            .and_then(|mut subs| subs.remove(&subscription.id));
        if removed.is_some() {
            debug!(conn_id = %conn.id(), op_id = %subscription.id, "subscription removed");
        }
        let _ = self
            .connections
            .remove_if(conn.id(), |_, subs| subs.is_empty());
    }

    fn remove_subscriptions(&self, conn: &Arc<dyn Connection>) {
        if let Some((_, subs)) = self.connections.remove(conn.id()) {
            debug!(conn_id = %conn.id(), count = subs.len(), "subscriptions cleared");
        }
    }
}

impl std::fmt::Debug for InMemorySubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySubscriptionManager")
            .field("connections", &self.connection_count())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}
