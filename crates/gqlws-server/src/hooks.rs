//! Hooks bridging connection events to the subscription manager.
//!
//! One [`SubscriptionHooks`] is shared by every connection a handler
//! accepts. Within one event the steps run strictly in order; hooks for
//! different connections may run concurrently.

use std::sync::Arc;

use gqlws_core::connection::display_user;
use gqlws_core::{
    Connection, ConnectionEvents, EventHandlers, SendDataFn, StartMessagePayload, Subscription,
    SubscriptionError, SubscriptionManager,
};
use metrics::counter;
use tracing::debug;

use crate::metrics::{
    SUBSCRIPTIONS_REJECTED_TOTAL, SUBSCRIPTIONS_STARTED_TOTAL, SUBSCRIPTIONS_STOPPED_TOTAL,
};
use crate::registry::ConnectionRegistry;

/// Close, start-operation and stop-operation hooks.
#[derive(Clone)]
pub struct SubscriptionHooks {
    manager: Arc<dyn SubscriptionManager>,
    registry: Arc<ConnectionRegistry>,
    handlers: EventHandlers,
}

impl SubscriptionHooks {
    /// Hooks over a manager, the handler's registry and the application observers.
    pub fn new(
        manager: Arc<dyn SubscriptionManager>,
        registry: Arc<ConnectionRegistry>,
        handlers: EventHandlers,
    ) -> Self {
        Self {
            manager,
            registry,
            handlers,
        }
    }
}

impl ConnectionEvents for SubscriptionHooks {
    /// Observer first, then subscription teardown, then deregistration, so
    /// the observer still sees the connection's subscriptions.
    fn on_close(&self, conn: &Arc<dyn Connection>) {
        debug!(
            conn_id = %conn.id(),
            user = %display_user(conn.user().as_ref()),
            "Closing connection"
        );
        self.handlers.notify_close(conn);
        self.manager.remove_subscriptions(conn);
        let _ = self.registry.remove(conn.id());
    }

    fn on_start_operation(
        &self,
        conn: &Arc<dyn Connection>,
        op_id: &str,
        payload: StartMessagePayload,
    ) -> Vec<SubscriptionError> {
        debug!(
            conn_id = %conn.id(),
            op_id,
            user = %display_user(conn.user().as_ref()),
            "Start operation"
        );

        let target = Arc::clone(conn);
        let target_op = op_id.to_owned();
        let send_data: SendDataFn = Arc::new(move |data| target.send_data(&target_op, data));
        let subscription = Subscription::new(op_id, payload, Arc::clone(conn), send_data);

        let errors = self.manager.add_subscription(conn, &subscription);
        if errors.is_empty() {
            counter!(SUBSCRIPTIONS_STARTED_TOTAL).increment(1);
        } else {
            counter!(SUBSCRIPTIONS_REJECTED_TOTAL).increment(1);
            debug!(conn_id = %conn.id(), op_id, errors = errors.len(), "start reported errors");
        }

        self.handlers.notify_new_subscription(&subscription, &errors);
        errors
    }

    fn on_stop_operation(&self, conn: &Arc<dyn Connection>, op_id: &str) {
        debug!(conn_id = %conn.id(), op_id, "Stop operation");
        self.manager
            .remove_subscription(conn, &Subscription::with_id(op_id));
        counter!(SUBSCRIPTIONS_STOPPED_TOTAL).increment(1);
        self.handlers.notify_stop_subscription(op_id);
    }
}

impl std::fmt::Debug for SubscriptionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHooks")
            .field("registry", &self.registry)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}
