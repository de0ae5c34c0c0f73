//! Observers supplied by the embedding application.
//!
//! Each slot is optional; an unset slot is a no-op.

use std::fmt;
use std::sync::Arc;

use crate::connection::Connection;
use crate::errors::SubscriptionError;
use crate::subscription::Subscription;

/// Called when a connection closes, before its subscriptions are removed.
pub type CloseObserver = Arc<dyn Fn(&Arc<dyn Connection>) + Send + Sync>;

/// Called after every start attempt with the full error list (possibly empty).
pub type NewSubscriptionObserver = Arc<dyn Fn(&Subscription, &[SubscriptionError]) + Send + Sync>;

/// Called after a stop request with the operation id.
pub type StopSubscriptionObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Application observers for connection and subscription events.
#[derive(Clone, Default)]
pub struct EventHandlers {
    /// Close observer.
    pub close: Option<CloseObserver>,
    /// New-subscription observer.
    pub new_subscription: Option<NewSubscriptionObserver>,
    /// Stop-subscription observer.
    pub stop_subscription: Option<StopSubscriptionObserver>,
}

impl EventHandlers {
    /// No observers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the close observer.
    #[must_use]
    pub fn on_close(mut self, f: impl Fn(&Arc<dyn Connection>) + Send + Sync + 'static) -> Self {
        self.close = Some(Arc::new(f));
        self
    }

    /// Set the new-subscription observer.
    #[must_use]
    pub fn on_new_subscription(
        mut self,
        f: impl Fn(&Subscription, &[SubscriptionError]) + Send + Sync + 'static,
    ) -> Self {
        self.new_subscription = Some(Arc::new(f));
        self
    }

    /// Set the stop-subscription observer.
    #[must_use]
    pub fn on_stop_subscription(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.stop_subscription = Some(Arc::new(f));
        self
    }

    /// Invoke the close observer, if set.
    pub fn notify_close(&self, conn: &Arc<dyn Connection>) {
        if let Some(f) = &self.close {
            f(conn);
        }
    }

    /// Invoke the new-subscription observer, if set.
    pub fn notify_new_subscription(
        &self,
        subscription: &Subscription,
        errors: &[SubscriptionError],
    ) {
        if let Some(f) = &self.new_subscription {
            f(subscription, errors);
        }
    }

    /// Invoke the stop-subscription observer, if set.
    pub fn notify_stop_subscription(&self, op_id: &str) {
        if let Some(f) = &self.stop_subscription {
            f(op_id);
        }
    }
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("close", &self.close.is_some())
            .field("new_subscription", &self.new_subscription.is_some())
            .field("stop_subscription", &self.stop_subscription.is_some())
            .finish()
    }
}
