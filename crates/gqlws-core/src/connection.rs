//! The connection contract.
//!
//! A [`Connection`] is one negotiated socket. Implementations own the read
//! loop and framing; they report lifecycle and operation events through a
//! [`ConnectionEvents`] hook set handed to them at construction time.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{AuthError, SubscriptionError};
use crate::ids::ConnectionId;
use crate::protocol::{DataMessagePayload, StartMessagePayload};

/// Identity established by the authenticate function.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Stable user identifier.
    pub id: String,
    /// Application-defined claims.
    #[serde(default)]
    pub claims: Value,
}

impl User {
    /// User with an id and no claims.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            claims: Value::Null,
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Resolves the token from `connection_init` into a [`User`].
///
/// The token is empty when the client sent none.
pub type AuthenticateFn = Arc<dyn Fn(&str) -> Result<User, AuthError> + Send + Sync>;

/// One live socket, as seen by the orchestrator and subscription managers.
pub trait Connection: Send + Sync {
    /// Stable identity.
    fn id(&self) -> &ConnectionId;

    /// Authenticated user, if `connection_init` succeeded with one.
    fn user(&self) -> Option<User>;

    /// Push a result for one operation to the peer.
    fn send_data(&self, op_id: &str, payload: DataMessagePayload);

    /// Push a connection-level error to the peer.
    fn send_error(&self, message: &str);

    /// Tell the peer an operation has finished.
    fn send_complete(&self, op_id: &str);

    /// Close the socket. Idempotent.
    fn close(&self);
}

impl fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", self.id())
            .field("user", &self.user())
            .finish()
    }
}

/// Formats an optional user for log fields.
pub fn display_user(user: Option<&User>) -> String {
    user.map_or_else(|| "anonymous".to_owned(), ToString::to_string)
}

/// Hooks a connection invokes from its own read loop.
///
/// Every method has a no-op default, so an implementation only overrides
/// the events it cares about.
pub trait ConnectionEvents: Send + Sync {
    /// The connection closed, for any reason. Called at most once.
    fn on_close(&self, _conn: &Arc<dyn Connection>) {}

    /// The peer asked to start an operation. The returned list (possibly
    /// empty) is relayed to the peer as an `error` frame when non-empty.
    fn on_start_operation(
        &self,
        _conn: &Arc<dyn Connection>,
        _op_id: &str,
        _payload: StartMessagePayload,
    ) -> Vec<SubscriptionError> {
        Vec::new()
    }

    /// The peer asked to stop an operation.
    fn on_stop_operation(&self, _conn: &Arc<dyn Connection>, _op_id: &str) {}
}
