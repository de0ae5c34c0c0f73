//! Error types.
//!
//! - [`SubscriptionError`]: one problem with a start request. Starting an
//!   operation reports a `Vec` of these so every problem reaches the client
//!   at once.
//! - [`AuthError`]: returned by the configured authenticate function.
//! - [`ProtocolError`]: a frame that could not be turned into a client message.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// A single problem reported while starting an operation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// The start frame carried no operation id.
    #[error("operation id must not be empty")]
    MissingOperationId,

    /// The operation id is already live on the same connection.
    #[error("operation id `{0}` is already in use on this connection")]
    DuplicateOperationId(String),

    /// The query text was empty.
    #[error("query must not be empty")]
    EmptyQuery,

    /// The start payload could not be decoded.
    #[error("invalid start payload: {0}")]
    InvalidPayload(String),

    /// Validation failure reported by an execution engine.
    #[error("{0}")]
    Validation(String),

    /// The subscription manager refused the operation.
    #[error("subscription rejected: {0}")]
    Rejected(String),
}

impl SubscriptionError {
    /// Build a validation error from any message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Serialized as `{"message": "..."}`, the shape graphql-ws clients expect
/// inside an `error` frame payload.
impl Serialize for SubscriptionError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("message", &self.to_string())?;
        map.end()
    }
}

/// Authentication failure.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No token was presented but one is required.
    #[error("missing auth token")]
    MissingToken,

    /// The token was presented but is not valid.
    #[error("invalid auth token: {0}")]
    InvalidToken(String),
}

/// A client frame that could not be decoded into a known message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not a JSON operation message.
    #[error("invalid message: {0}")]
    InvalidFrame(#[from] serde_json::Error),

    /// A `start` or `stop` frame without an id.
    #[error("Received {kind} message without ID")]
    MissingId {
        /// Message type that required an id.
        kind: &'static str,
    },

    /// The payload of a frame had the wrong shape.
    #[error("Invalid {kind} payload: {message}")]
    InvalidPayload {
        /// Message type whose payload failed to decode.
        kind: &'static str,
        /// Operation id, when the frame carried one.
        id: Option<String>,
        /// Decoder message.
        message: String,
    },

    /// A message type this server does not handle.
    #[error("Unhandled message type: {0}")]
    UnknownType(String),
}

impl ProtocolError {
    /// Operation id the error relates to, if any.
    pub fn operation_id(&self) -> Option<&str> {
        match self {
            Self::InvalidPayload { id, .. } => id.as_deref(),
            _ => None,
        }
    }
}
