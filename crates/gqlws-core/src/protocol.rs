//! graphql-ws wire format.
//!
//! Every frame is a JSON object `{"id"?, "type", "payload"?}`. Client frames
//! are decoded into [`ClientMessage`]; server frames are built with the
//! constructors on [`OperationMessage`].

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::{ProtocolError, SubscriptionError};

/// Sub-protocol token clients must offer in `Sec-WebSocket-Protocol`.
pub const GRAPHQL_WS_PROTOCOL: &str = "graphql-ws";

/// Message type strings.
pub mod message_type {
    /// Client → server: begin the session, optionally carrying an auth token.
    pub const CONNECTION_INIT: &str = "connection_init";
    /// Server → client: init accepted.
    pub const CONNECTION_ACK: &str = "connection_ack";
    /// Server → client: init rejected.
    pub const CONNECTION_ERROR: &str = "connection_error";
    /// Client → server: close the connection.
    pub const CONNECTION_TERMINATE: &str = "connection_terminate";
    /// Server → client: keep-alive.
    pub const KEEP_ALIVE: &str = "ka";
    /// Client → server: start an operation.
    pub const START: &str = "start";
    /// Client → server: stop an operation.
    pub const STOP: &str = "stop";
    /// Server → client: operation result.
    pub const DATA: &str = "data";
    /// Server → client: operation or connection error.
    pub const ERROR: &str = "error";
    /// Server → client: operation finished.
    pub const COMPLETE: &str = "complete";
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A raw frame as it appears on the socket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationMessage {
    /// Operation id; absent on connection-level frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Message type, one of [`message_type`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl OperationMessage {
    fn new(kind: &str, id: Option<&str>, payload: Option<Value>) -> Self {
        Self {
            id: id.map(str::to_owned),
            kind: kind.to_owned(),
            payload,
        }
    }

    /// `connection_ack`.
    pub fn ack() -> Self {
        Self::new(message_type::CONNECTION_ACK, None, None)
    }

    /// `connection_error` with a message payload.
    pub fn connection_error(message: &str) -> Self {
        Self::new(
            message_type::CONNECTION_ERROR,
            None,
            Some(Value::String(message.to_owned())),
        )
    }

    /// `ka`.
    pub fn keep_alive() -> Self {
        Self::new(message_type::KEEP_ALIVE, None, None)
    }

    /// `data` for one operation.
    pub fn data(id: &str, payload: &DataMessagePayload) -> Self {
        Self::new(
            message_type::DATA,
            Some(id),
            serde_json::to_value(payload).ok(),
        )
    }

    /// `error` not tied to an operation.
    pub fn error(message: &str) -> Self {
        Self::new(
            message_type::ERROR,
            None,
            Some(Value::String(message.to_owned())),
        )
    }

    /// `error` carrying every problem reported for one operation.
    pub fn operation_errors(id: &str, errors: &[SubscriptionError]) -> Self {
        Self::new(
            message_type::ERROR,
            Some(id),
            serde_json::to_value(errors).ok(),
        )
    }

    /// `complete` for one operation.
    pub fn complete(id: &str) -> Self {
        Self::new(message_type::COMPLETE, Some(id), None)
    }
}

/// Payload of `connection_init`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct InitMessagePayload {
    /// Token handed to the authenticate function.
    #[serde(default, rename = "authToken")]
    pub auth_token: Option<String>,
}

/// Payload of `start`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StartMessagePayload {
    /// Query document text.
    #[serde(default)]
    pub query: String,
    /// Query variables.
    #[serde(default, deserialize_with = "null_as_default")]
    pub variables: HashMap<String, Value>,
    /// Operation to run when the document holds several.
    #[serde(
        default,
        rename = "operationName",
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_name: Option<String>,
}

/// Payload of `data`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataMessagePayload {
    /// Result data.
    #[serde(default)]
    pub data: Option<Value>,
    /// Execution errors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Value>,
}

impl DataMessagePayload {
    /// Payload with data and no errors.
    pub fn with_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }
}

/// A decoded client frame.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    /// `connection_init`.
    Init(InitMessagePayload),
    /// `start`.
    Start {
        /// Operation id.
        id: String,
        /// Start payload.
        payload: StartMessagePayload,
    },
    /// `stop`.
    Stop {
        /// Operation id.
        id: String,
    },
    /// `connection_terminate`.
    Terminate,
}

impl ClientMessage {
    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let frame: OperationMessage = serde_json::from_str(text)?;
        Self::from_frame(frame)
    }

    /// Decode an already-parsed frame.
    pub fn from_frame(frame: OperationMessage) -> Result<Self, ProtocolError> {
        let id = frame.id.filter(|id| !id.is_empty());
        match frame.kind.as_str() {
            message_type::CONNECTION_INIT => {
                let payload = match frame.payload {
                    Some(Value::Null) | None => InitMessagePayload::default(),
                    Some(v) => serde_json::from_value(v).map_err(|e| {
                        ProtocolError::InvalidPayload {
                            kind: message_type::CONNECTION_INIT,
                            id: None,
                            message: e.to_string(),
                        }
                    })?,
                };
                Ok(Self::Init(payload))
            }
            message_type::START => {
                let id = id.ok_or(ProtocolError::MissingId {
                    kind: message_type::START,
                })?;
                let payload = serde_json::from_value(frame.payload.unwrap_or(Value::Null))
                    .map_err(|e| ProtocolError::InvalidPayload {
                        kind: message_type::START,
                        id: Some(id.clone()),
                        message: e.to_string(),
                    })?;
                Ok(Self::Start { id, payload })
            }
            message_type::STOP => {
                let id = id.ok_or(ProtocolError::MissingId {
                    kind: message_type::STOP,
                })?;
                Ok(Self::Stop { id })
            }
            message_type::CONNECTION_TERMINATE => Ok(Self::Terminate),
            other => Err(ProtocolError::UnknownType(other.to_owned())),
        }
    }
}
