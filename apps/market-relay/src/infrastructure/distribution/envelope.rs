//! Distribution Envelopes
//!
//! Clients send `{method, params?, result?, error?, id?}`. The server
//! broadcasts `{method, params, id}` and unicasts the bare payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::registry::{ClientId, ConnectionId};

/// Error object carried by a client message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcError {
    /// Error code, if any.
    #[serde(default)]
    pub code: Option<i64>,
    /// Short message.
    #[serde(default)]
    pub message: String,
    /// Longer explanation.
    #[serde(default)]
    pub description: Option<String>,
}

/// Message received from a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientEnvelope {
    /// Routing key.
    #[serde(default)]
    pub method: Option<String>,
    /// Request parameters.
    #[serde(default)]
    pub params: Option<Value>,
    /// Response body.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error reported by the client.
    #[serde(default)]
    pub error: Option<RpcError>,
    /// Correlation id chosen by the client.
    #[serde(default)]
    pub id: Option<Value>,
}

impl ClientEnvelope {
    /// Routed payload: `result` when present, otherwise `params`.
    #[must_use]
    pub fn into_payload(self) -> Value {
        self.result.or(self.params).unwrap_or(Value::Null)
    }
}

/// Message broadcast to clients.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEnvelope<'a> {
    /// Routing key.
    pub method: &'a str,
    /// Payload.
    pub params: &'a Value,
    /// Strictly increasing millisecond timestamp.
    pub id: i64,
}

/// Client message routed onto the server's request bus.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRequest {
    /// Transport the message arrived on.
    pub connection_id: ConnectionId,
    /// Client that sent it.
    pub client_id: ClientId,
    /// Routing key.
    pub method: String,
    /// `result` or `params` of the envelope.
    pub payload: Value,
    /// Client correlation id.
    pub id: Option<Value>,
}
