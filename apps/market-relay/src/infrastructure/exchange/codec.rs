//! Inbound Frame Codec
//!
//! Shared decoding result for exchange text frames. Each protocol turns one
//! frame into exactly one [`InboundMessage`]; a frame that cannot be decoded
//! yields a [`CodecError`] and is dropped by the connector.

use serde_json::Value;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is valid JSON of an unexpected shape.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    /// Event frame without an event-type discriminator.
    #[error("missing event type discriminator")]
    MissingEventType,
}

/// Error reported by the exchange inside a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    /// Error code, when the exchange sends one.
    pub code: Option<i64>,
    /// Short error message.
    pub message: String,
    /// Longer explanation, when the exchange sends one.
    pub description: Option<String>,
}

impl ProtocolError {
    /// Build from an exchange error object, reading `message`/`msg`, `code`
    /// and `description`.
    #[must_use]
    pub fn from_value(error: &Value) -> Self {
        let message = error
            .get("message")
            .or_else(|| error.get("msg"))
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string);

        Self {
            code: error.get("code").and_then(Value::as_i64),
            message,
            description: error
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

/// A decoded exchange frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Market data event carrying its raw record.
    Event {
        /// Event type discriminator.
        event_type: String,
        /// Raw record to normalize.
        record: Value,
    },
    /// Exchange-reported error.
    Error(ProtocolError),
    /// Acknowledgement of a request we sent.
    Ack {
        /// Request id echoed by the exchange.
        id: Option<i64>,
    },
}

/// Parse a text frame into a JSON object.
///
/// # Errors
///
/// Returns an error if the text is not JSON or not a JSON object.
pub fn parse_object(text: &str) -> Result<serde_json::Map<String, Value>, CodecError> {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        return Err(CodecError::InvalidFormat(format!(
            "expected JSON object, got: {}...",
            trimmed.chars().take(50).collect::<String>()
        )));
    }

    match serde_json::from_str(trimmed)? {
        Value::Object(object) => Ok(object),
        other => Err(CodecError::InvalidFormat(format!(
            "expected JSON object, got {other}"
        ))),
    }
}
