//! Wire protocol between the gateway and a connected client.
//!
//! - Client → Server: `{ "message": "<text>" }` (other fields ignored)
//! - Server → Client: `connection`, `typing`, `chunk`, `response`, `error`

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

// ============================================
// Client → Server
// ============================================

/// Raw inbound frame as sent by the client.
#[derive(Debug, Clone, Deserialize)]
struct ClientFrame {
    message: String,
}

/// A validated unit of user input: trimmed, non-empty text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundTurn {
    text: String,
}

impl InboundTurn {
    /// Parses and validates a raw text frame.
    ///
    /// The frame must be a JSON object whose `message` field is a string that
    /// is non-empty after trimming whitespace.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let frame: ClientFrame = serde_json::from_str(raw)
            .map_err(|e| ValidationError::invalid_format("message", e.to_string()))?;
        Self::new(frame.message)
    }

    /// Builds a turn from already-extracted text.
    pub fn new(text: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = text.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::empty_field("message"));
        }
        Ok(Self {
            text: trimmed.to_string(),
        })
    }

    /// The trimmed text that is sent upstream.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consumes the turn, returning its text.
    pub fn into_text(self) -> String {
        self.text
    }
}

// ============================================
// Server → Client
// ============================================

/// Every message kind the gateway sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Session established.
    Connection {
        status: ConnectionStatus,
        message: String,
    },
    /// The model has started working on a turn.
    Typing { status: TypingStatus },
    /// One streamed fragment of the response.
    Chunk { content: String },
    /// The full response for a turn.
    Response { content: String },
    /// Something went wrong; the message is client-facing.
    Error { message: String },
}

/// Status carried by a `connection` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
}

/// Status carried by a `typing` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypingStatus {
    Start,
}

impl OutboundEvent {
    /// Sent once the dialogue context is ready.
    pub fn connected() -> Self {
        OutboundEvent::Connection {
            status: ConnectionStatus::Connected,
            message: "Chat session initialized".to_string(),
        }
    }

    /// Sent when a turn has been admitted.
    pub fn typing_start() -> Self {
        OutboundEvent::Typing {
            status: TypingStatus::Start,
        }
    }

    /// Wraps one upstream fragment.
    pub fn chunk(content: impl Into<String>) -> Self {
        OutboundEvent::Chunk {
            content: content.into(),
        }
    }

    /// Wraps the accumulated response of a turn.
    pub fn response(content: impl Into<String>) -> Self {
        OutboundEvent::Response {
            content: content.into(),
        }
    }

    /// Wraps a client-facing error message.
    pub fn error(message: impl Into<String>) -> Self {
        OutboundEvent::Error {
            message: message.into(),
        }
    }

    /// The `type` tag this event serializes with.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::Connection { .. } => "connection",
            OutboundEvent::Typing { .. } => "typing",
            OutboundEvent::Chunk { .. } => "chunk",
            OutboundEvent::Response { .. } => "response",
            OutboundEvent::Error { .. } => "error",
        }
    }

    /// Serializes the event to a single JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn to_value(event: &OutboundEvent) -> Value {
        serde_json::from_str(&event.to_json().unwrap()).unwrap()
    }

    #[test]
    fn parses_message_field() {
        let turn = InboundTurn::parse(r#"{"message":"Hello"}"#).unwrap();
        assert_eq!(turn.text(), "Hello");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let turn = InboundTurn::parse(r#"{"message":"  Hello there \n"}"#).unwrap();
        assert_eq!(turn.text(), "Hello there");
    }

    #[test]
    fn ignores_unknown_fields() {
        let turn = InboundTurn::parse(r#"{"message":"hi","extra":42}"#).unwrap();
        assert_eq!(turn.into_text(), "hi");
    }

    #[test]
    fn rejects_whitespace_only_message() {
        let err = InboundTurn::parse(r#"{"message":"   "}"#).unwrap_err();
        assert_eq!(err, ValidationError::empty_field("message"));
    }

    #[test]
    fn rejects_missing_message_field() {
        assert!(InboundTurn::parse(r#"{"text":"hi"}"#).is_err());
    }

    #[test]
    fn rejects_non_string_message() {
        assert!(InboundTurn::parse(r#"{"message":42}"#).is_err());
        assert!(InboundTurn::parse(r#"{"message":null}"#).is_err());
    }

    #[test]
    fn rejects_non_json() {
        assert!(InboundTurn::parse("Hello").is_err());
        assert!(InboundTurn::parse("").is_err());
    }

    #[test]
    fn connected_event_matches_wire_schema() {
        assert_eq!(
            to_value(&OutboundEvent::connected()),
            json!({"type": "connection", "status": "connected", "message": "Chat session initialized"})
        );
    }

    #[test]
    fn typing_event_matches_wire_schema() {
        assert_eq!(
            to_value(&OutboundEvent::typing_start()),
            json!({"type": "typing", "status": "start"})
        );
    }

    #[test]
    fn chunk_response_and_error_match_wire_schema() {
        assert_eq!(
            to_value(&OutboundEvent::chunk("Hel")),
            json!({"type": "chunk", "content": "Hel"})
        );
        assert_eq!(
            to_value(&OutboundEvent::response("Hello")),
            json!({"type": "response", "content": "Hello"})
        );
        assert_eq!(
            to_value(&OutboundEvent::error("Invalid message format")),
            json!({"type": "error", "message": "Invalid message format"})
        );
    }

    #[test]
    fn kind_matches_serialized_tag() {
        for event in [
            OutboundEvent::connected(),
            OutboundEvent::typing_start(),
            OutboundEvent::chunk("a"),
            OutboundEvent::response("a"),
            OutboundEvent::error("a"),
        ] {
            assert_eq!(to_value(&event)["type"], event.kind());
        }
    }
}
