//! Gateway error taxonomy and WebSocket close codes.

use thiserror::Error;

use crate::domain::foundation::ValidationError;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Endpoint going away (idle timeout, server shutdown).
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Policy violation: authentication failure or fatal dialogue-init failure.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Everything that can go wrong inside a connection session.
///
/// Only [`GatewayError::Auth`] and [`GatewayError::UpstreamInit`] are fatal to
/// the connection; the rest are reported to the client as `error` events and
/// the session stays usable.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Credential absent or mismatched.
    #[error("authentication failed")]
    Auth,

    /// Dialogue context could not be opened.
    #[error("failed to open dialogue: {0}")]
    UpstreamInit(String),

    /// Inbound frame malformed or empty.
    #[error("invalid inbound message: {0}")]
    Validation(#[from] ValidationError),

    /// Turn could not be started or failed mid-stream.
    #[error("failed to send turn: {0}")]
    UpstreamSend(String),

    /// A turn arrived while the previous one was still streaming.
    #[error("turn rejected: previous turn still streaming")]
    Busy,

    /// A turn arrived before the session was ready or after it closed.
    #[error("session not initialized")]
    NotInitialized,
}

impl GatewayError {
    /// Returns true if this error terminates the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Auth | GatewayError::UpstreamInit(_))
    }

    /// Message shown to the client in an `error` event.
    pub fn client_message(&self) -> &'static str {
        match self {
            GatewayError::Auth => "Invalid API Key",
            GatewayError::UpstreamInit(_) => "Failed to create chat session",
            GatewayError::Validation(_) => "Invalid message format",
            GatewayError::UpstreamSend(_) => "Failed to send message",
            GatewayError::Busy => "busy, previous turn still streaming",
            GatewayError::NotInitialized => "Chat session not initialized",
        }
    }

    /// Close code and reason for fatal errors.
    pub fn close_frame(&self) -> Option<(u16, &'static str)> {
        if self.is_fatal() {
            Some((CLOSE_POLICY_VIOLATION, self.client_message()))
        } else {
            None
        }
    }
}
