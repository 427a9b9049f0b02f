//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the gateway core to external systems:
//! - `ai` - Dialogue clients (Gemini, mock)
//! - `websocket` - Client connections, session registry, upgrade handler
//! - `http` - Banner, health check, CORS and request tracing

pub mod ai;
pub mod http;
pub mod websocket;

pub use ai::{GeminiConfig, GeminiDialogueClient, MockDialogueClient};
pub use http::app_router;
pub use websocket::{ConnectionHandle, ConnectionLimits, GatewayState, SessionRegistry};
