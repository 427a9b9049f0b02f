//! WebSocket adapters for the chat gateway.
//!
//! # Architecture
//!
//! ```text
//!  client ──frames──▶ handler (reader loop) ──▶ ConnectionSession ──▶ DialogueClient
//!    ▲                                                 │
//!    └──── writer task ◀── ConnectionHandle ◀──events──┘
//! ```
//!
//! # Components
//!
//! - [`connection`] - Per-connection writer task and `EventSink` implementation
//! - [`registry`] - Live session tracking
//! - [`handler`] - Axum WebSocket upgrade handler and router

pub mod connection;
pub mod handler;
pub mod registry;

pub use connection::ConnectionHandle;
pub use handler::{
    api_key_param, chat_ws_handler, gateway_router, ConnectionLimits, GatewayState, API_KEY_PARAM,
};
pub use registry::SessionRegistry;
