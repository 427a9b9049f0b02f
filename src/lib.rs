//! Otterly Gateway - authenticated WebSocket front door for Gemini chat.
//!
//! Each client connection gets its own session: the API key is checked before
//! anything else is allocated, a dialogue is opened upstream, and every turn's
//! response is relayed fragment by fragment as it streams in.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
