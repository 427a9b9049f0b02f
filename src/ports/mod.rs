//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the gateway core and the outside world. Adapters implement these ports.
//!
//! - `DialogueClient` - upstream generative-dialogue capability
//! - `EventSink` - outbound channel to one connected client

mod dialogue_client;
mod event_sink;

pub use dialogue_client::{
    ClientInfo, DialogueClient, DialogueContext, DialogueError, DialogueMessage, DialogueRole,
    FinishReason, Fragment, FragmentStream, TokenUsage,
};
pub use event_sink::EventSink;
