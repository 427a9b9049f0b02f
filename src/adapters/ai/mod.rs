//! Dialogue Client Adapters.
//!
//! Implementations of the DialogueClient port.
//!
//! ## Available Adapters
//!
//! - `GeminiDialogueClient` - Google Gemini over HTTP streaming (SSE)
//! - `MockDialogueClient` - Configurable mock for testing and local runs

mod gemini_provider;
mod mock_provider;

pub use gemini_provider::{GeminiConfig, GeminiDialogueClient, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use mock_provider::{MockCall, MockDialogueClient, MockTurn};
