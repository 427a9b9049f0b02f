//! Dialogue Client Port - Interface to the upstream generative-language service.
//!
//! Two operations cover everything a connection session needs:
//!
//! - `open_dialogue` creates an independent conversational context
//! - `send_turn` submits one user turn and returns a lazy stream of fragments
//!
//! # Design
//!
//! - The client holds no per-dialogue state; history lives in [`DialogueContext`],
//!   which is owned by exactly one session and is not `Clone`
//! - A turn that cannot start fails with an `Err` from `send_turn`; a turn that
//!   fails after producing output ends its stream with an `Err` item, so callers
//!   can tell "never started" from "partial output, then failed"
//! - Dropping a context is the release; there is no close call
//!
//! # Example
//!
//! ```ignore
//! let mut ctx = client.open_dialogue().await?;
//! let mut stream = client.send_turn(&ctx, "Hello").await?;
//! let mut full = String::new();
//! while let Some(fragment) = stream.next().await {
//!     full.push_str(&fragment?.text);
//! }
//! ctx.record_exchange("Hello", full);
//! ```

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::domain::foundation::DialogueId;

/// Lazy, finite, non-restartable sequence of response fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, DialogueError>> + Send>>;

/// Port for the upstream generative-dialogue capability.
#[async_trait]
pub trait DialogueClient: Send + Sync {
    /// Initializes a new conversational context.
    ///
    /// Fails with [`DialogueError::Init`] when the upstream service is
    /// unreachable or misconfigured (for example, a missing credential).
    async fn open_dialogue(&self) -> Result<DialogueContext, DialogueError>;

    /// Submits one turn and returns the incremental response.
    ///
    /// The returned stream does not borrow `ctx`; the caller records the
    /// exchange into the context once the stream has completed.
    async fn send_turn(
        &self,
        ctx: &DialogueContext,
        text: &str,
    ) -> Result<FragmentStream, DialogueError>;

    /// Client name and model, for logging and health output.
    fn client_info(&self) -> ClientInfo;
}

/// Who authored a message in the dialogue history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogueRole {
    /// The connected client.
    User,
    /// The upstream model.
    Model,
}

/// One message in the dialogue history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueMessage {
    pub role: DialogueRole,
    pub text: String,
}

impl DialogueMessage {
    /// Creates a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: DialogueRole::User,
            text: text.into(),
        }
    }

    /// Creates a model message.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: DialogueRole::Model,
            text: text.into(),
        }
    }
}

/// Opaque handle to one upstream conversation.
///
/// Owned exclusively by a single connection session. Deliberately not `Clone`.
#[derive(Debug)]
pub struct DialogueContext {
    id: DialogueId,
    model: String,
    history: Vec<DialogueMessage>,
}

impl DialogueContext {
    /// Creates an empty context bound to `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: DialogueId::new(),
            model: model.into(),
            history: Vec::new(),
        }
    }

    /// Context identifier.
    pub fn id(&self) -> DialogueId {
        self.id
    }

    /// Model the context was opened against.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Completed exchanges, oldest first.
    pub fn history(&self) -> &[DialogueMessage] {
        &self.history
    }

    /// Appends a completed exchange to the history.
    pub fn record_exchange(&mut self, user_text: impl Into<String>, model_text: impl Into<String>) {
        self.history.push(DialogueMessage::user(user_text));
        self.history.push(DialogueMessage::model(model_text));
    }
}

/// Reason the upstream stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop (end of response).
    Stop,
    /// Hit the output token limit.
    Length,
    /// Anything else the upstream reported.
    Other,
}

/// Token usage reported by the upstream for one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Creates usage with a computed total.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// One incremental piece of a streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// New text in this fragment (may be empty on the final fragment).
    pub text: String,
    /// Present on the last fragment the upstream sends.
    pub finish_reason: Option<FinishReason>,
    /// Present when the upstream reported usage.
    pub usage: Option<TokenUsage>,
}

impl Fragment {
    /// Creates a text fragment.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: None,
            usage: None,
        }
    }

    /// Marks this fragment as the last one.
    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    /// Attaches usage information.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Client name and model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub model: String,
}

impl ClientInfo {
    /// Creates client info.
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
        }
    }
}

/// Dialogue client errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DialogueError {
    /// Context could not be created.
    #[error("dialogue init failed: {0}")]
    Init(String),

    /// Turn could not be started.
    #[error("send failed: {0}")]
    Send(String),

    /// Upstream reported an error after the stream started.
    #[error("stream failed: {0}")]
    Stream(String),

    /// Rate limited by the upstream.
    #[error("rate limited by upstream")]
    RateLimited,

    /// Upstream rejected the credential.
    #[error("upstream authentication failed")]
    AuthenticationFailed,

    /// Prompt or response was blocked by the upstream's safety filter.
    #[error("blocked by upstream: {0}")]
    Blocked(String),

    /// Transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// Upstream payload could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// Request timed out.
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

impl DialogueError {
    /// Creates an init error.
    pub fn init(message: impl Into<String>) -> Self {
        Self::Init(message.into())
    }

    /// Creates a send error.
    pub fn send(message: impl Into<String>) -> Self {
        Self::Send(message.into())
    }

    /// Creates a mid-stream error.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}
