//! Mock Dialogue Client for testing.
//!
//! Provides a configurable implementation of the DialogueClient port,
//! allowing tests and local runs to work without calling the real upstream.
//!
//! # Features
//!
//! - Scripted fragment sequences (consumed in order, one per turn)
//! - Start failures and mid-stream failures
//! - Dialogue-init failure
//! - Per-fragment delays for cancellation testing
//! - Call tracking for verification
//!
//! # Example
//!
//! ```ignore
//! let client = MockDialogueClient::new()
//!     .with_fragments(["Hel", "lo"])
//!     .with_fragment_delay(Duration::from_millis(10));
//!
//! let ctx = client.open_dialogue().await?;
//! let stream = client.send_turn(&ctx, "Hi").await?;
//! ```

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::ports::{
    ClientInfo, DialogueClient, DialogueContext, DialogueError, DialogueMessage, FinishReason,
    Fragment, FragmentStream, TokenUsage,
};

/// Mock dialogue client for testing.
#[derive(Debug, Clone)]
pub struct MockDialogueClient {
    /// Scripted turns (consumed in order).
    turns: Arc<Mutex<VecDeque<MockTurn>>>,
    /// Error returned by `open_dialogue`, if set.
    init_error: Option<DialogueError>,
    /// Delay before each fragment is yielded.
    fragment_delay: Duration,
    info: ClientInfo,
    opens: Arc<Mutex<usize>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

/// A scripted turn outcome.
#[derive(Debug, Clone)]
pub enum MockTurn {
    /// Yield these fragments, then a final empty fragment.
    Fragments(Vec<String>),
    /// Fail before the stream starts.
    StartError(DialogueError),
    /// Yield these fragments, then end the stream with an error.
    StreamError(Vec<String>, DialogueError),
}

/// One recorded `send_turn` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Turn text as submitted.
    pub text: String,
    /// Context history at the time of the call.
    pub history: Vec<DialogueMessage>,
}

impl Default for MockDialogueClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDialogueClient {
    /// Creates a new mock client with default settings.
    pub fn new() -> Self {
        Self {
            turns: Arc::new(Mutex::new(VecDeque::new())),
            init_error: None,
            fragment_delay: Duration::ZERO,
            info: ClientInfo::new("mock", "mock-model-1"),
            opens: Arc::new(Mutex::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queues a turn that yields exactly these fragments.
    pub fn with_fragments<I, S>(self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragments = fragments.into_iter().map(Into::into).collect();
        self.with_turn(MockTurn::Fragments(fragments))
    }

    /// Queues a turn that streams `content` word by word.
    pub fn with_response(self, content: impl Into<String>) -> Self {
        let content = content.into();
        self.with_turn(MockTurn::Fragments(split_words(&content)))
    }

    /// Queues a turn that fails to start.
    pub fn with_send_error(self, error: DialogueError) -> Self {
        self.with_turn(MockTurn::StartError(error))
    }

    /// Queues a turn that yields `fragments` and then fails.
    pub fn with_stream_error<I, S>(self, fragments: I, error: DialogueError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragments = fragments.into_iter().map(Into::into).collect();
        self.with_turn(MockTurn::StreamError(fragments, error))
    }

    /// Queues an arbitrary scripted turn.
    pub fn with_turn(self, turn: MockTurn) -> Self {
        self.turns.lock().unwrap().push_back(turn);
        self
    }

    /// Makes every `open_dialogue` call fail.
    pub fn with_init_error(mut self, error: DialogueError) -> Self {
        self.init_error = Some(error);
        self
    }

    /// Sets the delay before each fragment.
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = delay;
        self
    }

    /// Number of `open_dialogue` calls.
    pub fn open_count(&self) -> usize {
        *self.opens.lock().unwrap()
    }

    /// Number of `send_turn` calls.
    pub fn send_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// All recorded `send_turn` calls.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next_turn(&self) -> MockTurn {
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockTurn::Fragments(split_words("Mock response")))
    }
}

fn split_words(content: &str) -> Vec<String> {
    let words: Vec<&str> = content.split_whitespace().collect();
    let last = words.len().saturating_sub(1);
    words
        .iter()
        .enumerate()
        .map(|(i, w)| if i == last { w.to_string() } else { format!("{} ", w) })
        .collect()
}

#[async_trait]
impl DialogueClient for MockDialogueClient {
    async fn open_dialogue(&self) -> Result<DialogueContext, DialogueError> {
        *self.opens.lock().unwrap() += 1;

        match &self.init_error {
            Some(err) => Err(err.clone()),
            None => Ok(DialogueContext::new(self.info.model.clone())),
        }
    }

    async fn send_turn(
        &self,
        ctx: &DialogueContext,
        text: &str,
    ) -> Result<FragmentStream, DialogueError> {
        self.calls.lock().unwrap().push(MockCall {
            text: text.to_string(),
            history: ctx.history().to_vec(),
        });

        let items: Vec<Result<Fragment, DialogueError>> = match self.next_turn() {
            MockTurn::StartError(err) => return Err(err),
            MockTurn::Fragments(fragments) => {
                let usage = TokenUsage::new(text.len() as u32, fragments.len() as u32);
                fragments
                    .into_iter()
                    .map(|f| Ok(Fragment::text(f)))
                    .chain(std::iter::once(Ok(Fragment::text("")
                        .with_finish_reason(FinishReason::Stop)
                        .with_usage(usage))))
                    .collect()
            }
            MockTurn::StreamError(fragments, err) => fragments
                .into_iter()
                .map(|f| Ok(Fragment::text(f)))
                .chain(std::iter::once(Err(err)))
                .collect(),
        };

        let delay = self.fragment_delay;
        if delay.is_zero() {
            return Ok(Box::pin(stream::iter(items)));
        }

        let delayed = stream::iter(items).then(move |item| async move {
            sleep(delay).await;
            item
        });
        Ok(Box::pin(delayed))
    }

    fn client_info(&self) -> ClientInfo {
        self.info.clone()
    }
}
