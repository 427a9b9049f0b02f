//! ConnectionSession - per-connection orchestration of one upstream dialogue.
//!
//! Owns the session state machine and the dialogue context for exactly one
//! connection. The transport drives it through three entry points:
//!
//! - `on_open` authenticates and opens the dialogue
//! - `begin_turn` / `run_turn` (or `on_message`) handle one inbound turn
//! - `on_close` tears everything down
//!
//! Turns are admitted one at a time. While a turn is streaming the context is
//! moved out of the session into the [`PendingTurn`], so a concurrent turn has
//! nothing to run against and is rejected as busy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::Mutex;

use crate::domain::foundation::{ConnectionId, StateMachine, Timestamp};
use crate::domain::gateway::{
    CredentialValidator, GatewayError, InboundTurn, OutboundEvent, SessionState,
};
use crate::ports::{DialogueClient, DialogueContext, EventSink};

/// One admitted turn, holding the dialogue context while it streams.
#[derive(Debug)]
pub struct PendingTurn {
    turn: InboundTurn,
    context: DialogueContext,
}

impl PendingTurn {
    /// Trimmed turn text.
    pub fn text(&self) -> &str {
        self.turn.text()
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The upstream sequence completed; `text` was sent as the final response.
    Completed { text: String, fragments: usize },
    /// The connection closed mid-stream; forwarding stopped early and no
    /// final response could be delivered.
    Stopped { text: String, fragments: usize },
    /// The turn could not start or failed mid-stream.
    Failed,
    /// The turn was never admitted (invalid, busy or not initialized).
    Rejected,
}

#[derive(Debug, Default)]
struct SessionInner {
    state: SessionState,
    context: Option<DialogueContext>,
}

impl SessionInner {
    fn advance(&mut self, target: SessionState, id: &ConnectionId) {
        if self.state == target {
            return;
        }
        match self.state.transition_to(target) {
            Ok(next) => self.state = next,
            Err(err) => {
                tracing::warn!(connection_id = %id, error = %err, "Ignoring invalid session transition");
            }
        }
    }
}

/// Gateway-side state for one connection.
pub struct ConnectionSession {
    id: ConnectionId,
    dialogue: Arc<dyn DialogueClient>,
    sink: Arc<dyn EventSink>,
    connected_at: Timestamp,
    closed: AtomicBool,
    inner: Mutex<SessionInner>,
}

impl ConnectionSession {
    pub fn new(
        id: ConnectionId,
        dialogue: Arc<dyn DialogueClient>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            id,
            dialogue,
            sink,
            connected_at: Timestamp::now(),
            closed: AtomicBool::new(false),
            inner: Mutex::new(SessionInner::default()),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Returns true once the session has been closed for any reason.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ============================================
    // Open
    // ============================================

    /// Authenticates the connection and opens its dialogue context.
    ///
    /// On any error the session is already `Closed` and the sink has been
    /// told to terminate the connection with a policy-violation code.
    pub async fn on_open(
        &self,
        validator: &CredentialValidator,
        presented: Option<&str>,
    ) -> Result<(), GatewayError> {
        if let Err(err) = validator.check(presented) {
            tracing::warn!(
                connection_id = %self.id,
                credential_present = presented.is_some(),
                "Rejected connection: invalid API key"
            );
            self.fail(&err).await;
            return Err(err);
        }

        match self.dialogue.open_dialogue().await {
            Ok(context) => {
                let mut inner = self.inner.lock().await;
                if inner.state.is_closed() {
                    return Err(GatewayError::NotInitialized);
                }
                tracing::info!(
                    connection_id = %self.id,
                    dialogue_id = %context.id(),
                    model = %context.model(),
                    "Chat session initialized"
                );
                inner.context = Some(context);
                inner.advance(SessionState::Ready, &self.id);
                drop(inner);

                self.sink.send(OutboundEvent::connected()).await;
                Ok(())
            }
            Err(source) => {
                tracing::error!(
                    connection_id = %self.id,
                    error = %source,
                    "Failed to open dialogue"
                );
                let err = GatewayError::UpstreamInit(source.to_string());
                self.sink
                    .send(OutboundEvent::error(err.client_message()))
                    .await;
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    async fn fail(&self, err: &GatewayError) {
        {
            let mut inner = self.inner.lock().await;
            inner.context = None;
            inner.advance(SessionState::Closed, &self.id);
            self.closed.store(true, Ordering::Release);
        }
        if let Some((code, reason)) = err.close_frame() {
            self.sink.close(code, reason).await;
        }
    }

    // ============================================
    // Turns
    // ============================================

    /// Handles one inbound frame end to end.
    pub async fn on_message(&self, raw: &str) -> TurnOutcome {
        match self.begin_turn(raw).await {
            Some(pending) => self.run_turn(pending).await,
            None => TurnOutcome::Rejected,
        }
    }

    /// Admits a turn, moving the session to `Processing`.
    ///
    /// Returns `None` after reporting an `error` event when the frame is
    /// invalid, the session is not ready, or a turn is already streaming.
    pub async fn begin_turn(&self, raw: &str) -> Option<PendingTurn> {
        let mut inner = self.inner.lock().await;

        let admitted = match inner.state {
            SessionState::Unauthenticated | SessionState::Closed => {
                Err(GatewayError::NotInitialized)
            }
            SessionState::Processing => Err(GatewayError::Busy),
            SessionState::Ready => InboundTurn::parse(raw).map_err(GatewayError::from),
        };

        let rejected = match admitted {
            Ok(turn) => match inner.context.take() {
                Some(context) => {
                    inner.advance(SessionState::Processing, &self.id);
                    return Some(PendingTurn { turn, context });
                }
                None => GatewayError::NotInitialized,
            },
            Err(err) => err,
        };
        drop(inner);

        tracing::debug!(connection_id = %self.id, error = %rejected, "Turn rejected");
        self.sink
            .send(OutboundEvent::error(rejected.client_message()))
            .await;
        None
    }

    /// Streams an admitted turn to the client and returns to `Ready`.
    pub async fn run_turn(&self, pending: PendingTurn) -> TurnOutcome {
        let PendingTurn { turn, mut context } = pending;
        let started = Instant::now();

        self.sink.send(OutboundEvent::typing_start()).await;
        tracing::debug!(
            connection_id = %self.id,
            turn_chars = turn.text().chars().count(),
            "Turn started"
        );

        let outcome = match self.dialogue.send_turn(&context, turn.text()).await {
            Ok(mut stream) => {
                let mut text = String::new();
                let mut fragments = 0usize;
                let mut failure = None;
                let mut stopped = false;
                let mut finish_reason = None;
                let mut usage = None;

                while let Some(item) = stream.next().await {
                    if !self.is_live() {
                        stopped = true;
                        break;
                    }
                    match item {
                        Ok(fragment) => {
                            finish_reason = fragment.finish_reason.or(finish_reason);
                            usage = fragment.usage.or(usage);
                            if fragment.text.is_empty() {
                                continue;
                            }
                            text.push_str(&fragment.text);
                            fragments += 1;
                            self.sink.send(OutboundEvent::chunk(fragment.text)).await;
                        }
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }

                match failure {
                    Some(err) => {
                        tracing::warn!(
                            connection_id = %self.id,
                            error = %err,
                            fragments,
                            "Upstream stream failed mid-turn"
                        );
                        self.report(&GatewayError::UpstreamSend(err.to_string())).await;
                        TurnOutcome::Failed
                    }
                    None => {
                        if stopped {
                            tracing::info!(
                                connection_id = %self.id,
                                fragments,
                                "Connection closed mid-stream, stopped forwarding"
                            );
                            TurnOutcome::Stopped { text, fragments }
                        } else {
                            self.sink.send(OutboundEvent::response(text.clone())).await;
                            tracing::info!(
                                connection_id = %self.id,
                                fragments,
                                bytes = text.len(),
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                finish_reason = ?finish_reason,
                                prompt_tokens = usage.map(|u| u.prompt_tokens),
                                completion_tokens = usage.map(|u| u.completion_tokens),
                                "Turn completed"
                            );
                            TurnOutcome::Completed { text, fragments }
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!(connection_id = %self.id, error = %err, "Failed to start turn");
                self.report(&GatewayError::UpstreamSend(err.to_string())).await;
                TurnOutcome::Failed
            }
        };

        let mut inner = self.inner.lock().await;
        if inner.state.is_closed() {
            // Context is released with the turn.
            return outcome;
        }
        if let TurnOutcome::Completed { text, .. } = &outcome {
            context.record_exchange(turn.into_text(), text.clone());
        }
        inner.context = Some(context);
        inner.advance(SessionState::Ready, &self.id);
        outcome
    }

    fn is_live(&self) -> bool {
        !self.is_closed() && self.sink.is_open()
    }

    async fn report(&self, err: &GatewayError) {
        self.sink.send(OutboundEvent::error(err.client_message())).await;
    }

    // ============================================
    // Close
    // ============================================

    /// Asks the client to disconnect with `code`.
    ///
    /// Teardown still runs through `on_close` once the transport ends.
    pub async fn shutdown(&self, code: u16, reason: &str) {
        tracing::info!(connection_id = %self.id, code, reason, "Closing session");
        self.sink.close(code, reason).await;
    }

    /// Discards the dialogue context and moves to `Closed`. Idempotent.
    pub async fn on_close(&self, code: u16, reason: &str) {
        let mut inner = self.inner.lock().await;
        if inner.state.is_closed() {
            return;
        }
        let previous = inner.state;
        inner.context = None;
        inner.advance(SessionState::Closed, &self.id);
        self.closed.store(true, Ordering::Release);
        drop(inner);

        tracing::info!(
            connection_id = %self.id,
            code,
            reason,
            previous_state = %previous,
            duration_secs = self.connected_at.elapsed_secs(),
            "Session closed"
        );
    }
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .field("closed", &self.is_closed())
            .finish()
    }
}
