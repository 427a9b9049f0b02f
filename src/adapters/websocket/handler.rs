//! WebSocket upgrade handler for chat connections.
//!
//! Handles the HTTP → WebSocket upgrade and drives one session per connection:
//! 1. Spawn the writer task and build the session
//! 2. Authenticate and open the dialogue (`on_open`)
//! 3. Read frames until close, error or idle timeout, admitting turns in
//!    arrival order and streaming each one on its own task. The writer pings
//!    at half the idle timeout, so only peers that stop answering go idle.
//! 4. Tear down: close the session, abort any in-flight turn, unregister

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::application::{ConnectionSession, TurnOutcome};
use crate::domain::foundation::ConnectionId;
use crate::domain::gateway::{CredentialValidator, SessionState, CLOSE_GOING_AWAY, CLOSE_NORMAL};
use crate::ports::{DialogueClient, EventSink};

use super::{ConnectionHandle, SessionRegistry};

/// Close code recorded when the peer vanished without a close frame.
const CLOSE_ABNORMAL: u16 = 1006;

/// Transport limits applied to every connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    /// Close the connection when no frame arrives for this long.
    pub idle_timeout: Duration,
    /// Largest accepted message (and frame) in bytes.
    pub max_payload_bytes: usize,
    /// Outbound events buffered per connection before senders wait.
    pub outbound_buffer: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            max_payload_bytes: 32 * 1024 * 1024,
            outbound_buffer: 64,
        }
    }
}

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct GatewayState {
    pub dialogue: Arc<dyn DialogueClient>,
    pub credentials: Arc<CredentialValidator>,
    pub registry: Arc<SessionRegistry>,
    pub limits: ConnectionLimits,
}

impl GatewayState {
    pub fn new(
        dialogue: Arc<dyn DialogueClient>,
        credentials: CredentialValidator,
        limits: ConnectionLimits,
    ) -> Self {
        Self {
            dialogue,
            credentials: Arc::new(credentials),
            registry: Arc::new(SessionRegistry::new()),
            limits,
        }
    }
}

/// Query parameter carrying the client credential.
pub const API_KEY_PARAM: &str = "apiKey";

/// First `apiKey` value in the query string, if any.
///
/// Repeated keys are not rejected here so that every bad credential reaches
/// the policy-violation close path.
pub fn api_key_param(params: Vec<(String, String)>) -> Option<String> {
    params
        .into_iter()
        .find(|(name, _)| name == API_KEY_PARAM)
        .map(|(_, value)| value)
}

/// Handle WebSocket upgrade requests for chat.
///
/// Route: `GET /chat?apiKey=...`
///
/// The upgrade always succeeds; authentication happens on the open socket so
/// that a rejected client sees a policy-violation close frame.
pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<Vec<(String, String)>>,
    State(state): State<GatewayState>,
) -> Response {
    let api_key = api_key_param(params);
    let limit = state.limits.max_payload_bytes;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| handle_socket(socket, api_key, state))
}

/// Handle an established WebSocket connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, api_key: Option<String>, state: GatewayState) {
    let id = ConnectionId::new();
    let (sender, mut receiver) = socket.split();
    let idle_timeout = state.limits.idle_timeout;
    let (handle, _writer) = ConnectionHandle::spawn(
        id,
        sender,
        state.limits.outbound_buffer,
        Some(idle_timeout / 2),
    );
    let handle = Arc::new(handle);

    let session = Arc::new(ConnectionSession::new(
        id,
        state.dialogue.clone(),
        handle.clone(),
    ));
    tracing::debug!(connection_id = %id, "Connection opened");

    if session
        .on_open(&state.credentials, api_key.as_deref())
        .await
        .is_err()
    {
        // Session already closed and the close frame is queued.
        return;
    }
    state.registry.register(session.clone()).await;

    let mut turn: Option<JoinHandle<TurnOutcome>> = None;

    let (code, reason) = loop {
        let next = tokio::time::timeout(idle_timeout, receiver.next()).await;
        if next.is_err() && session.state().await == SessionState::Processing {
            // Outbound streaming counts as activity.
            continue;
        }

        let message = match next {
            Err(_) => {
                tracing::info!(
                    connection_id = %id,
                    idle_secs = idle_timeout.as_secs(),
                    "Idle timeout, closing connection"
                );
                handle.close(CLOSE_GOING_AWAY, "Idle timeout").await;
                break (CLOSE_GOING_AWAY, "Idle timeout".to_string());
            }
            Ok(None) => break (CLOSE_ABNORMAL, "connection dropped".to_string()),
            Ok(Some(Err(e))) => {
                tracing::debug!(connection_id = %id, "Receive error: {}", e);
                break (CLOSE_ABNORMAL, e.to_string());
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                if let Some(pending) = session.begin_turn(&text).await {
                    let session = session.clone();
                    turn = Some(tokio::spawn(async move { session.run_turn(pending).await }));
                }
            }
            Message::Binary(bytes) => {
                tracing::debug!(
                    connection_id = %id,
                    len = bytes.len(),
                    "Ignoring binary frame"
                );
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Answered by the transport; counts as activity.
            }
            Message::Close(frame) => {
                tracing::debug!(connection_id = %id, "Client sent close frame");
                break frame
                    .map(|f| (f.code, f.reason.into_owned()))
                    .unwrap_or((CLOSE_NORMAL, String::new()));
            }
        }
    };

    handle.mark_closed();
    session.on_close(code, &reason).await;
    if let Some(turn) = turn {
        turn.abort();
    }
    state.registry.remove(&id).await;
}

/// Create the WebSocket router.
///
/// Mounts: `GET /chat`
pub fn gateway_router(state: GatewayState) -> Router {
    Router::new()
        .route("/chat", get(chat_ws_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockDialogueClient;
    use secrecy::Secret;

    #[test]
    fn default_limits_match_documented_defaults() {
        let limits = ConnectionLimits::default();
        assert_eq!(limits.idle_timeout, Duration::from_secs(300));
        assert_eq!(limits.max_payload_bytes, 32 * 1024 * 1024);
    }

    #[test]
    fn api_key_is_read_from_query() {
        assert_eq!(api_key_from("apiKey=secret").as_deref(), Some("secret"));
        assert_eq!(api_key_from("other=1&apiKey=a%20b").as_deref(), Some("a b"));
        assert!(api_key_from("other=1").is_none());
        assert!(api_key_from("").is_none());
    }

    #[test]
    fn repeated_api_key_takes_first_value() {
        assert_eq!(
            api_key_from("apiKey=first&apiKey=second").as_deref(),
            Some("first")
        );
    }

    fn api_key_from(query: &str) -> Option<String> {
        let uri: axum::http::Uri = format!("/chat?{}", query).parse().unwrap();
        api_key_param(Query::<Vec<(String, String)>>::try_from_uri(&uri).unwrap().0)
    }

    #[tokio::test]
    async fn gateway_state_starts_with_empty_registry() {
        let state = GatewayState::new(
            Arc::new(MockDialogueClient::new()),
            CredentialValidator::new(Secret::new("secret".to_string())),
            ConnectionLimits::default(),
        );
        assert_eq!(state.registry.count().await, 0);
    }
}
