//! Gemini Provider - Implementation of DialogueClient for Google's Gemini API.
//!
//! # Configuration
//!
//! ```ignore
//! let config = GeminiConfig::new(api_key)
//!     .with_model("gemini-2.5-flash")
//!     .with_timeout(Duration::from_secs(120));
//!
//! let client = GeminiDialogueClient::new(config)?;
//! ```
//!
//! # Streaming
//!
//! Uses `streamGenerateContent?alt=sse`. The response body is line-buffered
//! across network chunks; each `data:` payload is one Gemini stream chunk whose
//! candidate text parts become fragments. The API key travels in the
//! `x-goog-api-key` header, never in the URL.
//!
//! The configured timeout bounds connecting, waiting for response headers
//! and each gap between body chunks. A long but steady stream is never cut.

use async_trait::async_trait;
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

use crate::ports::{
    ClientInfo, DialogueClient, DialogueContext, DialogueError, DialogueRole, FinishReason,
    Fragment, FragmentStream, TokenUsage,
};

/// Default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default Gemini API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Configuration for the Gemini client.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key for authentication.
    api_key: Secret<String>,
    /// Model to use (e.g., "gemini-2.5-flash").
    pub model: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Limit for connecting, receiving response headers, and the gap
    /// between streamed body chunks.
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Creates a new configuration with the given API key.
    pub fn new(api_key: Secret<String>) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the connect, header and stall timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// Gemini API dialogue client.
pub struct GeminiDialogueClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiDialogueClient {
    /// Creates a new client with the given configuration.
    pub fn new(config: GeminiConfig) -> Result<Self, DialogueError> {
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| DialogueError::init(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Builds the streaming endpoint URL.
    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Sends the request and waits for response headers, not the body.
    async fn send_streaming_request(
        &self,
        request: &GeminiRequest,
    ) -> Result<Response, DialogueError> {
        let pending = self
            .client
            .post(self.stream_url())
            .header("x-goog-api-key", self.config.api_key())
            .header("Content-Type", "application/json")
            .json(request)
            .send();

        let sent = tokio::time::timeout(self.config.timeout, pending)
            .await
            .map_err(|_| self.timeout_error())?;

        sent.map_err(|e| {
            if e.is_timeout() {
                self.timeout_error()
            } else if e.is_connect() {
                DialogueError::network(format!("Connection failed: {}", e))
            } else {
                DialogueError::network(e.to_string())
            }
        })
    }

    fn timeout_error(&self) -> DialogueError {
        DialogueError::Timeout {
            timeout_secs: self.config.timeout.as_secs(),
        }
    }

    /// Maps non-2xx responses to dialogue errors.
    async fn handle_response_status(&self, response: Response) -> Result<Response, DialogueError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status.as_u16(), &body))
    }
}

#[async_trait]
impl DialogueClient for GeminiDialogueClient {
    async fn open_dialogue(&self) -> Result<DialogueContext, DialogueError> {
        if self.config.api_key().is_empty() {
            return Err(DialogueError::init("missing upstream credential"));
        }
        if self.config.model.trim().is_empty() {
            return Err(DialogueError::init("missing model name"));
        }
        Ok(DialogueContext::new(self.config.model.clone()))
    }

    async fn send_turn(
        &self,
        ctx: &DialogueContext,
        text: &str,
    ) -> Result<FragmentStream, DialogueError> {
        let request = GeminiRequest::from_context(ctx, text);
        let response = self.send_streaming_request(&request).await?;
        let response = self.handle_response_status(response).await?;

        tracing::debug!(
            model = %self.config.model,
            history_len = ctx.history().len(),
            "Gemini stream opened"
        );

        Ok(Box::pin(fragment_stream(
            response.bytes_stream(),
            self.config.timeout,
        )))
    }

    fn client_info(&self) -> ClientInfo {
        ClientInfo::new("gemini", &self.config.model)
    }
}

/// Maps an HTTP status and error body to a dialogue error.
fn status_error(status: u16, body: &str) -> DialogueError {
    let message = serde_json::from_str::<GeminiErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());

    match status {
        401 | 403 => DialogueError::AuthenticationFailed,
        429 => DialogueError::RateLimited,
        _ => DialogueError::send(format!("status {}: {}", status, message)),
    }
}

// ============================================
// Stream decoding
// ============================================

/// Turns a raw SSE body into fragments, ending after the first error.
///
/// `stall` bounds the wait for each body chunk.
fn fragment_stream<S, B, E>(
    bytes: S,
    stall: Duration,
) -> impl Stream<Item = Result<Fragment, DialogueError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    sse_data(bytes, stall)
        .flat_map(|item| {
            let decoded = match item {
                Ok(data) => decode_chunk(&data),
                Err(e) => vec![Err(e)],
            };
            stream::iter(decoded)
        })
        .scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            *failed = item.is_err();
            future::ready(Some(item))
        })
}

/// Yields the payload of every `data:` line, buffering partial lines.
fn sse_data<S, B, E>(
    bytes: S,
    stall: Duration,
) -> impl Stream<Item = Result<String, DialogueError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    stream::unfold(
        (Box::pin(bytes), Vec::<u8>::with_capacity(8192), false),
        move |(mut bytes, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    if let Some(data) = extract_data(&line) {
                        return Some((Ok(data), (bytes, buffer, false)));
                    }
                    continue;
                }

                let next = match tokio::time::timeout(stall, bytes.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let err = DialogueError::Timeout {
                            timeout_secs: stall.as_secs(),
                        };
                        return Some((Err(err), (bytes, buffer, true)));
                    }
                };

                match next {
                    Some(Ok(chunk)) => buffer.extend_from_slice(chunk.as_ref()),
                    Some(Err(e)) => {
                        let err = DialogueError::stream(format!("stream read error: {}", e));
                        return Some((Err(err), (bytes, buffer, true)));
                    }
                    None => {
                        let rest = String::from_utf8_lossy(&buffer).into_owned();
                        buffer.clear();
                        return extract_data(&rest).map(|data| (Ok(data), (bytes, buffer, true)));
                    }
                }
            }
        },
    )
}

/// Extracts the payload of one SSE line; `None` for comments, blanks and `[DONE]`.
fn extract_data(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();

    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_string())
}

/// Decodes one Gemini stream chunk into fragments or a terminal error.
fn decode_chunk(data: &str) -> Vec<Result<Fragment, DialogueError>> {
    let chunk: GeminiStreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            return vec![Err(DialogueError::parse(format!(
                "Failed to parse stream chunk: {}",
                e
            )))]
        }
    };

    if let Some(error) = chunk.error {
        return vec![Err(DialogueError::stream(format!(
            "upstream error {}: {}",
            error.code, error.message
        )))];
    }

    if let Some(reason) = chunk
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return vec![Err(DialogueError::Blocked(reason))];
    }

    let usage = chunk
        .usage_metadata
        .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count));

    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return match usage {
            Some(usage) => vec![Ok(Fragment::text("").with_usage(usage))],
            None => Vec::new(),
        };
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter(|part| !part.thought)
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    let finish = candidate.finish_reason.as_deref().map(map_finish_reason);
    if let Some(Err(reason)) = &finish {
        if text.is_empty() {
            return vec![Err(DialogueError::Blocked(reason.clone()))];
        }
    }

    let mut fragment = Fragment::text(text);
    if let Some(finish) = finish {
        fragment = fragment.with_finish_reason(finish.unwrap_or(FinishReason::Other));
    }
    if let Some(usage) = usage {
        fragment = fragment.with_usage(usage);
    }
    vec![Ok(fragment)]
}

/// Maps a Gemini finish reason; `Err` carries the reason for blocking finishes.
fn map_finish_reason(reason: &str) -> Result<FinishReason, String> {
    match reason {
        "STOP" => Ok(FinishReason::Stop),
        "MAX_TOKENS" => Ok(FinishReason::Length),
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            Err(reason.to_string())
        }
        _ => Ok(FinishReason::Other),
    }
}

// ----- Gemini API Types -----

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

impl GeminiRequest {
    /// Full history followed by the new user turn.
    fn from_context(ctx: &DialogueContext, text: &str) -> Self {
        let mut contents: Vec<GeminiContent> = ctx
            .history()
            .iter()
            .map(|m| GeminiContent::new(m.role, &m.text))
            .collect();
        contents.push(GeminiContent::new(DialogueRole::User, text));
        Self { contents }
    }
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiTextPart>,
}

impl GeminiContent {
    fn new(role: DialogueRole, text: &str) -> Self {
        Self {
            role: match role {
                DialogueRole::User => "user",
                DialogueRole::Model => "model",
            },
            parts: vec![GeminiTextPart {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiTextPart {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    error: Option<GeminiApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiApiError {
    #[serde(default)]
    code: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiApiError,
}

#[cfg(test)]
mod tests {
    use super::*;

    const STALL: Duration = Duration::from_secs(5);

    fn test_config() -> GeminiConfig {
        GeminiConfig::new(Secret::new("test-key".to_string()))
    }

    async fn collect_fragments(
        chunks: Vec<&'static str>,
    ) -> Vec<Result<Fragment, DialogueError>> {
        let bytes = stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, std::io::Error>(c.as_bytes().to_vec())),
        );
        fragment_stream(bytes, STALL).collect().await
    }

    #[test]
    fn config_builder_works() {
        let config = test_config()
            .with_model("gemini-2.5-pro")
            .with_base_url("http://localhost:9999/v1beta")
            .with_timeout(Duration::from_secs(30));

        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.base_url, "http://localhost:9999/v1beta");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.api_key(), "test-key");
    }

    #[test]
    fn config_defaults() {
        let config = test_config();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    fn config_debug_does_not_leak_key() {
        let debug = format!("{:?}", test_config());
        assert!(!debug.contains("test-key"));
    }

    #[test]
    fn stream_url_targets_sse_endpoint() {
        let client =
            GeminiDialogueClient::new(test_config().with_base_url("http://host/v1beta/")).unwrap();
        assert_eq!(
            client.stream_url(),
            "http://host/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }

    #[tokio::test]
    async fn open_dialogue_returns_empty_context() {
        let client = GeminiDialogueClient::new(test_config()).unwrap();
        let ctx = client.open_dialogue().await.unwrap();
        assert_eq!(ctx.model(), DEFAULT_MODEL);
        assert!(ctx.history().is_empty());
    }

    #[tokio::test]
    async fn open_dialogue_fails_without_credential() {
        let client =
            GeminiDialogueClient::new(GeminiConfig::new(Secret::new(String::new()))).unwrap();
        assert!(matches!(
            client.open_dialogue().await,
            Err(DialogueError::Init(_))
        ));
    }

    #[tokio::test]
    async fn open_dialogue_fails_without_model() {
        let client = GeminiDialogueClient::new(test_config().with_model(" ")).unwrap();
        assert!(matches!(
            client.open_dialogue().await,
            Err(DialogueError::Init(_))
        ));
    }

    #[test]
    fn request_carries_history_then_turn() {
        let mut ctx = DialogueContext::new(DEFAULT_MODEL);
        ctx.record_exchange("Hello", "Hi there");

        let body = serde_json::to_value(GeminiRequest::from_context(&ctx, "How are you?")).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "Hello"}]},
                    {"role": "model", "parts": [{"text": "Hi there"}]},
                    {"role": "user", "parts": [{"text": "How are you?"}]},
                ]
            })
        );
    }

    #[test]
    fn status_errors_map_to_dialogue_errors() {
        assert!(matches!(status_error(401, ""), DialogueError::AuthenticationFailed));
        assert!(matches!(status_error(403, ""), DialogueError::AuthenticationFailed));
        assert!(matches!(status_error(429, ""), DialogueError::RateLimited));

        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        match status_error(400, body) {
            DialogueError::Send(message) => assert!(message.contains("API key not valid")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn extract_data_skips_non_payload_lines() {
        assert_eq!(extract_data("data: {\"a\":1}\r\n"), Some("{\"a\":1}".to_string()));
        assert_eq!(extract_data("data:{\"a\":1}"), Some("{\"a\":1}".to_string()));
        assert_eq!(extract_data(": keep-alive"), None);
        assert_eq!(extract_data("event: message"), None);
        assert_eq!(extract_data("data: [DONE]"), None);
        assert_eq!(extract_data(""), None);
    }

    #[test]
    fn decode_text_chunk() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}],"role":"model"}}]}"#;
        let fragments = decode_chunk(data);
        assert_eq!(fragments.len(), 1);
        let fragment = fragments[0].as_ref().unwrap();
        assert_eq!(fragment.text, "Hello");
        assert!(fragment.finish_reason.is_none());
    }

    #[test]
    fn decode_final_chunk_with_usage() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"!"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":4,"candidatesTokenCount":6,"totalTokenCount":10}}"#;
        let fragment = decode_chunk(data).remove(0).unwrap();
        assert_eq!(fragment.text, "!");
        assert_eq!(fragment.finish_reason, Some(FinishReason::Stop));
        assert_eq!(fragment.usage, Some(TokenUsage::new(4, 6)));
    }

    #[test]
    fn decode_skips_thought_parts() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"thinking...","thought":true},{"text":"answer"}]}}]}"#;
        assert_eq!(decode_chunk(data)[0].as_ref().unwrap().text, "answer");
    }

    #[test]
    fn decode_blocked_prompt() {
        let data = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert!(matches!(
            decode_chunk(data).remove(0),
            Err(DialogueError::Blocked(reason)) if reason == "SAFETY"
        ));
    }

    #[test]
    fn decode_safety_finish_without_text_is_blocked() {
        let data = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        assert!(matches!(decode_chunk(data).remove(0), Err(DialogueError::Blocked(_))));
    }

    #[test]
    fn decode_error_object() {
        let data = r#"{"error":{"code":500,"message":"internal"}}"#;
        assert!(matches!(decode_chunk(data).remove(0), Err(DialogueError::Stream(_))));
    }

    #[test]
    fn decode_invalid_json() {
        assert!(matches!(decode_chunk("{not json").remove(0), Err(DialogueError::Parse(_))));
    }

    #[tokio::test]
    async fn stream_buffers_lines_split_across_chunks() {
        let items = collect_fragments(vec![
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"te",
            "xt\":\"Hello\"}]}}]}\r\n\r\ndata: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" world\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n",
        ])
        .await;

        let text: String = items.iter().map(|i| i.as_ref().unwrap().text.as_str()).collect();
        assert_eq!(text, "Hello world");
        assert!(items.last().unwrap().as_ref().unwrap().finish_reason.is_some());
    }

    #[tokio::test]
    async fn stream_processes_trailing_line_without_newline() {
        let items = collect_fragments(vec![
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"tail\"}]}}]}",
        ])
        .await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().text, "tail");
    }

    #[tokio::test]
    async fn stream_ends_after_first_error() {
        let items = collect_fragments(vec![
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"partial\"}]}}]}\n\n",
            "data: {broken\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"never\"}]}}]}\n\n",
        ])
        .await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(DialogueError::Parse(_))));
    }

    #[tokio::test]
    async fn stream_read_error_is_terminal() {
        let bytes = stream::iter(vec![
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"a\"}]}}]}\n".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let items: Vec<_> = fragment_stream(bytes, STALL).collect().await;

        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(DialogueError::Stream(_))));
    }

    #[tokio::test]
    async fn stalled_body_ends_with_timeout() {
        let first = stream::iter(vec![Ok::<_, std::io::Error>(
            b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"a\"}]}}]}\n".to_vec(),
        )]);
        let bytes = first.chain(stream::pending());

        let items: Vec<_> = fragment_stream(bytes, Duration::from_millis(50))
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().text, "a");
        assert!(matches!(items[1], Err(DialogueError::Timeout { .. })));
    }

    #[tokio::test]
    async fn slow_chunks_within_stall_limit_complete() {
        let chunks = vec!["Hel", "lo"];
        let bytes = stream::iter(chunks).then(|text| async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<_, std::io::Error>(
                format!(
                    "data: {{\"candidates\":[{{\"content\":{{\"parts\":[{{\"text\":\"{}\"}}]}}}}]}}\n\n",
                    text
                )
                .into_bytes(),
            )
        });

        let items: Vec<_> = fragment_stream(bytes, Duration::from_millis(100))
            .collect()
            .await;

        let text: String = items.into_iter().map(|i| i.unwrap().text).collect();
        assert_eq!(text, "Hello");
    }
}
