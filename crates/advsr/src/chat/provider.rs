//! Streaming completion provider.
//!
//! Wraps an OpenAI-compatible chat completion endpoint behind the
//! [`CompletionProvider`] trait and translates its SSE chunks into a
//! uniform event stream. Batching of deltas for fan-out lives in
//! [`DeltaBatcher`], kept separate from delivery so it stays a pure,
//! unit-testable accumulator.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::models::MessageRole;

/// Default completion endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default completion model.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Default number of content chunks per emitted cumulative delta.
pub const DEFAULT_DELTA_BATCH_SIZE: usize = 10;

/// Request timeout for establishing the completion stream.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// One message of the prompt sent to the completion endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PromptMessage {
    pub role: MessageRole,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Failures of a completion call or stream.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to reach completion endpoint: {0}")]
    Connect(String),

    #[error("completion endpoint returned HTTP {0}")]
    Status(u16),

    #[error("malformed completion chunk: {0}")]
    MalformedChunk(String),

    #[error("completion stream dropped: {0}")]
    Transport(String),
}

/// Terminal summary of a successful completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResult {
    pub id: String,
    pub created: i64,
    pub model: String,
    /// Full aggregated assistant text. Empty when the stream produced no
    /// content chunks, which is still a success.
    pub text: String,
}

impl CompletionResult {
    /// Metadata JSON persisted alongside the assistant message. The text
    /// itself is stored in the message content column.
    pub fn metadata_json(&self) -> String {
        serde_json::json!({
            "id": self.id,
            "created": self.created,
            "model": self.model,
        })
        .to_string()
    }
}

/// Events yielded by a completion stream.
///
/// Zero or more `Delta`s followed by exactly one `Completed` or `Failed`.
#[derive(Debug)]
pub enum StreamEvent {
    Delta(String),
    Completed(CompletionResult),
    Failed(ProviderError),
}

/// Receiving half of a completion stream.
pub type CompletionStream = mpsc::Receiver<StreamEvent>;

/// A streaming chat completion backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Start one completion over the given prompt.
    ///
    /// Errors returned here mean the stream never started; errors after
    /// that arrive as a terminal [`StreamEvent::Failed`].
    async fn stream_completion(
        &self,
        messages: Vec<PromptMessage>,
    ) -> Result<CompletionStream, ProviderError>;
}

/// [`CompletionProvider`] over an OpenAI-compatible `/chat/completions`
/// endpoint using SSE.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: String, model: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|err| anyhow::anyhow!("Failed to build HTTP client: {}", err))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn stream_completion(
        &self,
        messages: Vec<PromptMessage>,
    ) -> Result<CompletionStream, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&body);

        let es = EventSource::new(request).map_err(|err| ProviderError::Connect(err.to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(drive_stream(es, tx, self.model.clone()));

        Ok(rx)
    }
}

/// Pump one SSE stream into `tx`, ending with exactly one terminal event.
///
/// The event source is closed on every exit path; letting it live would
/// trigger its built-in reconnect and re-send the completion request.
async fn drive_stream(mut es: EventSource, tx: mpsc::Sender<StreamEvent>, model: String) {
    let mut meta: Option<CompletionChunk> = None;
    let mut text = String::new();
    let mut opened = false;

    let outcome = loop {
        let Some(event) = es.next().await else {
            break Ok(());
        };

        match event {
            Ok(Event::Open) => {
                opened = true;
                debug!("Completion stream opened");
            }
            Ok(Event::Message(msg)) => {
                // The endpoint marks the end of the stream with a sentinel.
                if msg.data.trim() == "[DONE]" {
                    break Ok(());
                }

                match parse_chunk(&msg.data) {
                    Ok(chunk) => {
                        let delta = chunk.delta.clone();
                        if meta.is_none() {
                            meta = Some(chunk);
                        }
                        if let Some(delta) = delta {
                            text.push_str(&delta);
                            if tx.send(StreamEvent::Delta(delta)).await.is_err() {
                                // Receiver gone, nobody is listening anymore
                                break Ok(());
                            }
                        }
                    }
                    Err(err) => break Err(err),
                }
            }
            // A server-side close without the sentinel still ends the
            // stream gracefully.
            Err(reqwest_eventsource::Error::StreamEnded) => break Ok(()),
            Err(reqwest_eventsource::Error::InvalidStatusCode(code, _)) => {
                break Err(ProviderError::Status(code.as_u16()));
            }
            Err(err) if opened => break Err(ProviderError::Transport(err.to_string())),
            Err(err) => break Err(ProviderError::Connect(err.to_string())),
        }
    };

    es.close();

    let terminal = match outcome {
        Ok(()) => {
            // A stream that closed before its first chunk still commits an
            // empty reply; synthesize the metadata we never received.
            let meta = meta.unwrap_or_else(|| CompletionChunk {
                id: String::new(),
                created: chrono::Utc::now().timestamp(),
                model,
                delta: None,
            });
            StreamEvent::Completed(CompletionResult {
                id: meta.id,
                created: meta.created,
                model: meta.model,
                text,
            })
        }
        Err(err) => {
            warn!("Completion stream failed: {}", err);
            StreamEvent::Failed(err)
        }
    };

    if tx.send(terminal).await.is_err() {
        debug!("Completion stream receiver dropped before terminal event");
    }
}

/// One parsed completion chunk: stream metadata plus an optional content
/// delta. Role-only and empty-content chunks carry no delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompletionChunk {
    pub id: String,
    pub created: i64,
    pub model: String,
    pub delta: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    id: String,
    created: i64,
    model: String,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Parse one SSE `data:` payload.
pub(crate) fn parse_chunk(data: &str) -> Result<CompletionChunk, ProviderError> {
    let payload: ChunkPayload =
        serde_json::from_str(data).map_err(|err| ProviderError::MalformedChunk(err.to_string()))?;

    let delta = payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty());

    Ok(CompletionChunk {
        id: payload.id,
        created: payload.created,
        model: payload.model,
        delta,
    })
}

/// Accumulates content deltas and decides when the cumulative text is due
/// for fan-out.
///
/// `push` returns the full cumulative text on every `batch_size`-th content
/// chunk; `flush` returns the cumulative text when the stream ends between
/// batch boundaries, and always on a stream that never emitted, so every
/// turn produces at least one cumulative delta.
#[derive(Debug)]
pub struct DeltaBatcher {
    batch_size: usize,
    text: String,
    chunks: usize,
    emitted_chunks: usize,
    emitted_any: bool,
}

impl DeltaBatcher {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            text: String::new(),
            chunks: 0,
            emitted_chunks: 0,
            emitted_any: false,
        }
    }

    /// Append one content delta. Empty deltas are not counted.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        if delta.is_empty() {
            return None;
        }

        self.text.push_str(delta);
        self.chunks += 1;

        if self.chunks % self.batch_size == 0 {
            self.emitted_chunks = self.chunks;
            self.emitted_any = true;
            Some(self.text.clone())
        } else {
            None
        }
    }

    /// Emit whatever `push` has not emitted yet.
    ///
    /// Returns `None` only when the last `push` already emitted the full
    /// cumulative text.
    pub fn flush(&mut self) -> Option<String> {
        if self.chunks == self.emitted_chunks && self.emitted_any {
            return None;
        }

        self.emitted_chunks = self.chunks;
        self.emitted_any = true;
        Some(self.text.clone())
    }

    /// Full accumulated text so far.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Default for DeltaBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DELTA_BATCH_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk_json(content: Option<&str>) -> String {
        let delta = match content {
            Some(content) => json!({ "content": content }),
            None => json!({ "role": "assistant" }),
        };
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1714561200,
            "model": "gpt-3.5-turbo-0125",
            "choices": [{ "index": 0, "delta": delta, "finish_reason": null }]
        })
        .to_string()
    }

    #[test]
    fn test_parse_chunk_with_content() {
        let chunk = parse_chunk(&chunk_json(Some("Hello"))).unwrap();
        assert_eq!(chunk.id, "chatcmpl-1");
        assert_eq!(chunk.created, 1714561200);
        assert_eq!(chunk.model, "gpt-3.5-turbo-0125");
        assert_eq!(chunk.delta.as_deref(), Some("Hello"));
    }

    #[test]
    fn test_parse_chunk_role_only() {
        // The first chunk usually carries only the role
        let chunk = parse_chunk(&chunk_json(None)).unwrap();
        assert_eq!(chunk.delta, None);
    }

    #[test]
    fn test_parse_chunk_empty_content() {
        let chunk = parse_chunk(&chunk_json(Some(""))).unwrap();
        assert_eq!(chunk.delta, None);
    }

    #[test]
    fn test_parse_chunk_no_choices() {
        let data = json!({
            "id": "chatcmpl-2",
            "created": 1714561200,
            "model": "gpt-3.5-turbo",
            "choices": []
        })
        .to_string();
        let chunk = parse_chunk(&data).unwrap();
        assert_eq!(chunk.delta, None);
    }

    #[test]
    fn test_parse_chunk_malformed() {
        let err = parse_chunk("not json").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedChunk(_)));
    }

    #[test]
    fn test_batcher_emits_on_batch_boundary() {
        let mut batcher = DeltaBatcher::new(3);

        assert_eq!(batcher.push("a"), None);
        assert_eq!(batcher.push("b"), None);
        assert_eq!(batcher.push("c"), Some("abc".to_string()));
        assert_eq!(batcher.push("d"), None);
        assert_eq!(batcher.push("e"), None);
        assert_eq!(batcher.push("f"), Some("abcdef".to_string()));
    }

    #[test]
    fn test_batcher_flushes_tail() {
        let mut batcher = DeltaBatcher::new(3);
        batcher.push("a");
        batcher.push("b");
        batcher.push("c");
        batcher.push("d");

        assert_eq!(batcher.flush(), Some("abcd".to_string()));
        // Nothing new since the last flush
        assert_eq!(batcher.flush(), None);
    }

    #[test]
    fn test_batcher_no_reemit_on_exact_boundary() {
        let mut batcher = DeltaBatcher::new(2);
        batcher.push("a");
        assert_eq!(batcher.push("b"), Some("ab".to_string()));

        // The boundary emission already covered the full text
        assert_eq!(batcher.flush(), None);
    }

    #[test]
    fn test_batcher_empty_stream_flushes_empty_string() {
        let mut batcher = DeltaBatcher::default();
        assert_eq!(batcher.flush(), Some(String::new()));
        assert_eq!(batcher.flush(), None);
    }

    #[test]
    fn test_batcher_skips_empty_deltas() {
        let mut batcher = DeltaBatcher::new(2);
        assert_eq!(batcher.push(""), None);
        assert_eq!(batcher.push("a"), None);
        assert_eq!(batcher.push(""), None);
        assert_eq!(batcher.push("b"), Some("ab".to_string()));
    }

    #[test]
    fn test_batcher_last_emission_covers_full_text() {
        // Whatever the chunk count, the final observed value is the full text
        for total in [0usize, 1, 9, 10, 11, 25, 30] {
            let mut batcher = DeltaBatcher::new(10);
            let mut last = None;
            for i in 0..total {
                if let Some(emitted) = batcher.push(&i.to_string()) {
                    last = Some(emitted);
                }
            }
            if let Some(flushed) = batcher.flush() {
                last = Some(flushed);
            }
            assert_eq!(last.as_deref(), Some(batcher.text()));
        }
    }

    #[test]
    fn test_prompt_message_wire_shape() {
        let message = PromptMessage::new(MessageRole::System, "stay on topic");
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"stay on topic"}"#);
    }

    #[test]
    fn test_completion_result_metadata_json() {
        let result = CompletionResult {
            id: "chatcmpl-1".to_string(),
            created: 1714561200,
            model: "gpt-3.5-turbo-0125".to_string(),
            text: "hello".to_string(),
        };
        let metadata: serde_json::Value =
            serde_json::from_str(&result.metadata_json()).unwrap();
        assert_eq!(metadata["id"], "chatcmpl-1");
        assert_eq!(metadata["created"], 1714561200);
        assert_eq!(metadata["model"], "gpt-3.5-turbo-0125");
        assert!(metadata.get("text").is_none());
    }
}
