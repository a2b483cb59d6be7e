//! Generation Transport — the single point of entry for all generation
//! backend calls.
//!
//! ARCHITECTURAL RULE: no other module talks to the generation backend.
//! Both delivery modes hide behind one contract: an atomic call returns a
//! result decoded once into a tagged variant; a streaming call returns a
//! frame stream fed through the decoder. Response shapes are never re-parsed
//! ad hoc at render sites.
//!
//! Per-key exclusivity and superseding are NOT the transport's job — the
//! engine tags each call with a registry ticket and discards stale arrivals.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{future, stream, Stream, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::EngineConfig;
use crate::decoder::{Frame, FrameDecoder};
use crate::errors::DraftError;
use crate::slot::SlotKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Atomic,
    Streaming,
}

/// One generation call for one slot.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub key: SlotKey,
    pub mode: TransportMode,
    /// Free-text steering captured from the user before triggering.
    pub guidance: Option<String>,
    /// Entity context forwarded verbatim to the backend (role description,
    /// interview details, transcript, ...). Opaque to this crate.
    pub context: Value,
}

pub type FrameStream = BoxStream<'static, Result<Frame, DraftError>>;

/// What a generation call yields: a single atomic result, or frames
/// delivered until transport closure.
pub enum Outcome {
    Atomic(AtomicResult),
    Streaming(FrameStream),
}

/// Atomic response body decoded once at the transport boundary. The backend
/// answers in one of three shapes depending on content kind; missing
/// expected members mean "no result", not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicResult {
    Answer(String),
    /// Fan-out: a set of candidate answers reviewed independently.
    AnswerSet(Vec<String>),
    Message {
        subject: Option<String>,
        message: String,
    },
    Empty,
}

impl AtomicResult {
    /// Probes the known shapes in order: `answers`, then `answer`, then
    /// `subject`/`message`.
    pub fn decode(body: &Value) -> Self {
        if let Some(answers) = body.get("answers").and_then(Value::as_array) {
            return Self::AnswerSet(
                answers
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            );
        }
        if let Some(answer) = body.get("answer").and_then(Value::as_str) {
            return Self::Answer(answer.to_string());
        }
        if let Some(message) = body.get("message").and_then(Value::as_str) {
            let subject = body
                .get("subject")
                .and_then(Value::as_str)
                .map(str::to_string);
            return Self::Message {
                subject,
                message: message.to_string(),
            };
        }
        Self::Empty
    }
}

#[async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Outcome, DraftError>;
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP transport
// ────────────────────────────────────────────────────────────────────────────

/// Talks to the generation backend over HTTP. Atomic calls are bounded by
/// the configured request timeout; streaming responses are read without a
/// whole-request deadline (the engine enforces a per-frame idle timeout).
pub struct HttpGenerationTransport {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    request_timeout: std::time::Duration,
}

impl HttpGenerationTransport {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            client: Client::builder()
                .build()
                .expect("Failed to build HTTP client"),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_timeout: std::time::Duration::from_secs(config.request_timeout_secs),
        }
    }
}

#[async_trait]
impl GenerationTransport for HttpGenerationTransport {
    async fn generate(&self, request: &GenerationRequest) -> Result<Outcome, DraftError> {
        let url = format!("{}/api/generate/{}", self.base_url, request.key.field);
        let streaming = request.mode == TransportMode::Streaming;
        let body = json!({
            "entity_id": request.key.entity_id,
            "field": request.key.field,
            "guidance": request.guidance,
            "context": request.context,
            "stream": streaming,
        });

        let mut builder = self.client.post(&url).json(&body);
        if !streaming {
            builder = builder.timeout(self.request_timeout);
        }
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        debug!(key = %request.key, mode = ?request.mode, "generation request");

        let response = builder
            .send()
            .await
            .map_err(|e| DraftError::Transport(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DraftError::Transport(format!(
                "backend returned {status}: {body}"
            )));
        }

        if streaming {
            Ok(Outcome::Streaming(decode_byte_stream(
                response.bytes_stream(),
            )))
        } else {
            let body: Value = response
                .json()
                .await
                .map_err(|e| DraftError::Transport(format!("invalid response body: {e}")))?;
            Ok(Outcome::Atomic(AtomicResult::decode(&body)))
        }
    }
}

/// Pipes a byte stream through the frame decoder, flushing trailing bytes
/// when the underlying stream closes. A decode error ends the frame stream
/// after being yielded once.
pub fn decode_byte_stream<S, E>(bytes: S) -> FrameStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: fmt::Display,
{
    bytes
        .map(|chunk| chunk.map_err(|e| DraftError::Transport(format!("stream error: {e}"))))
        .map(Some)
        .chain(stream::once(future::ready(None)))
        .scan((FrameDecoder::new(), false), |state, item| {
            let (decoder, failed) = state;
            if *failed {
                return future::ready(None);
            }
            let out: Vec<Result<Frame, DraftError>> = match item {
                Some(Ok(chunk)) => match decoder.feed(&chunk) {
                    Ok(frames) => frames.into_iter().map(Ok).collect(),
                    Err(e) => {
                        *failed = true;
                        vec![Err(e)]
                    }
                },
                Some(Err(e)) => {
                    *failed = true;
                    vec![Err(e)]
                }
                None => match decoder.flush() {
                    Ok(frames) => frames.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                },
            };
            future::ready(Some(stream::iter(out)))
        })
        .flatten()
        .boxed()
}
