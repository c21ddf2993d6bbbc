//! **Chat collaborator**: role-tagged messages in, token deltas (or one full reply) out.
//!
//! `OpenAiChat` talks to any OpenAI-compatible `/chat/completions` endpoint. Streaming replies are
//! decoded by `SseDecoder` on a spawned task and forwarded through a bounded channel; the
//! receiver side is what the `Segmenter` consumes.

use crate::config::ChatConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::sse::SseDecoder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Reply used when a one-shot completion carries no content.
pub const EMPTY_REPLY_FALLBACK: &str = "I'm here to help!";

const STREAM_CHANNEL_CAPACITY: usize = 100;

/// One item of an incremental chat reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A fragment of model text, in order.
    Delta(String),
    /// A payload that could not be parsed; skipped by consumers.
    Malformed(String),
    /// Explicit end-of-stream marker.
    Done,
    /// The transport broke before the reply ended. Last item of the stream.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Backend producing model replies. Implement for hosted APIs, local servers or test doubles.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Request one complete reply.
    async fn complete(&self, messages: Vec<ChatMessage>) -> VoiceResult<String>;

    /// Request an incremental reply. The channel closes after `ChatEvent::Done` or when the source ends.
    ///
    /// The default wraps `complete` as a single delta for backends without streaming.
    async fn stream(&self, messages: Vec<ChatMessage>) -> VoiceResult<mpsc::Receiver<ChatEvent>> {
        let reply = self.complete(messages).await?;
        single_reply(reply).await
    }
}

/// A complete reply as a one-delta stream.
async fn single_reply(reply: String) -> VoiceResult<mpsc::Receiver<ChatEvent>> {
    let (tx, rx) = mpsc::channel(2);
    tx.send(ChatEvent::Delta(reply)).await?;
    tx.send(ChatEvent::Done).await?;
    Ok(rx)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatResponseMessage>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat client (llama.cpp server, vLLM, OpenRouter, OpenAI).
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    base_url: String,
    model: String,
    api_key: Option<String>,
    streaming: bool,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(config: &ChatConfig) -> VoiceResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        // Per-read limit only; a streamed reply may outlast `timeout`.
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Chat(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.resolve_api_key(),
            streaming: config.stream,
            timeout,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn post(&self, messages: &[ChatMessage], stream: bool) -> VoiceResult<reqwest::Response> {
        let body = ChatRequest { model: &self.model, messages, stream };
        let mut request = self.client.post(self.endpoint()).json(&body);
        if !stream {
            request = request.timeout(self.timeout);
        }
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(target: "parley::chat", status = %status, "chat endpoint returned {}: {}", status, body);
            return Err(VoiceError::ChatStatus { status: status.as_u16(), body });
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for OpenAiChat {
    async fn complete(&self, messages: Vec<ChatMessage>) -> VoiceResult<String> {
        info!(target: "parley::chat", model = %self.model, "one-shot completion requested");
        let response = self.post(&messages, false).await?;
        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| EMPTY_REPLY_FALLBACK.to_string());
        Ok(content)
    }

    async fn stream(&self, messages: Vec<ChatMessage>) -> VoiceResult<mpsc::Receiver<ChatEvent>> {
        if !self.streaming {
            let reply = self.complete(messages).await?;
            return single_reply(reply).await;
        }

        let response = self.post(&messages, true).await?;
        info!(target: "parley::chat", model = %self.model, "SSE stream established");

        let (tx, rx) = mpsc::channel::<ChatEvent>(STREAM_CHANNEL_CAPACITY);
        let model = self.model.clone();
        tokio::spawn(async move {
            use futures_util::TryStreamExt;
            let mut body = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            loop {
                match body.try_next().await {
                    Ok(Some(bytes)) => {
                        for event in decoder.push(&bytes) {
                            if tx.send(event).await.is_err() {
                                // Receiver dropped (turn interrupted); stop reading.
                                debug!(target: "parley::chat", "stream receiver dropped");
                                return;
                            }
                        }
                        if decoder.is_done() {
                            debug!(target: "parley::chat", model = %model, "stream completed");
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(target: "parley::chat", model = %model, "stream read failed: {}", e);
                        let _ = tx.send(ChatEvent::Failed(e.to_string())).await;
                        return;
                    }
                }
            }
            if let Some(event) = decoder.finish() {
                let _ = tx.send(event).await;
            }
            // Dropping tx closes the channel: implicit end of stream.
        });

        Ok(rx)
    }
}
