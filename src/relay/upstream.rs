//! Upstream text generator for the relay
//!
//! This module defines the Generator trait the relay streams from, the
//! Ollama implementation which consumes the NDJSON chat stream from a
//! local or remote Ollama server, and a scripted double for tests and
//! offline demos.

use crate::config::UpstreamConfig;
use crate::error::{DocentError, Result};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Boxed stream of incremental text fragments from the generator
pub type DeltaStream = BoxStream<'static, Result<String>>;

/// A source of incrementally generated assistant text
///
/// The relay holds one of these behind an `Arc` and opens a fresh stream
/// per chat request. Implementations yield fragments in generation order
/// and end the stream when the reply is complete; a failed item aborts
/// the stream.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Open a delta stream for one exchange
    ///
    /// # Arguments
    ///
    /// * `system` - System prompt seeding the exchange
    /// * `user` - The user's message
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be opened at all; failures
    /// after the first fragment surface as stream items instead.
    async fn generate(&self, system: &str, user: &str) -> Result<DeltaStream>;
}

/// Request structure for the Ollama chat API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

/// Message structure for the Ollama chat API
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
}

/// One NDJSON line of a streamed Ollama chat response
#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Message fragment inside one streamed chunk
#[derive(Debug, Deserialize)]
struct OllamaChunkMessage {
    #[serde(default)]
    content: String,
}

/// Ollama-backed generator
///
/// POSTs `/api/chat` with `stream: true` and yields `message.content`
/// from each NDJSON line until the `done` marker.
pub struct OllamaGenerator {
    client: Client,
    config: UpstreamConfig,
}

impl OllamaGenerator {
    /// Create a new Ollama generator
    ///
    /// The HTTP client carries a connect timeout but no overall request
    /// timeout; long generations are bounded by the consumer's deadline,
    /// not here.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent("docent/0.3.0")
            .build()
            .map_err(|e| DocentError::Upstream(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized Ollama generator: host={}, model={}",
            config.host,
            config.model
        );

        Ok(Self { client, config })
    }

    /// The configured model name
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, system: &str, user: &str) -> Result<DeltaStream> {
        let url = format!("{}/api/chat", self.config.host);
        let request = OllamaRequest {
            model: self.config.model.clone(),
            messages: vec![
                OllamaMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                OllamaMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            stream: true,
        };

        tracing::debug!(
            "Opening Ollama stream: model={}, user_chars={}",
            request.model,
            user.chars().count()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Ollama request failed: {}", e);
                DocentError::Upstream(format!("Ollama request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Ollama returned error {}: {}", status, error_text);
            return Err(DocentError::Upstream(format!(
                "Ollama returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        Ok(ndjson_deltas(response.bytes_stream().boxed()).boxed())
    }
}

/// What one parsed NDJSON line contributes to the delta stream
enum LineEvent {
    Delta(String),
    Done,
    Fail(String),
    Skip,
}

fn parse_line(line: &[u8]) -> LineEvent {
    let chunk: OllamaChunk = match serde_json::from_slice(line) {
        Ok(chunk) => chunk,
        // keep-alives and partial garbage are skipped, not fatal
        Err(_) => return LineEvent::Skip,
    };
    if let Some(error) = chunk.error {
        return LineEvent::Fail(error);
    }
    let content = chunk.message.map(|m| m.content).unwrap_or_default();
    match (content.is_empty(), chunk.done) {
        (false, _) => LineEvent::Delta(content),
        (true, true) => LineEvent::Done,
        (true, false) => LineEvent::Skip,
    }
}

/// State threaded through the NDJSON unfold
struct NdjsonState<S> {
    inner: S,
    // raw bytes; splitting on b'\n' is safe regardless of UTF-8 boundaries
    buf: Vec<u8>,
    lines: VecDeque<Vec<u8>>,
    done: bool,
}

/// Turn a raw byte stream of NDJSON chunk lines into a delta stream
///
/// Lines may arrive split across or packed within byte chunks; the state
/// machine re-frames them before parsing. An upstream-reported error or a
/// transport failure ends the stream with an `Err` item.
fn ndjson_deltas<S>(inner: S) -> impl futures::Stream<Item = Result<String>>
where
    S: futures::Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Unpin,
{
    let state = NdjsonState {
        inner,
        buf: Vec::new(),
        lines: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            while let Some(line) = st.lines.pop_front() {
                match parse_line(&line) {
                    LineEvent::Delta(text) => return Some((Ok(text), st)),
                    LineEvent::Done => return None,
                    LineEvent::Fail(msg) => {
                        st.done = true;
                        st.lines.clear();
                        return Some((Err(DocentError::Upstream(msg).into()), st));
                    }
                    LineEvent::Skip => {}
                }
            }
            if st.done {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(bytes)) => {
                    st.buf.extend_from_slice(&bytes);
                    while let Some(pos) = st.buf.iter().position(|b| *b == b'\n') {
                        let mut line: Vec<u8> = st.buf.drain(..=pos).collect();
                        line.pop();
                        if !line.is_empty() {
                            st.lines.push_back(line);
                        }
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((
                        Err(DocentError::Transport(format!(
                            "Upstream stream read failed: {}",
                            e
                        ))
                        .into()),
                        st,
                    ));
                }
                None => {
                    st.done = true;
                    if !st.buf.is_empty() {
                        let tail = std::mem::take(&mut st.buf);
                        st.lines.push_back(tail);
                    }
                }
            }
        }
    })
}

/// One step of a scripted generation
#[derive(Debug, Clone)]
pub enum ScriptedEvent {
    /// Yield a text fragment
    Delta(String),
    /// Fail mid-stream with an upstream error
    Fail(String),
    /// Sleep before the next event, to exercise deadlines
    Pause(Duration),
}

/// Scripted generator used in tests and offline demos
///
/// Plays back a fixed sequence of events. With `refuse` set, `generate`
/// itself fails, modeling an upstream that is down before the first byte.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGenerator {
    events: Vec<ScriptedEvent>,
    refuse: Option<String>,
}

impl ScriptedGenerator {
    /// Generator that yields the given fragments and completes
    pub fn with_deltas(deltas: &[&str]) -> Self {
        Self {
            events: deltas
                .iter()
                .map(|d| ScriptedEvent::Delta(d.to_string()))
                .collect(),
            refuse: None,
        }
    }

    /// Generator that plays back an arbitrary event script
    pub fn with_events(events: Vec<ScriptedEvent>) -> Self {
        Self {
            events,
            refuse: None,
        }
    }

    /// Generator whose `generate` call fails outright
    pub fn refusing(message: &str) -> Self {
        Self {
            events: Vec::new(),
            refuse: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, _system: &str, _user: &str) -> Result<DeltaStream> {
        if let Some(message) = &self.refuse {
            return Err(DocentError::Upstream(message.clone()).into());
        }
        let stream = futures::stream::iter(self.events.clone())
            .then(|event| async move {
                match event {
                    ScriptedEvent::Delta(text) => Some(Ok(text)),
                    ScriptedEvent::Fail(msg) => Some(Err(DocentError::Upstream(msg).into())),
                    ScriptedEvent::Pause(duration) => {
                        tokio::time::sleep(duration).await;
                        None
                    }
                }
            })
            .filter_map(|item| async move { item });
        Ok(stream.boxed())
    }
}
