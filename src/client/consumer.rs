//! Client-side stream consumer
//!
//! Opens the relay request, drives the frame decoder over the response
//! bytes, and dispatches deltas in arrival order. The deadline covers
//! the whole read, not per chunk: a stream that keeps trickling past the
//! bound still times out, and timeouts surface as their own error
//! variant so the user message can say "took too long" rather than
//! "connection failed".

use crate::config::ClientConfig;
use crate::error::DocentError;
use crate::sse::{FrameDecoder, FramePayload};

use futures::StreamExt;
use serde_json::json;
use std::fmt::Display;
use std::time::Duration;

/// HTTP consumer for the relay's streaming chat route
pub struct StreamConsumer {
    client: reqwest::Client,
    relay_url: String,
    send_timeout: Duration,
    request_timeout: Duration,
}

impl StreamConsumer {
    /// Build a consumer from client config
    ///
    /// The HTTP client itself carries no overall timeout; deadlines are
    /// applied per operation so chat sends and quick requests can use
    /// different bounds.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(config: &ClientConfig) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent("docent/0.3.0")
            .build()
            .map_err(|e| DocentError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            relay_url: config.relay_url.trim_end_matches('/').to_string(),
            send_timeout: Duration::from_secs(config.send_timeout_seconds),
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
        })
    }

    /// Send one chat message and stream the reply
    ///
    /// `on_delta` is invoked once per delta frame, strictly in arrival
    /// order. Returns when the terminal sentinel arrives or the stream
    /// ends. Uses the long (send) deadline.
    ///
    /// # Errors
    ///
    /// `DocentError::Timeout` when the deadline expires,
    /// `DocentError::Transport` for connection and read failures.
    pub async fn send_chat(
        &self,
        message: &str,
        on_delta: impl FnMut(&str),
    ) -> std::result::Result<(), DocentError> {
        let deadline = tokio::time::Instant::now() + self.send_timeout;
        let url = format!("{}/chat/stream", self.relay_url);
        let read = async {
            let response = self
                .client
                .post(&url)
                .json(&json!({ "message": message }))
                .send()
                .await
                .map_err(|e| DocentError::Transport(format!("Request failed: {}", e)))?;
            let status = response.status();
            if !status.is_success() {
                return Err(DocentError::Transport(format!("Relay returned {}", status)));
            }
            consume_frames(response.bytes_stream(), on_delta).await
        };
        match tokio::time::timeout_at(deadline, read).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Chat send exceeded {}s deadline", self.send_timeout.as_secs());
                Err(DocentError::Timeout(self.send_timeout.as_secs()))
            }
        }
    }

    /// Probe the relay's health route with the short deadline
    ///
    /// # Errors
    ///
    /// `DocentError::Timeout` or `DocentError::Transport` as in `send_chat`.
    pub async fn check_health(&self) -> std::result::Result<(), DocentError> {
        let deadline = tokio::time::Instant::now() + self.request_timeout;
        let url = format!("{}/health", self.relay_url);
        let probe = async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| DocentError::Transport(format!("Request failed: {}", e)))?;
            if !response.status().is_success() {
                return Err(DocentError::Transport(format!(
                    "Relay returned {}",
                    response.status()
                )));
            }
            Ok(())
        };
        match tokio::time::timeout_at(deadline, probe).await {
            Ok(result) => result,
            Err(_) => Err(DocentError::Timeout(self.request_timeout.as_secs())),
        }
    }
}

/// Decode loop over a raw byte stream of frames
///
/// Deltas are dispatched exactly once each, in order. `Terminal` ends
/// the loop successfully; so does end-of-data. Unrecognized payloads are
/// heartbeats and are skipped. Generic over the byte stream so the loop
/// is testable without sockets.
pub async fn consume_frames<S, E>(
    mut stream: S,
    mut on_delta: impl FnMut(&str),
) -> std::result::Result<(), DocentError>
where
    S: futures::Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: Display,
{
    let mut decoder = FrameDecoder::new();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| DocentError::Transport(format!("Stream read failed: {}", e)))?;
        for payload in decoder.push(&chunk) {
            match payload {
                FramePayload::Delta(text) => on_delta(&text),
                FramePayload::Terminal => return Ok(()),
                FramePayload::Unrecognized => {
                    tracing::trace!("Skipping unrecognized frame payload");
                }
            }
        }
    }
    Ok(())
}
