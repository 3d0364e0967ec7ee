//! Streaming relay HTTP server
//!
//! Exposes `POST /chat/stream`, which opens an upstream generation and
//! relays it to the client one frame per delta, closing with the `[DONE]`
//! sentinel. The response status is committed before generation starts,
//! so failures after that point are delivered as an apology frame on the
//! already-open stream rather than an HTTP error.

use crate::config::{ServerConfig, UpstreamConfig};
use crate::error::Result;
use crate::relay::context::{build_system_prompt, ContextSource};
use crate::relay::upstream::{DeltaStream, Generator};
use crate::sse;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;

/// Payload frame written when generation fails after the stream opened
pub const ERROR_FRAME_TEXT: &str = "An error occurred while processing the request.";

/// Shared state behind the relay routes
#[derive(Clone)]
pub struct RelayState {
    pub generator: Arc<dyn Generator>,
    pub context: Arc<dyn ContextSource>,
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
}

/// Request body for `POST /chat/stream`
#[derive(Debug, Deserialize)]
pub struct ChatStreamRequest {
    #[serde(default)]
    pub message: String,
}

/// Build the relay router over the given state
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat/stream", post(chat_stream))
        .with_state(state)
}

/// Bind and serve until the task is aborted
pub async fn serve(state: RelayState) -> Result<()> {
    let bind_addr = state.server.bind_addr.clone();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Relay listening on {}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root() -> impl IntoResponse {
    Json(json!({ "ok": true, "service": "docent relay" }))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true, "status": "ok" }))
}

/// The streaming chat route
///
/// Rejects an empty message with 400 before committing the stream; after
/// that every outcome is a 200 whose body frames tell the story. A client
/// disconnect drops the body stream, which cancels the upstream read.
async fn chat_stream(
    State(state): State<RelayState>,
    Json(request): Json<ChatStreamRequest>,
) -> Response {
    if request.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "message is required" })),
        )
            .into_response();
    }

    let document = match state.context.latest_text().await {
        Ok(document) => document,
        Err(e) => {
            // a missing document is survivable; answer without context
            tracing::warn!("Failed to read document context: {}", e);
            None
        }
    };
    let system = build_system_prompt(
        document.as_deref(),
        state.server.context_char_budget,
        &state.upstream.reply_language,
    );

    tracing::debug!(
        "Opening relay stream: message_chars={}, has_document={}",
        request.message.chars().count(),
        document.is_some()
    );

    match state.generator.generate(&system, &request.message).await {
        Ok(deltas) => sse_response(relay_frames(deltas)),
        Err(e) => {
            tracing::warn!("Upstream refused the request: {}", e);
            sse_response(futures::stream::once(async {
                Ok(Bytes::from(sse::encode_delta(ERROR_FRAME_TEXT)))
            }))
        }
    }
}

/// Map a delta stream into wire frames
///
/// Each delta becomes one frame in arrival order; a clean end appends the
/// `[DONE]` sentinel. A mid-stream failure is logged and replaced by the
/// apology frame, after which the stream ends without the sentinel, just
/// as an aborted upstream connection would.
fn relay_frames(
    deltas: DeltaStream,
) -> impl futures::Stream<Item = std::result::Result<Bytes, Infallible>> {
    struct FrameState {
        deltas: DeltaStream,
        finished: bool,
    }

    futures::stream::unfold(
        FrameState {
            deltas,
            finished: false,
        },
        |mut st| async move {
            if st.finished {
                return None;
            }
            match st.deltas.next().await {
                Some(Ok(delta)) => Some((Ok(Bytes::from(sse::encode_delta(&delta))), st)),
                Some(Err(e)) => {
                    tracing::warn!("Upstream stream failed mid-reply: {}", e);
                    st.finished = true;
                    Some((Ok(Bytes::from(sse::encode_delta(ERROR_FRAME_TEXT))), st))
                }
                None => {
                    st.finished = true;
                    Some((Ok(Bytes::from(sse::encode_done())), st))
                }
            }
        },
    )
}

fn sse_response<S>(stream: S) -> Response
where
    S: futures::Stream<Item = std::result::Result<Bytes, Infallible>> + Send + 'static,
{
    (
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::context::{NoContext, StaticContext};
    use crate::relay::upstream::{ScriptedEvent, ScriptedGenerator};
    use crate::sse::{FrameDecoder, FramePayload};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn state_with(generator: ScriptedGenerator) -> RelayState {
        RelayState {
            generator: Arc::new(generator),
            context: Arc::new(NoContext),
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }

    async fn post_chat(app: Router, message: &str) -> (StatusCode, Vec<FramePayload>) {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/chat/stream")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "message": message }).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let mut decoder = FrameDecoder::new();
        (status, decoder.push(&body))
    }

    #[tokio::test]
    async fn test_health_route() {
        let app = router(state_with(ScriptedGenerator::default()));
        let request = axum::http::Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_root_route_reports_service() {
        let app = router(state_with(ScriptedGenerator::default()));
        let request = axum::http::Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_chat_stream_frames_deltas_then_done() {
        let app = router(state_with(ScriptedGenerator::with_deltas(&[
            "He", "llo", " there",
        ])));
        let (status, frames) = post_chat(app, "hi").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            frames,
            vec![
                FramePayload::Delta("He".to_string()),
                FramePayload::Delta("llo".to_string()),
                FramePayload::Delta(" there".to_string()),
                FramePayload::Terminal,
            ]
        );
    }

    #[tokio::test]
    async fn test_chat_stream_sets_event_stream_headers() {
        let app = router(state_with(ScriptedGenerator::with_deltas(&["x"])));
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/chat/stream")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "message": "hi" }).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream; charset=utf-8"
        );
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-cache, no-transform"
        );
    }

    #[tokio::test]
    async fn test_chat_stream_rejects_empty_message() {
        let app = router(state_with(ScriptedGenerator::with_deltas(&["x"])));
        let (status, _) = post_chat(app, "   ").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_refusing_upstream_yields_error_frame_without_done() {
        let app = router(state_with(ScriptedGenerator::refusing("down")));
        let (status, frames) = post_chat(app, "hi").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            frames,
            vec![FramePayload::Delta(ERROR_FRAME_TEXT.to_string())]
        );
    }

    #[tokio::test]
    async fn test_midstream_failure_yields_partial_then_error_frame() {
        let app = router(state_with(ScriptedGenerator::with_events(vec![
            ScriptedEvent::Delta("partial".to_string()),
            ScriptedEvent::Fail("reset".to_string()),
        ])));
        let (_, frames) = post_chat(app, "hi").await;
        assert_eq!(
            frames,
            vec![
                FramePayload::Delta("partial".to_string()),
                FramePayload::Delta(ERROR_FRAME_TEXT.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_system_prompt_sees_document_context() {
        // generator ignores the prompt, so assert via the context trait
        let context = StaticContext("the quarterly report".to_string());
        let text = context.latest_text().await.unwrap();
        let prompt = build_system_prompt(text.as_deref(), 100_000, "auto");
        assert!(prompt.contains("the quarterly report"));
    }
}
