//!
//! HTTP handlers for the Qri chat relay.
//!
//! Gates the method, parses and shapes the chat request, forwards it upstream and
//! delivers the answer either as one JSON message or as a live event stream. In
//! streaming mode every failure is reported inside the stream, since the status line
//! has already gone out as 200.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::{Config, DeliveryMode};
use crate::error::{ASSISTANT_ROLE, RelayError, Result, UPSTREAM_FAILURE_MESSAGE};
use crate::frame::{Frame, FrameSplitter};
use crate::shaping::{InboundRequest, OutboundRequest, RequestComposer};
use crate::upstream::UpstreamClient;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Application state shared by all handlers.
///
/// Immutable apart from the atomic counters; each request is handled independently.
pub struct AppState {
    /** application configuration */
    pub config: Config,
    /** builds upstream payloads */
    pub composer: RequestComposer,
    /** upstream completion API client */
    pub upstream: UpstreamClient,
    /** metrics for monitoring */
    pub metrics: AppMetrics,
    /** when this process started serving */
    pub started_at: DateTime<Utc>,
}

///
/// Application metrics for monitoring and observability.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /** total number of chat requests received */
    pub total_requests: AtomicU64,
    /** requests answered in buffered mode */
    pub buffered_requests: AtomicU64,
    /** requests answered in streaming mode */
    pub streamed_requests: AtomicU64,
    /** requests that completed with upstream content */
    pub successful_requests: AtomicU64,
    /** inbound bodies that could not be parsed */
    pub parse_errors: AtomicU64,
    /** upstream non-success responses */
    pub upstream_errors: AtomicU64,
    /** upstream successes without completion content */
    pub empty_completions: AtomicU64,
    /** upstream unreachable or too slow */
    pub network_failures: AtomicU64,
    /** streams abandoned by the caller */
    pub cancelled_streams: AtomicU64,
}

///
/// Streaming delivery states.
///
/// `Started → AwaitingUpstream → Relaying → Done`, with `NetworkFailure` and
/// `UpstreamError` both leading to `Done`. `Cancelled` ends the task when the caller
/// has gone away and nobody is left to read the sentinel.
enum StreamPhase {
    Started,
    AwaitingUpstream,
    Relaying(reqwest::Response),
    NetworkFailure(String),
    UpstreamError(String),
    Done,
    Cancelled,
}

/* --- constants ------------------------------------------------------------------------------ */

/** Channel buffer size for streaming responses */
const STREAMING_CHANNEL_BUFFER: usize = 100;

/** Content type of streamed responses */
const CONTENT_TYPE_EVENT_STREAM: &str = "text/event-stream";

/** Reply to methods other than POST and OPTIONS */
pub const USE_POST_MESSAGE: &str = "Use POST.";

/** Synthetic in-stream reply when upstream cannot be reached */
pub const STAGED_FALLBACK_MESSAGE: &str = "I'm having trouble reaching my backend right now. \
     Give me a moment and try again, and I'll pick up where we left off.";

/* --- start of code -------------------------------------------------------------------------- */

impl AppState {
    ///
    /// Create new application state with all dependencies.
    ///
    /// # Arguments
    ///  * `config` - application configuration
    ///
    /// # Returns
    ///  * Application state with initialized dependencies
    ///  * `RelayError` if initialization fails
    pub fn new(config: Config) -> Result<Self> {
        let composer = RequestComposer::new(&config);
        let upstream = UpstreamClient::new(&config)?;

        Ok(Self {
            config,
            composer,
            upstream,
            metrics: AppMetrics::default(),
            started_at: Utc::now(),
        })
    }

    fn record_failure(&self, error: &RelayError) {
        let counter = match error {
            RelayError::Parse(_) => &self.metrics.parse_errors,
            RelayError::Upstream { .. } => &self.metrics.upstream_errors,
            RelayError::EmptyCompletion => &self.metrics.empty_completions,
            RelayError::Network(_) => &self.metrics.network_failures,
            RelayError::Config(_) | RelayError::Http(_) => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

///
/// Handle a chat request.
///
/// Parses and sanitizes the body, composes the upstream payload and hands it to the
/// buffered or streaming delivery path. An explicit `stream` flag in the body wins
/// over the configured default.
///
/// # Arguments
///  * `state` - shared application state
///  * `body` - raw request body
///
/// # Returns
///  * Buffered JSON reply, event stream, or caller-safe error JSON
pub async fn chat(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    state.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

    let request = match InboundRequest::parse(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Rejecting unparsable chat request: {}", e);
            state.record_failure(&e);
            return e.into_response();
        }
    };

    let mode = match request.stream {
        Some(true) => DeliveryMode::Streaming,
        Some(false) => DeliveryMode::Buffered,
        None => state.config.delivery_mode,
    };

    tracing::debug!(
        "Chat request: {} message(s), escalate={}, mode={:?}",
        request.messages.len(),
        request.meta.wants_escalation(),
        mode
    );

    let payload = state.composer.compose(request, mode);

    match mode {
        DeliveryMode::Buffered => handle_buffered(state, payload).await,
        DeliveryMode::Streaming => handle_streaming(state, payload),
    }
}

///
/// Answer a CORS pre-flight request.
///
/// The CORS headers themselves are added by the router's header layer.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

///
/// Reject any method other than POST and OPTIONS.
pub async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "role": ASSISTANT_ROLE, "content": USE_POST_MESSAGE })),
    )
        .into_response()
}

///
/// Handle buffered delivery: one upstream call, one JSON reply.
///
/// # Arguments
///  * `state` - shared application state
///  * `payload` - composed upstream request
///
/// # Returns
///  * 200 with the upstream message, 200 with a retry prompt, or an error JSON
async fn handle_buffered(state: Arc<AppState>, payload: OutboundRequest) -> Response {
    state.metrics.buffered_requests.fetch_add(1, Ordering::Relaxed);

    match state.upstream.complete(&payload).await {
        Ok(message) => {
            state.metrics.successful_requests.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "Completion: {} char(s)",
                message["content"].as_str().map_or(0, |c| c.chars().count())
            );
            Json(message).into_response()
        }
        Err(e) => {
            if matches!(e, RelayError::EmptyCompletion) {
                tracing::warn!("Upstream returned no completion content");
            }
            state.record_failure(&e);
            e.into_response()
        }
    }
}

///
/// Handle streaming delivery.
///
/// Starts the relay task and returns immediately with a 200 event-stream response
/// whose body is fed by that task.
///
/// # Arguments
///  * `state` - shared application state
///  * `payload` - composed upstream request with `stream` true
///
/// # Returns
///  * Event-stream response
fn handle_streaming(state: Arc<AppState>, payload: OutboundRequest) -> Response {
    state.metrics.streamed_requests.fetch_add(1, Ordering::Relaxed);

    let (tx, rx) = mpsc::channel::<Frame>(STREAMING_CHANNEL_BUFFER);

    tokio::spawn(async move {
        relay_stream(state, payload, tx).await;
    });

    let body = Body::from_stream(
        ReceiverStream::new(rx).map(|frame| Ok::<_, Infallible>(frame.into_bytes())),
    );

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, CONTENT_TYPE_EVENT_STREAM),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

///
/// Drive the streaming state machine to completion.
///
/// Emits the ping before anything touches the network and the sentinel exactly once
/// on every path that still has a reader.
///
/// # Arguments
///  * `state` - shared application state
///  * `payload` - composed upstream request
///  * `tx` - outbound frame channel, the caller's response body reads the other end
async fn relay_stream(state: Arc<AppState>, payload: OutboundRequest, tx: mpsc::Sender<Frame>) {
    let mut phase = StreamPhase::Started;

    loop {
        phase = match phase {
            StreamPhase::Started => {
                if tx.send(Frame::Ping).await.is_err() {
                    StreamPhase::Cancelled
                } else {
                    StreamPhase::AwaitingUpstream
                }
            }
            StreamPhase::AwaitingUpstream => await_upstream(&state, &payload, &tx).await,
            StreamPhase::Relaying(response) => relay_upstream(response, &tx).await,
            StreamPhase::NetworkFailure(detail) => {
                tracing::warn!("Streaming fallback after network failure: {}", detail);
                state.metrics.network_failures.fetch_add(1, Ordering::Relaxed);
                send_or_cancel(&tx, Frame::Synthetic(STAGED_FALLBACK_MESSAGE.to_string())).await
            }
            StreamPhase::UpstreamError(detail) => {
                state.metrics.upstream_errors.fetch_add(1, Ordering::Relaxed);
                let text = format!("{} ({})", UPSTREAM_FAILURE_MESSAGE, detail);
                send_or_cancel(&tx, Frame::Synthetic(text)).await
            }
            StreamPhase::Done => {
                let _ = tx.send(Frame::Done).await;
                break;
            }
            StreamPhase::Cancelled => {
                tracing::debug!("Caller disconnected, dropping upstream stream");
                state.metrics.cancelled_streams.fetch_add(1, Ordering::Relaxed);
                break;
            }
        };
    }
}

///
/// Start the upstream call, giving up early if the caller disconnects.
async fn await_upstream(
    state: &AppState,
    payload: &OutboundRequest,
    tx: &mpsc::Sender<Frame>,
) -> StreamPhase {
    let outcome = tokio::select! {
        outcome = state.upstream.send(payload) => outcome,
        _ = tx.closed() => return StreamPhase::Cancelled,
    };

    let response = match outcome {
        Ok(response) => response,
        Err(e) => return StreamPhase::NetworkFailure(e.detail().unwrap_or_else(|| e.to_string())),
    };

    let checked = tokio::select! {
        checked = state.upstream.ensure_success(response) => checked,
        _ = tx.closed() => return StreamPhase::Cancelled,
    };

    let response = match checked {
        Ok(response) => response,
        Err(RelayError::Upstream { status, body }) => {
            return StreamPhase::UpstreamError(format!("upstream {}: {}", status, body));
        }
        Err(e) => return StreamPhase::UpstreamError(e.to_string()),
    };

    if response.content_length() == Some(0) {
        tracing::error!("Upstream stream returned an empty body");
        return StreamPhase::UpstreamError("upstream returned an empty body".to_string());
    }

    StreamPhase::Relaying(response)
}

///
/// Forward upstream frames to the caller until either side ends.
///
/// A read fault ends relaying like a normal end of stream; the sentinel still follows.
async fn relay_upstream(response: reqwest::Response, tx: &mpsc::Sender<Frame>) -> StreamPhase {
    let mut stream = response.bytes_stream();
    let mut splitter = FrameSplitter::new();

    loop {
        let next = tokio::select! {
            next = stream.next() => next,
            _ = tx.closed() => return StreamPhase::Cancelled,
        };

        match next {
            Some(Ok(chunk)) => {
                for frame in splitter.push(&chunk) {
                    if tx.send(frame).await.is_err() {
                        return StreamPhase::Cancelled;
                    }
                }
            }
            Some(Err(e)) => {
                tracing::error!("Stream chunk error: {}", e);
                break;
            }
            None => break,
        }
    }

    if let Some(frame) = splitter.finish() {
        if tx.send(frame).await.is_err() {
            return StreamPhase::Cancelled;
        }
    }

    if splitter.withheld() > 0 {
        tracing::debug!("Withheld {} upstream end marker(s)", splitter.withheld());
    }

    StreamPhase::Done
}

async fn send_or_cancel(tx: &mpsc::Sender<Frame>, frame: Frame) -> StreamPhase {
    match tx.send(frame).await {
        Ok(()) => StreamPhase::Done,
        Err(_) => StreamPhase::Cancelled,
    }
}

///
/// Handle health check endpoint.
///
/// Returns a simple health status for service monitoring with basic metrics.
///
/// # Arguments
///  * `state` - shared application state with metrics
///
/// # Returns
///  * JSON response with health status and metrics
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let m = &state.metrics;
    let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
    let uptime = Utc::now().signed_duration_since(state.started_at).num_seconds();

    Json(json!({
      "status": "ok",
      "started_at": state.started_at.to_rfc3339(),
      "uptime_secs": uptime,
      "delivery_mode": format!("{:?}", state.config.delivery_mode).to_lowercase(),
      "metrics": {
        "total_requests": load(&m.total_requests),
        "buffered_requests": load(&m.buffered_requests),
        "streamed_requests": load(&m.streamed_requests),
        "successful_requests": load(&m.successful_requests),
        "parse_errors": load(&m.parse_errors),
        "upstream_errors": load(&m.upstream_errors),
        "empty_completions": load(&m.empty_completions),
        "network_failures": load(&m.network_failures),
        "cancelled_streams": load(&m.cancelled_streams)
      }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_failure_routes_to_counters() {
        let state = AppState::new(Config::new("sk-test")).unwrap();

        state.record_failure(&RelayError::Parse("x".to_string()));
        state.record_failure(&RelayError::Upstream { status: 500, body: "x".to_string() });
        state.record_failure(&RelayError::EmptyCompletion);
        state.record_failure(&RelayError::Network("x".to_string()));
        state.record_failure(&RelayError::Config("x".to_string()));

        assert_eq!(state.metrics.parse_errors.load(Ordering::Relaxed), 1);
        assert_eq!(state.metrics.upstream_errors.load(Ordering::Relaxed), 1);
        assert_eq!(state.metrics.empty_completions.load(Ordering::Relaxed), 1);
        assert_eq!(state.metrics.network_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_method_not_allowed_body() {
        let response = method_not_allowed().await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
