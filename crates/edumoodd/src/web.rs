//! HTTP dashboard, JSON API and the WebSocket video stream.

use crate::engine::EngineHandle;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use edumood_core::{Admission, Recognizer, Session};
use edumood_hw::frame::{self, FrameError};
use std::sync::Arc;
use std::time::Duration;

const DASHBOARD_HTML: &str = include_str!("dashboard.html");

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub engine: EngineHandle,
    pub analyze_every_n: u32,
    pub jpeg_quality: u8,
    pub analysis_timeout: Duration,
    pub report_refresh_ms: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/ws/frames", get(frames_ws))
        .route("/api/report", get(report))
        .route("/api/records", get(records))
        .route("/api/status", get(status))
        .route("/api/session/reset", post(reset))
        .with_state(state)
}

async fn dashboard(State(state): State<AppState>) -> Html<String> {
    Html(DASHBOARD_HTML.replace("{{REFRESH_MS}}", &state.report_refresh_ms.to_string()))
}

async fn report(State(state): State<AppState>) -> Response {
    Json(state.session.report()).into_response()
}

async fn records(State(state): State<AppState>) -> Response {
    Json(state.session.snapshot()).into_response()
}

async fn status(State(state): State<AppState>) -> Response {
    Json(status_json(&state)).into_response()
}

async fn reset(State(state): State<AppState>) -> Response {
    let info = state.session.reset();
    tracing::info!(session = %info.id, "session reset via HTTP");
    Json(info).into_response()
}

pub(crate) fn status_json(state: &AppState) -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "session": state.session.info(),
        "analyze_every_n": state.analyze_every_n,
        "analysis_timeout_ms": state.analysis_timeout.as_millis() as u64,
    })
}

async fn frames_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_frames(socket, state))
}

/// Per-connection stream state: the recognizer plus the last JPEG sent back.
pub(crate) struct FrameStream {
    recognizer: Recognizer,
    last_reply: Option<Vec<u8>>,
}

impl FrameStream {
    pub(crate) fn new(state: &AppState) -> Self {
        Self {
            recognizer: Recognizer::new(Arc::clone(&state.session), state.analyze_every_n),
            last_reply: None,
        }
    }

    /// JPEG answering one incoming message.
    ///
    /// A frame that cannot be decoded or encoded is answered with the previous
    /// reply and does not advance the frame counter. `None` only before any
    /// frame has been answered.
    pub(crate) async fn reply(&mut self, state: &AppState, bytes: &[u8]) -> Option<Vec<u8>> {
        match process_frame(state, &mut self.recognizer, bytes).await {
            Ok(reply) => {
                self.last_reply = Some(reply.clone());
                Some(reply)
            }
            Err(e) => {
                tracing::debug!(error = %e, len = bytes.len(), "bad frame, repeating last reply");
                self.last_reply.clone()
            }
        }
    }
}

/// One recognizer per connection; frames are answered strictly in order.
async fn stream_frames(mut socket: WebSocket, state: AppState) {
    let mut stream = FrameStream::new(&state);
    tracing::info!(every = stream.recognizer.interval(), "video stream connected");

    while let Some(msg) = socket.recv().await {
        let bytes = match msg {
            Ok(Message::Binary(bytes)) => bytes,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "websocket receive failed");
                break;
            }
        };

        let Some(reply) = stream.reply(&state, &bytes).await else {
            continue;
        };

        if socket.send(Message::Binary(reply)).await.is_err() {
            break;
        }
    }

    tracing::info!(
        seen = stream.recognizer.frames_seen(),
        analyzed = stream.recognizer.frames_analyzed(),
        "video stream closed"
    );
}

/// Decode, mirror, throttle and (maybe) analyze one JPEG frame, returning the
/// JPEG to send back.
pub(crate) async fn process_frame(
    state: &AppState,
    recognizer: &mut Recognizer,
    jpeg: &[u8],
) -> Result<Vec<u8>, FrameError> {
    let mirrored = frame::mirror(&frame::decode_image(jpeg)?);

    let out = match recognizer.admit(mirrored) {
        Admission::Reuse(image) => image,
        Admission::Analyze(image) => {
            let fallback = recognizer.fallback(image.clone());
            match tokio::time::timeout(state.analysis_timeout, state.engine.analyze(image)).await {
                Ok(Ok(analysis)) => recognizer.complete(analysis),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "analysis failed, sending fallback frame");
                    fallback
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = state.analysis_timeout.as_millis() as u64,
                        "analysis timed out, sending fallback frame"
                    );
                    fallback
                }
            }
        }
    };

    frame::encode_jpeg(&out, state.jpeg_quality)
}
