use std::convert::Infallible;
use std::path::PathBuf;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use framelab_common::state::InteractionEvent;
use framelab_pipeline::recorder::RecorderError;
use framelab_pipeline::snapshot::SnapshotError;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::app::{Command, ControlError, PointerAction, Reply, StatusReport};
use crate::preview::{multipart_part, PreviewFeed, BOUNDARY};

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ServerState {
    pub commands: mpsc::Sender<Command>,
    pub status: watch::Receiver<StatusReport>,
    pub preview: PreviewFeed,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PointerRequest {
    action: PointerAction,
    x: i32,
    y: i32,
}

#[derive(Debug, Default, Deserialize)]
struct PathRequest {
    path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct CommandReply {
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorReply {
    error: String,
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = match &self {
            ControlError::Snapshot(SnapshotError::NoFrame) | ControlError::Unavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ControlError::Snapshot(SnapshotError::UnsupportedFormat(_)) | ControlError::Rejected(_) => {
                StatusCode::BAD_REQUEST
            }
            ControlError::Recorder(RecorderError::AlreadyRecording) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "command failed");
        }
        (
            status,
            Json(ErrorReply {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Hand a command to the pipeline loop and wait for its reply.
async fn request(
    state: &ServerState,
    make: impl FnOnce(Reply) -> Command,
) -> Result<Json<CommandReply>, ControlError> {
    let (tx, rx) = oneshot::channel();
    state
        .commands
        .send(make(tx))
        .await
        .map_err(|_| ControlError::Unavailable)?;
    let message = rx.await.map_err(|_| ControlError::Unavailable)??;
    Ok(Json(CommandReply { message }))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /stream — MJPEG preview
async fn stream(State(state): State<ServerState>) -> impl IntoResponse {
    let rx = state.preview.subscribe();
    info!(clients = state.preview.stream_clients(), "preview client connected");
    let parts = futures_util::stream::unfold(rx, |mut rx| async move {
        loop {
            rx.changed().await.ok()?;
            let jpeg = rx.borrow_and_update().clone();
            if let Some(jpeg) = jpeg {
                return Some((Ok::<_, Infallible>(multipart_part(&jpeg)), rx));
            }
        }
    });
    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(parts),
    )
}

/// GET /frame — latest preview JPEG
async fn frame(State(state): State<ServerState>) -> Response {
    match state.preview.latest_jpeg() {
        Some(Ok(jpeg)) => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
        Some(Err(e)) => {
            error!(error = %e, "failed to encode preview frame");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// GET /status
async fn status(State(state): State<ServerState>) -> Json<StatusReport> {
    Json(state.status.borrow().clone())
}

/// POST /events — body is an interaction event in frame coordinates
async fn events(
    State(state): State<ServerState>,
    Json(event): Json<InteractionEvent>,
) -> Result<Json<CommandReply>, ControlError> {
    if matches!(event, InteractionEvent::RecordingChanged { .. }) {
        return Err(ControlError::Rejected(
            "recording state follows the recorder; use /recording/start or /recording/stop".into(),
        ));
    }
    request(&state, |reply| Command::Event { event, reply }).await
}

/// POST /pointer — { "action": "down"|"move"|"up", "x": .., "y": .. } in surface coordinates
async fn pointer(
    State(state): State<ServerState>,
    Json(body): Json<PointerRequest>,
) -> Result<Json<CommandReply>, ControlError> {
    request(&state, |reply| Command::Pointer {
        action: body.action,
        x: body.x,
        y: body.y,
        reply,
    })
    .await
}

/// POST /snapshot — optional { "path": .. }
async fn snapshot(
    State(state): State<ServerState>,
    body: Option<Json<PathRequest>>,
) -> Result<Json<CommandReply>, ControlError> {
    let path = body.and_then(|Json(b)| b.path);
    request(&state, |reply| Command::Snapshot { path, reply }).await
}

/// POST /recording/start — optional { "path": .. }
async fn start_recording(
    State(state): State<ServerState>,
    body: Option<Json<PathRequest>>,
) -> Result<Json<CommandReply>, ControlError> {
    let path = body.and_then(|Json(b)| b.path);
    request(&state, |reply| Command::StartRecording { path, reply }).await
}

/// POST /recording/stop
async fn stop_recording(State(state): State<ServerState>) -> Result<Json<CommandReply>, ControlError> {
    request(&state, |reply| Command::StopRecording { reply }).await
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/stream", get(stream))
        .route("/frame", get(frame))
        .route("/status", get(status))
        .route("/events", post(events))
        .route("/pointer", post(pointer))
        .route("/snapshot", post(snapshot))
        .route("/recording/start", post(start_recording))
        .route("/recording/stop", post(stop_recording))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
