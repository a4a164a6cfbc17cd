//! API Routes

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::json;
use tokio::sync::mpsc;

use super::AppState;
use crate::stream::{ViewerStream, CONTENT_TYPE};
use crate::violation::Command;
use crate::{Error, Result};

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/status_json", get(status_json))
        .route("/video_feed", get(video_feed))
        .route("/control/{command}", post(control))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": if state.stop.is_stopped() { "stopping" } else { "ok" },
        "version": env!("CARGO_PKG_VERSION"),
        "frames_published": state.bus.published(),
        "viewers": state.bus.viewers(),
    }))
}

async fn status_json(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.board.snapshot())
}

/// 每个请求一个观看者,JPEG 编码在阻塞线程池中进行
async fn video_feed(State(state): State<AppState>) -> Response {
    let (tx, rx) = mpsc::channel::<Bytes>(2);
    let viewer = ViewerStream::new(state.bus.clone(), state.stop.clone(), state.stream);
    tracing::info!("👀 新观看者,当前 {}", state.bus.viewers());
    tokio::task::spawn_blocking(move || viewer.pump(tx));

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok::<Bytes, std::io::Error>(chunk), rx))
    });

    (
        [
            (header::CONTENT_TYPE, CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

async fn control(
    State(state): State<AppState>,
    Path(command): Path<String>,
) -> Result<impl IntoResponse> {
    let cmd: Command = command.parse()?;
    state
        .commands
        .send(cmd)
        .map_err(|_| Error::Source("producer stopped".to_string()))?;
    tracing::info!("🎛️ HTTP 指令: {:?}", cmd);
    Ok((StatusCode::ACCEPTED, Json(json!({ "accepted": command }))))
}
