//! WebAPI - 视频流 + 状态查询 + 操作员指令
//!
//! - `GET  /status_json`        看板状态快照
//! - `GET  /video_feed`         MJPEG 实时画面
//! - `POST /control/{command}`  reset / littering / parking / posting
//! - `GET  /healthz`

mod routes;

pub use routes::create_router;

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::control::StopFlag;
use crate::frame_bus::FrameBus;
use crate::status::StatusBoard;
use crate::stream::StreamSettings;
use crate::violation::Command;

/// HTTP 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<FrameBus>,
    pub board: Arc<StatusBoard>,
    pub commands: Sender<Command>,
    pub stop: StopFlag,
    pub stream: StreamSettings,
}

/// 监听并服务,直到 Ctrl-C 或停止信号
pub async fn serve(state: AppState, addr: &str) -> std::io::Result<()> {
    let stop = state.stop.clone();
    let app = create_router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("🌐 Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(stop))
        .await
}

/// 等待 Ctrl-C 或停止标志;返回前置位停止标志,让推流连接自行结束
pub async fn shutdown_signal(stop: StopFlag) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("⚠️ 无法监听 Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let flag = {
        let stop = stop.clone();
        async move {
            while !stop.is_stopped() {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("⏹️ 收到 Ctrl-C"),
        _ = flag => tracing::info!("⏹️ 收到停止信号"),
    }
    stop.stop();
}
