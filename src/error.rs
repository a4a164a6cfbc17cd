//! 错误类型 (Error types)

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 摄像头无法打开 (重试耗尽)
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    /// 帧读取失败
    #[error("Frame source error: {0}")]
    Source(String),

    /// 姿态模型错误
    #[error("Pose model error: {0}")]
    Pose(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 未知的操作员指令
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Font error: {0}")]
    Font(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            Error::InvalidCommand(_) => (StatusCode::BAD_REQUEST, "INVALID_COMMAND"),
            Error::CameraUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "CAMERA_UNAVAILABLE"),
            Error::Source(_) => (StatusCode::SERVICE_UNAVAILABLE, "SOURCE_ERROR"),
            Error::Pose(_) => (StatusCode::INTERNAL_SERVER_ERROR, "POSE_ERROR"),
            Error::Image(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IMAGE_ERROR"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Error::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR"),
            Error::Font(_) => (StatusCode::INTERNAL_SERVER_ERROR, "FONT_ERROR"),
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        };
        let message = self.to_string();

        tracing::warn!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
