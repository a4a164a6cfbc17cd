//! MJPEG 推流 (Stream Fan-out)
//!
//! 每个观看者一个 `ViewerStream`,JPEG 编码在锁外完成。

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use tokio::sync::mpsc;

use crate::control::StopFlag;
use crate::frame_bus::FrameBus;
use crate::Result;

pub const BOUNDARY: &str = "frame";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// 推流参数
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub jpeg_quality: u8,
    pub poll: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            poll: Duration::from_millis(100),
        }
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity((image.width() * image.height() / 4) as usize);
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}

/// 单个 multipart 分段
pub fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY);
    let mut chunk = Vec::with_capacity(header.len() + jpeg.len() + 2);
    chunk.extend_from_slice(header.as_bytes());
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    Bytes::from(chunk)
}

/// 观看者帧迭代器
pub struct ViewerStream {
    bus: Arc<FrameBus>,
    stop: StopFlag,
    settings: StreamSettings,
    last_seq: u64,
}

impl ViewerStream {
    pub fn new(bus: Arc<FrameBus>, stop: StopFlag, settings: StreamSettings) -> Self {
        bus.viewer_joined();
        Self {
            bus,
            stop,
            settings,
            last_seq: 0,
        }
    }

    /// 驱动到 Tokio 通道,直到观看者断开或收到停止信号
    pub fn pump(mut self, tx: mpsc::Sender<Bytes>) {
        // 每轮等待都检查接收端,生产者停顿时也能及时退出
        while let Some(chunk) = self.next_chunk(|| tx.is_closed()) {
            if tx.blocking_send(chunk).is_err() {
                break;
            }
        }
        if tx.is_closed() {
            tracing::debug!("观看者已断开");
        }
    }

    /// 等待并编码下一帧; `closed` 返回 true 时放弃等待
    fn next_chunk(&mut self, closed: impl Fn() -> bool) -> Option<Bytes> {
        loop {
            if self.stop.is_stopped() || closed() {
                return None;
            }
            let Some(frame) = self.bus.wait_newer(self.last_seq, self.settings.poll) else {
                continue;
            };
            self.last_seq = frame.seq;

            match encode_jpeg(&frame.image, self.settings.jpeg_quality) {
                Ok(jpeg) => return Some(multipart_chunk(&jpeg)),
                Err(e) => tracing::warn!("⚠️ 帧 #{} 编码失败,跳过: {}", frame.seq, e),
            }
        }
    }
}

impl Iterator for ViewerStream {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        self.next_chunk(|| false)
    }
}

impl Drop for ViewerStream {
    fn drop(&mut self) {
        let left = self.bus.viewer_left();
        tracing::info!("👋 观看者离开,剩余 {}", left);
    }
}
