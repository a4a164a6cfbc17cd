/// FFmpeg解码过滤器模块
/// FFmpeg decode filter module
use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;

// AVPixelFormat 取值 (libavutil/pixfmt.h)
const PIX_FMT_YUV420P: i32 = 0;
const PIX_FMT_YUVJ420P: i32 = 12;

/// 平面 4:2:0 格式 (yuvj420p 仅色域不同,内存布局一致)
pub fn is_planar_420(format: i32) -> bool {
    matches!(format, PIX_FMT_YUV420P | PIX_FMT_YUVJ420P)
}

/// FFmpeg解码过滤器: 摄像头 YUV420P → RGB 帧,经通道交给生产者
#[derive(Clone)]
pub struct DecodeFilter {
    tx: Sender<RgbImage>,
    count: usize,
    last: Instant,
    dropped_frames: usize,
    total_frames: usize,
    format_warned: bool,
}

impl DecodeFilter {
    pub fn new(tx: Sender<RgbImage>) -> Self {
        Self {
            tx,
            count: 0,
            last: Instant::now(),
            dropped_frames: 0,
            total_frames: 0,
            format_warned: false,
        }
    }

    fn drop_frame(&mut self, reason: &str) -> Result<Option<Frame>, String> {
        self.dropped_frames += 1;
        if self.total_frames <= 10 {
            tracing::warn!("⚠️ 丢弃帧 #{}: {}", self.total_frames, reason);
        }
        Ok(None)
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        tracing::info!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        self.total_frames += 1;

        // 基本检查：空帧或损坏帧
        if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
            return self.drop_frame("空帧/损坏帧");
        }

        // SAFETY: 指针非空,帧在本次回调内有效
        let raw = unsafe { &*frame.as_ptr() };
        let (w, h) = (raw.width as usize, raw.height as usize);
        if w == 0 || h == 0 || w > 4096 || h > 4096 {
            return self.drop_frame("非法分辨率");
        }
        // 上游已插入 format=yuv420p,其它格式说明管线被改动
        if !is_planar_420(raw.format) {
            if !self.format_warned {
                self.format_warned = true;
                tracing::error!("❌ 不支持的像素格式 {} (需要 yuv420p),帧将被丢弃", raw.format);
            }
            return self.drop_frame("像素格式不支持");
        }
        // 只丢弃严重错误的帧 (缺少参考帧、无效比特流)
        if raw.decode_error_flags & 0x03 != 0 {
            return self.drop_frame("解码错误标志");
        }

        let (y_plane, u_plane, v_plane) = (raw.data[0], raw.data[1], raw.data[2]);
        let y_stride = raw.linesize[0] as usize;
        let uv_stride = raw.linesize[1] as usize;
        if y_plane.is_null() || u_plane.is_null() || v_plane.is_null() {
            return self.drop_frame("YUV指针为空");
        }
        if y_stride < w || uv_stride < w / 2 {
            return self.drop_frame("步长异常");
        }

        let uv_rows = h.div_ceil(2);
        // SAFETY: 平面大小由 linesize × 行数 给出
        let (y, u, v) = unsafe {
            (
                std::slice::from_raw_parts(y_plane, y_stride * h),
                std::slice::from_raw_parts(u_plane, uv_stride * uv_rows),
                std::slice::from_raw_parts(v_plane, uv_stride * uv_rows),
            )
        };

        let mut rgb = vec![0u8; w * h * 3];
        yuv420p_to_rgb(y, u, v, y_stride, uv_stride, &mut rgb, w, h);
        let Some(image) = RgbImage::from_raw(w as u32, h as u32, rgb) else {
            return self.drop_frame("缓冲区尺寸不匹配");
        };

        self.count += 1;
        if self.last.elapsed().as_secs_f64() >= 1.0 {
            let fps = self.count as f64 / self.last.elapsed().as_secs_f64();
            tracing::debug!(
                "📺 解码统计: {:.1}fps | 总帧{} | 丢弃{}",
                fps,
                self.total_frames,
                self.dropped_frames
            );
            self.last = Instant::now();
            self.count = 0;
        }

        match self.tx.try_send(image) {
            // 生产者忙时丢弃,只保留较新的帧
            Ok(()) | Err(TrySendError::Full(_)) => Ok(Some(frame)),
            Err(TrySendError::Disconnected(_)) => Err("camera source closed".to_string()),
        }
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        tracing::info!("✅ 解码线程退出");
    }
}

/// YUV420P → RGB (BT.601 定点)
#[allow(clippy::too_many_arguments)]
pub fn yuv420p_to_rgb(
    y_plane: &[u8],
    u_plane: &[u8],
    v_plane: &[u8],
    y_stride: usize,
    uv_stride: usize,
    buffer: &mut [u8],
    width: usize,
    height: usize,
) {
    let mut out_idx = 0;
    for y in 0..height {
        let y_row = y * y_stride;
        let uv_row = (y >> 1) * uv_stride;

        for x in 0..width {
            let y_val = y_plane[y_row + x] as i32;
            let u_val = u_plane[uv_row + (x >> 1)] as i32 - 128;
            let v_val = v_plane[uv_row + (x >> 1)] as i32 - 128;

            buffer[out_idx] = (y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8;
            buffer[out_idx + 1] =
                (y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8;
            buffer[out_idx + 2] = (y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8;
            out_idx += 3;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_stays_gray() {
        let (w, h) = (4, 2);
        let y = vec![100u8; w * h];
        let uv = vec![128u8; 2];
        let mut out = vec![0u8; w * h * 3];
        yuv420p_to_rgb(&y, &uv, &uv, w, 2, &mut out, w, h);
        assert!(out.iter().all(|&c| c == 100));
    }

    #[test]
    fn test_red_chroma() {
        let y = vec![76u8; 4];
        let u = vec![85u8];
        let v = vec![255u8];
        let mut out = vec![0u8; 12];
        yuv420p_to_rgb(&y, &u, &v, 2, 1, &mut out, 2, 2);
        assert!(out[0] > 240);
        assert!(out[2] < 20);
    }

    #[test]
    fn test_only_planar_420_accepted() {
        assert!(is_planar_420(PIX_FMT_YUV420P));
        assert!(is_planar_420(PIX_FMT_YUVJ420P));
        // nv12 = 23, yuyv422 = 1, yuvj422p = 13
        assert!(!is_planar_420(23));
        assert!(!is_planar_420(1));
        assert!(!is_planar_420(13));
    }
}
