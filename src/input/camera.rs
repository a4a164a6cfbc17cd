//! 摄像头输入模块
//!
//! 处理本地摄像头输入,支持 DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux)

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;

use super::decode_filter::DecodeFilter;
use super::FrameSource;
use crate::{Error, Result};

const READ_TIMEOUT: Duration = Duration::from_secs(2);
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// 摄像头帧源
pub struct CameraSource {
    device: String,
    frames: Option<Receiver<RgbImage>>,
    worker: Option<JoinHandle<()>>,
}

impl CameraSource {
    /// `device` 为设备索引或设备名称
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            frames: None,
            worker: None,
        }
    }

    /// 格式化摄像头URL - 根据平台选择
    fn format_camera_url(device: &str) -> String {
        let index = device.parse::<usize>().ok();

        #[cfg(target_os = "windows")]
        {
            let name = index
                .and_then(|i| get_camera_devices().into_iter().find(|(idx, _)| *idx == i))
                .map(|(_, name)| name)
                .unwrap_or_else(|| device.to_string());
            format!("video={}", name)
        }
        #[cfg(target_os = "linux")]
        {
            match index {
                Some(i) => format!("/dev/video{}", i),
                None => device.to_string(),
            }
        }
        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            let _ = index;
            device.to_string()
        }
    }

    fn input_format() -> &'static str {
        #[cfg(target_os = "windows")]
        let format = "dshow"; // DirectShow

        #[cfg(target_os = "macos")]
        let format = "avfoundation"; // AVFoundation

        #[cfg(target_os = "linux")]
        let format = "v4l2"; // Video4Linux2

        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        let format = "video4linux2"; // 默认

        format
    }
}

impl FrameSource for CameraSource {
    fn open(&mut self) -> Result<()> {
        self.close();

        let url = Self::format_camera_url(&self.device);
        let format = Self::input_format();
        tracing::info!("🎥 打开摄像头: {} (格式 {})", url, format);

        let (tx, rx) = bounded::<RgbImage>(2);
        let (ready_tx, ready_rx) = bounded::<std::result::Result<(), String>>(1);
        let filter = DecodeFilter::new(tx);

        let worker = thread::Builder::new()
            .name("camera-decode".to_string())
            .spawn(move || {
                // 构建帧处理管线
                let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
                let pipe = pipe.filter("decode", Box::new(filter));
                let out = create_null_output().add_frame_pipeline(pipe);

                // 不强制分辨率和帧率,由设备协商默认值
                let input = Input::new(url.as_str()).set_format(format);

                let sch = match FfmpegContext::builder()
                    .input(input)
                    .filter_desc("format=yuv420p")
                    .output(out)
                    .build()
                    .and_then(|ctx| ctx.start())
                {
                    Ok(sch) => sch,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                tracing::info!("✅ 摄像头连接成功,开始解码!");

                // 等待解码完成
                let _ = sch.wait();
                tracing::info!("📹 摄像头解码循环结束");
            })?;

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => {
                self.frames = Some(rx);
                self.worker = Some(worker);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(Error::CameraUnavailable(e))
            }
            Err(_) => {
                drop(rx);
                Err(Error::CameraUnavailable(format!("{}: open timed out", self.device)))
            }
        }
    }

    fn read(&mut self) -> Result<Option<RgbImage>> {
        let Some(frames) = &self.frames else {
            return Err(Error::Source("camera not opened".to_string()));
        };
        match frames.recv_timeout(READ_TIMEOUT) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Err(Error::Source("camera read timed out".to_string())),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Source("camera stream ended".to_string())),
        }
    }

    fn close(&mut self) {
        // 关闭接收端后,解码滤镜下一帧返回错误,FFmpeg 随之退出
        self.frames = None;
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() && worker.join().is_err() {
                tracing::warn!("⚠️ 摄像头解码线程异常退出");
            }
        }
    }

    fn describe(&self) -> String {
        format!("camera:{}", self.device)
    }
}

/// 获取可用的摄像头设备列表
pub fn get_camera_devices() -> Vec<(usize, String)> {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => devices.into_iter().enumerate().collect(),
        Err(e) => {
            tracing::warn!("⚠️ 获取摄像头列表失败: {}", e);
            vec![]
        }
    }
}
