//! 配置 - 命令行参数 + JSON 调参文件

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::annotate::HeadMargins;
use crate::detection::GeometryThresholds;
use crate::status::DEFAULT_LIVE_LOCATION;
use crate::stream::StreamSettings;

/// 城市之眼 违规监控服务参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "城市之眼 - 单摄像头违规监控服务", long_about = None)]
pub struct Args {
    /// 帧来源: `camera:<设备>` 或图片目录
    #[arg(short, long, default_value = "camera:0")]
    pub source: String,

    /// 图片目录播放完后从头循环
    #[arg(long, default_value_t = false)]
    pub loop_frames: bool,

    /// YOLOv8-pose ONNX 模型 (需要 onnx 特性)
    #[arg(long)]
    pub pose_model: Option<PathBuf>,

    /// 关键点回放文件 (JSON Lines)
    #[arg(long)]
    pub keypoints: Option<PathBuf>,

    /// 标注字体 (TTF/OTF),缺省时不绘制文字
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// HTTP 监听地址
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP 端口
    #[arg(short, long, default_value_t = 8000)]
    pub port: u16,

    /// 调参文件
    #[arg(long, default_value = "cityeye_tuning.json")]
    pub tuning: PathBuf,

    /// 预置演示历史记录
    #[arg(long, default_value_t = false)]
    pub demo_history: bool,

    /// 关闭键盘控制
    #[arg(long, default_value_t = false)]
    pub no_keyboard: bool,

    /// 外部 TTS 命令 (播报语句作为最后一个参数)
    #[arg(long)]
    pub tts_command: Option<String>,

    /// 关键点置信度阈值
    #[arg(long, default_value_t = 0.5)]
    pub kconf: f32,

    /// 置信度随机种子
    #[arg(long)]
    pub seed: Option<u64>,
}

/// 调参配置 (所有数值策略)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    // === 几何判定 ===
    pub smoking_threshold_px: f32, // 吸烟判定距离
    pub near_threshold_px: f32,    // 引导线距离

    // === 打码 ===
    pub head_margin_x: f32,    // 头部框水平外扩
    pub head_margin_up: f32,   // 头部框向上外扩
    pub head_margin_down: f32, // 头部框向下外扩
    pub blur_sigma: f32,       // 高斯模糊 sigma

    // === 告警 ===
    pub cooldown_secs: f64,  // 告警冷却
    pub log_smoking: bool,   // 吸烟是否生成记录
    pub confidence_min: u8,  // 演示置信度下限
    pub confidence_max: u8,  // 演示置信度上限
    pub live_location: String,

    // === 采集 ===
    pub mirror: bool,             // 水平镜像
    pub frame_sleep_ms: u64,      // 每帧间隔
    pub max_read_failures: u32,   // 连续读帧失败上限
    pub open_retries: u32,        // 打开摄像头重试次数
    pub open_backoff_ms: u64,     // 初始退避
    pub open_backoff_max_ms: u64, // 最大退避

    // === 推流 ===
    pub jpeg_quality: u8,
    pub viewer_poll_ms: u64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            smoking_threshold_px: 160.0,
            near_threshold_px: 300.0,

            head_margin_x: 40.0,
            head_margin_up: 60.0,
            head_margin_down: 30.0,
            blur_sigma: 30.0,

            cooldown_secs: 3.0,
            log_smoking: false,
            confidence_min: 97,
            confidence_max: 99,
            live_location: DEFAULT_LIVE_LOCATION.to_string(),

            mirror: true,
            frame_sleep_ms: 10,
            max_read_failures: 3,
            open_retries: 5,
            open_backoff_ms: 1000,
            open_backoff_max_ms: 8000,

            jpeg_quality: 80,
            viewer_poll_ms: 100,
        }
    }
}

impl TuningConfig {
    /// 从JSON文件加载配置,文件不存在时写出默认值
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    tracing::info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("⚠️ 配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                config.save(path);
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    tracing::error!("❌ 保存配置失败: {}", e);
                } else {
                    tracing::info!("💾 配置已保存到 {}", path.display());
                }
            }
            Err(e) => tracing::error!("❌ 序列化配置失败: {}", e),
        }
    }

    pub fn thresholds(&self) -> GeometryThresholds {
        GeometryThresholds {
            smoking: self.smoking_threshold_px,
            near: self.near_threshold_px,
        }
    }

    pub fn margins(&self) -> HeadMargins {
        HeadMargins {
            horizontal: self.head_margin_x,
            up: self.head_margin_up,
            down: self.head_margin_down,
        }
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            jpeg_quality: self.jpeg_quality,
            poll: Duration::from_millis(self.viewer_poll_ms.max(1)),
        }
    }

    pub fn frame_sleep(&self) -> Duration {
        Duration::from_millis(self.frame_sleep_ms)
    }

    /// 第 `attempt` 次 (从 0 开始) 重试前的退避时间
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ms = self
            .open_backoff_ms
            .saturating_mul(1u64 << attempt.min(20))
            .min(self.open_backoff_max_ms);
        Duration::from_millis(ms)
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        tracing::info!(
            "🎛️ 吸烟阈值 {}px / 引导线 {}px, 冷却 {:.1}s, 模糊 sigma {}, JPEG {}",
            self.smoking_threshold_px,
            self.near_threshold_px,
            self.cooldown_secs,
            self.blur_sigma,
            self.jpeg_quality
        );
    }
}
