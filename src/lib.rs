#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod alert; // 告警去抖与置信度策略
pub mod annotate; // 打码与标注
pub mod config; // 命令行参数与调参文件
pub mod control; // 操作员指令与停止信号
pub mod detection; // 姿态估计与几何判定
pub mod error;
pub mod frame_bus; // 单槽帧总线
pub mod input; // 视频输入系统
pub mod notify; // 语音播报
pub mod pipeline; // 生产者流水线
pub mod status; // 状态快照与告警记录
pub mod stream; // MJPEG 推流
pub mod violation; // 违规状态机
pub mod web_api; // HTTP 接口

pub use crate::config::{Args, TuningConfig};
pub use crate::detection::{Keypoint, PoseSource, Skeleton};
pub use crate::error::{Error, Result};
pub use crate::frame_bus::{FrameBus, PublishedFrame};
pub use crate::input::FrameSource;
pub use crate::pipeline::{FrameOutcome, Pipeline, Producer};
pub use crate::status::{AlertRecord, PipelineState, StatusBoard, StatusExport, StatusSnapshot};
pub use crate::violation::{Command, ViolationKind, ViolationState};

