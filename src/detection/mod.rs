/// 检测系统 (Detection System)
///
/// - PoseSource: 姿态估计 (外部模型,黑盒)
/// - Geometry:   几何判定 (吸烟启发式)
pub mod geometry;
pub mod replay;
pub mod types;
#[cfg(feature = "onnx")]
pub mod yolov8_pose;

pub use geometry::{classify, GeometryThresholds, LeadIn, SmokingVerdict};
pub use replay::KeypointReplay;
pub use types::{coco, Keypoint, Skeleton};
#[cfg(feature = "onnx")]
pub use yolov8_pose::YoloV8Pose;

use image::RgbImage;

use crate::Result;

/// 姿态估计接口
///
/// 每帧调用一次,关键点置信度过滤在实现内部完成
pub trait PoseSource: Send {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Skeleton>>;

    fn name(&self) -> &str;
}

/// 空姿态源: 不检测任何人 (仅手动违规状态可用)
#[derive(Debug, Default)]
pub struct NoPose;

impl PoseSource for NoPose {
    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Skeleton>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "none"
    }
}
