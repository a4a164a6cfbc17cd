//! 几何判定器 (Geometry Classifier)
//! 职责: 骨架序列 → 吸烟判定 (鼻尖-手腕距离启发式)
//!
//! 纯函数,无状态、无I/O

use super::types::{coco, Keypoint, Skeleton};

/// 距离阈值 (像素)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryThresholds {
    /// 低于该距离判定为吸烟
    pub smoking: f32,
    /// 低于该距离绘制引导线 (仅可视化)
    pub near: f32,
}

impl Default for GeometryThresholds {
    fn default() -> Self {
        Self {
            smoking: 160.0,
            near: 300.0,
        }
    }
}

/// 鼻尖 → 手腕引导线
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeadIn {
    pub from: Keypoint,
    pub to: Keypoint,
}

/// 单帧判定结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmokingVerdict {
    /// 第一个命中吸烟判定的骨架索引
    pub offender: Option<usize>,
    pub lead_ins: Vec<LeadIn>,
}

impl SmokingVerdict {
    pub fn is_smoking(&self) -> bool {
        self.offender.is_some()
    }
}

/// 鼻尖到手腕的距离,任一端点缺失时为无穷大
pub fn wrist_distance(nose: Option<Keypoint>, wrist: Option<Keypoint>) -> f32 {
    match (nose, wrist) {
        (Some(n), Some(w)) => n.distance(&w),
        _ => f32::INFINITY,
    }
}

/// 按检测顺序扫描骨架,第一个命中者即为吸烟者
pub fn classify(skeletons: &[Skeleton], thresholds: &GeometryThresholds) -> SmokingVerdict {
    let mut verdict = SmokingVerdict::default();

    for (idx, skeleton) in skeletons.iter().enumerate() {
        if skeleton.len() < coco::MIN_WRIST_KEYPOINTS {
            continue;
        }

        let nose = skeleton.get(coco::NOSE);
        let mut hit = false;
        for wrist_idx in [coco::LEFT_WRIST, coco::RIGHT_WRIST] {
            let wrist = skeleton.get(wrist_idx);
            let dist = wrist_distance(nose, wrist);
            if dist < thresholds.near {
                if let (Some(from), Some(to)) = (nose, wrist) {
                    verdict.lead_ins.push(LeadIn { from, to });
                }
            }
            hit |= dist < thresholds.smoking;
        }

        if hit {
            verdict.offender = Some(idx);
            break;
        }
    }

    verdict
}
