/// 姿态检测数据结构定义
/// Data structures for pose detection
use serde::{Deserialize, Serialize};

// ========== 公共常量 ==========

/// COCO 17关键点布局
pub mod coco {
    pub const NOSE: usize = 0;
    pub const LEFT_EYE: usize = 1;
    pub const RIGHT_EYE: usize = 2;
    pub const LEFT_EAR: usize = 3;
    pub const RIGHT_EAR: usize = 4;
    pub const LEFT_WRIST: usize = 9;
    pub const RIGHT_WRIST: usize = 10;

    /// 头部关键点数量 (鼻子、双眼、双耳)
    pub const HEAD_KEYPOINTS: usize = 5;
    /// 手腕判定所需的最少关键点数 (0..=10)
    pub const MIN_WRIST_KEYPOINTS: usize = RIGHT_WRIST + 1;
    /// 完整骨架关键点数
    pub const NUM_KEYPOINTS: usize = 17;
}

// ========== 数据结构 ==========

/// 姿态关键点 (像素坐标)
///
/// 坐标 (0, 0) 为哨兵值,表示该关键点未检出
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
}

impl Keypoint {
    pub const ABSENT: Keypoint = Keypoint { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_absent(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    /// 两点间欧氏距离
    pub fn distance(&self, other: &Keypoint) -> f32 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

impl From<[f32; 2]> for Keypoint {
    fn from(xy: [f32; 2]) -> Self {
        Self::new(xy[0], xy[1])
    }
}

impl From<Keypoint> for [f32; 2] {
    fn from(kp: Keypoint) -> Self {
        [kp.x, kp.y]
    }
}

/// 单人骨架 (一帧内一个人的全部关键点)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Skeleton {
    points: Vec<Keypoint>,
}

impl Skeleton {
    pub fn new(points: Vec<Keypoint>) -> Self {
        Self { points }
    }

    pub fn from_xy(points: &[(f32, f32)]) -> Self {
        Self::new(points.iter().map(|&(x, y)| Keypoint::new(x, y)).collect())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Keypoint] {
        &self.points
    }

    /// 获取已检出的关键点 (越界或哨兵值返回 None)
    pub fn get(&self, idx: usize) -> Option<Keypoint> {
        self.points.get(idx).copied().filter(|kp| !kp.is_absent())
    }

    /// 是否包含完整的头部关键点槽位
    pub fn has_head_block(&self) -> bool {
        self.points.len() >= coco::HEAD_KEYPOINTS
    }

    /// 头部已检出的关键点
    pub fn head_points(&self) -> impl Iterator<Item = Keypoint> + '_ {
        self.points
            .iter()
            .take(coco::HEAD_KEYPOINTS)
            .copied()
            .filter(|kp| !kp.is_absent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_sentinel() {
        assert!(Keypoint::ABSENT.is_absent());
        assert!(!Keypoint::new(0.0, 5.0).is_absent());
        assert!(!Keypoint::new(3.0, 0.0).is_absent());
    }

    #[test]
    fn test_get_filters_absent_and_out_of_range() {
        let sk = Skeleton::from_xy(&[(10.0, 10.0), (0.0, 0.0)]);
        assert_eq!(sk.get(0), Some(Keypoint::new(10.0, 10.0)));
        assert_eq!(sk.get(1), None);
        assert_eq!(sk.get(7), None);
    }

    #[test]
    fn test_replay_json_shape() {
        let sk: Skeleton = serde_json::from_str("[[1.0, 2.0], [0, 0]]").unwrap();
        assert_eq!(sk.len(), 2);
        assert!(sk.points()[1].is_absent());
        assert_eq!(serde_json::to_string(&sk).unwrap(), "[[1.0,2.0],[0.0,0.0]]");
    }
}
