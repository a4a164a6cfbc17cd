//! 关键点回放 (Keypoint Replay)
//!
//! 从 JSON Lines 文件读取预先录制的骨架: 每行一帧,
//! 格式为 `[[[x, y], ...], ...]` (人 → 关键点 → 坐标)。
//! 读到文件末尾后从头循环。

use std::fs;
use std::path::Path;

use image::RgbImage;

use super::{PoseSource, Skeleton};
use crate::{Error, Result};

pub struct KeypointReplay {
    frames: Vec<Vec<Skeleton>>,
    cursor: usize,
}

impl KeypointReplay {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let frames = Self::parse(&text)?;
        tracing::info!("🦴 关键点回放已加载: {} ({} 帧)", path.display(), frames.len());
        Ok(Self::new(frames))
    }

    pub fn new(frames: Vec<Vec<Skeleton>>) -> Self {
        Self { frames, cursor: 0 }
    }

    pub fn parse(text: &str) -> Result<Vec<Vec<Skeleton>>> {
        let mut frames = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let frame: Vec<Skeleton> = serde_json::from_str(line).map_err(|e| {
                Error::Pose(format!("replay line {}: {}", line_no + 1, e))
            })?;
            frames.push(frame);
        }
        Ok(frames)
    }
}

impl PoseSource for KeypointReplay {
    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Skeleton>> {
        if self.frames.is_empty() {
            return Ok(Vec::new());
        }
        let frame = self.frames[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        Ok(frame)
    }

    fn name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_blank_and_comments() {
        let text = "# recorded\n[[[1,2],[3,4]]]\n\n[]\n";
        let frames = KeypointReplay::parse(text).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][0].len(), 2);
        assert!(frames[1].is_empty());
    }

    #[test]
    fn test_parse_reports_line() {
        let err = KeypointReplay::parse("[]\n{oops").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_detect_cycles() {
        let frames = KeypointReplay::parse("[[[1,1]]]\n[]").unwrap();
        let mut replay = KeypointReplay::new(frames);
        let img = RgbImage::new(4, 4);
        assert_eq!(replay.detect(&img).unwrap().len(), 1);
        assert_eq!(replay.detect(&img).unwrap().len(), 0);
        assert_eq!(replay.detect(&img).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_replay_detects_nobody() {
        let mut replay = KeypointReplay::new(Vec::new());
        assert!(replay.detect(&RgbImage::new(2, 2)).unwrap().is_empty());
    }
}
