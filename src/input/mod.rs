/// 视频输入系统 (Video Input System)
///
/// - ImageDirSource: 图片目录 (离线回放/测试)
/// - CameraSource:   本地摄像头 (DirectShow/AVFoundation/V4L2,需要 camera 特性)
#[cfg(feature = "camera")]
pub mod camera;
#[cfg(feature = "camera")]
pub mod decode_filter;

#[cfg(feature = "camera")]
pub use camera::{get_camera_devices, CameraSource};

use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::{Error, Result};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// 帧来源
pub trait FrameSource: Send {
    /// 打开设备,失败时由调用方重试
    fn open(&mut self) -> Result<()>;

    /// 读取下一帧,`Ok(None)` 表示流已结束
    fn read(&mut self) -> Result<Option<RgbImage>>;

    fn close(&mut self);

    fn describe(&self) -> String;
}

/// 图片目录帧源 (按文件名排序)
pub struct ImageDirSource {
    dir: PathBuf,
    looping: bool,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl ImageDirSource {
    pub fn new(dir: impl Into<PathBuf>, looping: bool) -> Self {
        Self {
            dir: dir.into(),
            looping,
            files: Vec::new(),
            cursor: 0,
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl FrameSource for ImageDirSource {
    fn open(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| Error::CameraUnavailable(format!("{}: {}", self.dir.display(), e)))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && Self::is_image(p))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(Error::CameraUnavailable(format!(
                "{}: no images",
                self.dir.display()
            )));
        }
        tracing::info!("🖼️ 图片目录 {} ({} 帧)", self.dir.display(), files.len());
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<RgbImage>> {
        if self.cursor >= self.files.len() {
            if !self.looping || self.files.is_empty() {
                return Ok(None);
            }
            self.cursor = 0;
        }
        let path = &self.files[self.cursor];
        self.cursor += 1;
        let img = image::open(path)
            .map_err(|e| Error::Source(format!("{}: {}", path.display(), e)))?;
        Ok(Some(img.to_rgb8()))
    }

    fn close(&mut self) {
        self.files.clear();
        self.cursor = 0;
    }

    fn describe(&self) -> String {
        format!("dir:{}", self.dir.display())
    }
}

/// 根据参数构建帧源: `camera:<设备>` 或目录路径
pub fn open_source(source: &str, looping: bool) -> Result<Box<dyn FrameSource>> {
    if let Some(device) = source.strip_prefix("camera:") {
        #[cfg(feature = "camera")]
        {
            return Ok(Box::new(CameraSource::new(device)));
        }
        #[cfg(not(feature = "camera"))]
        {
            return Err(Error::Config(format!(
                "camera source 'camera:{}' requires the `camera` feature; \
                 rebuild with `--features camera` or pass an image directory, e.g. `--source ./frames`",
                device
            )));
        }
    }
    Ok(Box::new(ImageDirSource::new(source, looping)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cityeye-frames-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_frame(dir: &Path, name: &str, shade: u8) {
        RgbImage::from_pixel(4, 4, image::Rgb([shade, 0, 0]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_dir_source_sorted_and_filtered() {
        let dir = temp_dir("sorted");
        write_frame(&dir, "b.png", 20);
        write_frame(&dir, "a.png", 10);
        std::fs::write(dir.join("notes.txt"), "skip").unwrap();

        let mut src = ImageDirSource::new(&dir, false);
        src.open().unwrap();
        assert_eq!(src.files().len(), 2);
        assert_eq!(src.read().unwrap().unwrap().get_pixel(0, 0).0[0], 10);
        assert_eq!(src.read().unwrap().unwrap().get_pixel(0, 0).0[0], 20);
        assert!(src.read().unwrap().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_dir_source_loops() {
        let dir = temp_dir("loop");
        write_frame(&dir, "only.png", 7);
        let mut src = ImageDirSource::new(&dir, true);
        src.open().unwrap();
        for _ in 0..3 {
            assert!(src.read().unwrap().is_some());
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_empty_dir_is_unavailable() {
        let dir = temp_dir("empty");
        let mut src = ImageDirSource::new(&dir, false);
        assert!(matches!(src.open(), Err(Error::CameraUnavailable(_))));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_frame_is_source_error() {
        let dir = temp_dir("corrupt");
        std::fs::write(dir.join("bad.jpg"), b"not a jpeg").unwrap();
        let mut src = ImageDirSource::new(&dir, false);
        src.open().unwrap();
        assert!(matches!(src.read(), Err(Error::Source(_))));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(not(feature = "camera"))]
    #[test]
    fn test_default_camera_source_hints_directory() {
        use clap::Parser;
        let err = match open_source(&crate::Args::parse_from(["sentinel"]).source, false) {
            Err(e) => e,
            Ok(_) => panic!("camera source must fail without the camera feature"),
        };
        assert!(matches!(err, Error::Config(_)));
        let msg = err.to_string();
        assert!(msg.contains("--features camera"), "{}", msg);
        assert!(msg.contains("--source"), "{}", msg);
    }
}
