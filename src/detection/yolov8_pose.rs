// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! YOLOv8-Pose 推理后端 (ONNX Runtime)
//!
//! 输入: letterbox 缩放后的 RGB 帧 `[1, 3, H, W]`
//! 输出: `[1, 4 + 1 + 17*3, anchors]`,每个 anchor 为 cxcywh + 人物置信度 + 关键点

use std::path::Path;

use image::{imageops::FilterType, RgbImage};
use ndarray::{s, Array, ArrayView, Axis, IxDyn};
use ort::{GraphOptimizationLevel, Session};

use super::{coco, Keypoint, PoseSource, Skeleton};
use crate::{Error, Result};

const CXYWH_OFFSET: usize = 4;
const KPT_STEP: usize = 3;

/// 候选框 (NMS 用)
#[derive(Debug, Clone)]
struct Candidate {
    xmin: f32,
    ymin: f32,
    width: f32,
    height: f32,
    confidence: f32,
    skeleton: Skeleton,
}

impl Candidate {
    fn area(&self) -> f32 {
        self.width * self.height
    }

    fn intersection_area(&self, other: &Candidate) -> f32 {
        let l = self.xmin.max(other.xmin);
        let r = (self.xmin + self.width).min(other.xmin + other.width);
        let t = self.ymin.max(other.ymin);
        let b = (self.ymin + self.height).min(other.ymin + other.height);
        (r - l).max(0.) * (b - t).max(0.)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let inter = self.intersection_area(other);
        inter / (self.area() + other.area() - inter)
    }
}

pub struct YoloV8Pose {
    session: Session,
    input_name: String,
    width: u32,
    height: u32,
    conf: f32,
    kconf: f32,
    iou: f32,
}

impl YoloV8Pose {
    pub fn new(model: impl AsRef<Path>, kconf: f32) -> Result<Self> {
        let model = model.as_ref();
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(model))
            .map_err(|e| Error::Pose(format!("{}: {}", model.display(), e)))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| Error::Pose("model has no inputs".to_string()))?;
        let input_name = input.name.clone();

        // 动态尺寸模型回退到 640x640
        let (height, width) = match &input.input_type {
            ort::ValueType::Tensor { dimensions, .. } if dimensions.len() == 4 => {
                let h = if dimensions[2] > 0 { dimensions[2] as u32 } else { 640 };
                let w = if dimensions[3] > 0 { dimensions[3] as u32 } else { 640 };
                (h, w)
            }
            _ => (640, 640),
        };

        tracing::info!(
            "🧍 姿态模型已加载: {} (输入 {} {}x{}, kconf={})",
            model.display(),
            input_name,
            width,
            height,
            kconf
        );

        Ok(Self {
            session,
            input_name,
            width,
            height,
            conf: 0.5,
            kconf,
            iou: 0.45,
        })
    }

    fn scale_wh(&self, w0: f32, h0: f32) -> (f32, f32, f32) {
        let r = (self.width as f32 / w0).min(self.height as f32 / h0);
        (r, (w0 * r).round(), (h0 * r).round())
    }

    fn preprocess(&self, frame: &RgbImage) -> Vec<f32> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut ys = vec![144.0 / 255.0; 3 * h * w];
        let (_, w_new, h_new) = self.scale_wh(frame.width() as f32, frame.height() as f32);
        let img = image::imageops::resize(frame, w_new as u32, h_new as u32, FilterType::Triangle);

        for (x, y, rgb) in img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b] = rgb.0;
            ys[y * w + x] = r as f32 / 255.0;
            ys[h * w + y * w + x] = g as f32 / 255.0;
            ys[2 * h * w + y * w + x] = b as f32 / 255.0;
        }
        ys
    }

    fn postprocess(&self, preds: ArrayView<f32, IxDyn>, w0: f32, h0: f32) -> Result<Vec<Skeleton>> {
        let ratio = (self.width as f32 / w0).min(self.height as f32 / h0);
        let nk = coco::NUM_KEYPOINTS;

        let mut data: Vec<Candidate> = Vec::new();
        // [1, C, N] → 取第一帧
        let anchor = preds.index_axis(Axis(0), 0);
        if anchor.shape()[0] < CXYWH_OFFSET + 1 + KPT_STEP * nk {
            return Err(Error::Pose(format!("unexpected output shape {:?}", preds.shape())));
        }

        for pred in anchor.axis_iter(Axis(1)) {
            let confidence = pred[CXYWH_OFFSET];
            if confidence < self.conf {
                continue;
            }
            let bbox = pred.slice(s![0..CXYWH_OFFSET]);
            let kpts = pred.slice(s![pred.len() - KPT_STEP * nk..]);

            let w = bbox[2] / ratio;
            let h = bbox[3] / ratio;
            let x = bbox[0] / ratio - w / 2.;
            let y = bbox[1] / ratio - h / 2.;

            let mut points = Vec::with_capacity(nk);
            for i in 0..nk {
                let kx = kpts[KPT_STEP * i] / ratio;
                let ky = kpts[KPT_STEP * i + 1] / ratio;
                let kconf = kpts[KPT_STEP * i + 2];
                if kconf < self.kconf {
                    points.push(Keypoint::ABSENT);
                } else {
                    points.push(Keypoint::new(kx.max(0.0).min(w0), ky.max(0.0).min(h0)));
                }
            }

            data.push(Candidate {
                xmin: x.max(0.0).min(w0),
                ymin: y.max(0.0).min(h0),
                width: w,
                height: h,
                confidence,
                skeleton: Skeleton::new(points),
            });
        }

        non_max_suppression(&mut data, self.iou);
        Ok(data.into_iter().map(|c| c.skeleton).collect())
    }
}

fn non_max_suppression(xs: &mut Vec<Candidate>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].iou(&xs[index]) > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

impl PoseSource for YoloV8Pose {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Skeleton>> {
        let xs = self.preprocess(frame);
        let shape = [1usize, 3, self.height as usize, self.width as usize];
        let tensor = ort::Tensor::from_array((shape, xs.into_boxed_slice()))
            .map_err(|e| Error::Pose(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor].map_err(|e| Error::Pose(e.to_string()))?)
            .map_err(|e| Error::Pose(e.to_string()))?;

        let (dims, raw) = outputs[0]
            .try_extract_raw_tensor::<f32>()
            .map_err(|e| Error::Pose(e.to_string()))?;
        let dims: Vec<usize> = dims.iter().map(|&d| d.max(0) as usize).collect();
        let preds = Array::from_shape_vec(IxDyn(&dims), raw.to_vec())
            .map_err(|e| Error::Pose(e.to_string()))?;

        self.postprocess(preds.view(), frame.width() as f32, frame.height() as f32)
    }

    fn name(&self) -> &str {
        "yolov8-pose"
    }
}
