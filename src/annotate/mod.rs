/// 打码与标注引擎 (Redaction & Annotation Engine)
///
/// 绘制顺序: 引导线 → 头部 (框/模糊) → 闪烁边框 → 张贴 ROI → 乱扔横幅 → 状态栏 → 按键说明
pub mod draw;

use std::path::Path;

use ab_glyph::FontArc;
use image::RgbImage;

use crate::detection::{LeadIn, Skeleton};
use crate::violation::{ManualState, ViolationState};
use crate::{Error, Result};

use draw::*;

// ========== 公共常量 ==========

pub const BORDER_THICKNESS: u32 = 20;
pub const STATUS_BAR_HEIGHT: u32 = 60;
pub const BOX_THICKNESS: u32 = 3;
pub const LEAD_IN_THICKNESS: u32 = 2;
pub const LEGEND: &str = "Keys: L(Trash) K(PM) J(Flyer) U(Reset)";
pub const NORMAL_TEXT: &str = "NORMAL - Monitoring";

/// 像素区域 [x0, x1) × [y0, y1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Region {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn shrink(&self, by: u32) -> Self {
        Self::new(
            self.x0 + by,
            self.y0 + by,
            self.x1.saturating_sub(by),
            self.y1.saturating_sub(by),
        )
    }
}

/// 头部框外扩边距
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadMargins {
    pub horizontal: f32,
    pub up: f32,
    pub down: f32,
}

impl Default for HeadMargins {
    fn default() -> Self {
        Self {
            horizontal: 40.0,
            up: 60.0,
            down: 30.0,
        }
    }
}

/// 头部区域: 已检出头部关键点的外接框 + 边距,裁剪到画面内
///
/// 头部槽位不足 5 个或全部缺失时返回 None
pub fn head_box(skeleton: &Skeleton, width: u32, height: u32, margins: &HeadMargins) -> Option<Region> {
    if !skeleton.has_head_block() {
        return None;
    }
    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    let mut any = false;
    for kp in skeleton.head_points() {
        any = true;
        min_x = min_x.min(kp.x);
        min_y = min_y.min(kp.y);
        max_x = max_x.max(kp.x);
        max_y = max_y.max(kp.y);
    }
    if !any {
        return None;
    }

    let clamp = |v: f32, hi: u32| v.max(0.0).min(hi as f32) as u32;
    let region = Region::new(
        clamp(min_x - margins.horizontal, width),
        clamp(min_y - margins.up, height),
        clamp(max_x + margins.horizontal, width),
        clamp(max_y + margins.down, height),
    );
    (!region.is_empty()).then_some(region)
}

/// 边框闪烁 (约 4Hz)
pub fn border_on(millis: i64) -> bool {
    (millis * 8 / 1000) % 2 == 0
}

/// 张贴检测 ROI
pub fn clean_zone(width: u32, height: u32) -> Region {
    let w = width as f32;
    let h = height as f32;
    Region::new(
        (w * 0.65) as u32,
        (h * 0.2) as u32,
        (w * 0.95) as u32,
        (h * 0.7) as u32,
    )
}

/// 单帧标注输入
#[derive(Debug, Clone, Copy)]
pub struct AnnotationInput<'a> {
    pub skeletons: &'a [Skeleton],
    pub offender: Option<usize>,
    pub state: &'a ViolationState,
    pub lead_ins: &'a [LeadIn],
    pub confidence: u8,
    pub millis: i64,
}

/// 单帧标注结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationReport {
    pub blurred: Vec<usize>,
    pub boxed: Vec<usize>,
    pub border_on: bool,
}

pub struct Annotator {
    font: Option<FontArc>,
    margins: HeadMargins,
    blur_sigma: f32,
}

impl Annotator {
    pub fn new(font: Option<FontArc>, margins: HeadMargins, blur_sigma: f32) -> Self {
        Self {
            font,
            margins,
            blur_sigma,
        }
    }

    pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        FontArc::try_from_vec(data).map_err(|e| Error::Font(format!("{}: {}", path.display(), e)))
    }

    pub fn annotate(&self, frame: &mut RgbImage, input: &AnnotationInput) -> AnnotationReport {
        let (w, h) = frame.dimensions();
        let font = self.font.as_ref();
        let active = input.state.active_kind();
        let mut report = AnnotationReport::default();

        for lead in input.lead_ins {
            line(
                frame,
                (lead.from.x, lead.from.y),
                (lead.to.x, lead.to.y),
                YELLOW,
                LEAD_IN_THICKNESS,
            );
        }

        for (idx, skeleton) in input.skeletons.iter().enumerate() {
            let Some(region) = head_box(skeleton, w, h, &self.margins) else {
                continue;
            };
            let label_y = region.y0 as i32 - 24;
            if active.is_none() {
                thick_rect(frame, &region, GREEN, BOX_THICKNESS);
                report.boxed.push(idx);
            } else if input.offender == Some(idx) {
                thick_rect(frame, &region, RED, BOX_THICKNESS);
                text(
                    frame,
                    font,
                    region.x0 as i32,
                    label_y,
                    22.0,
                    RED,
                    &format!("CONF: {}%", input.confidence),
                );
                report.boxed.push(idx);
            } else {
                blur_region(frame, &region, self.blur_sigma);
                text(frame, font, region.x0 as i32, label_y, 20.0, PRIVACY_GRAY, "Privacy");
                report.blurred.push(idx);
            }
        }

        if active.is_some() {
            report.border_on = border_on(input.millis);
            if report.border_on {
                thick_rect(frame, &Region::new(0, 0, w, h), RED, BORDER_THICKNESS);
            }
        }

        match input.state.manual() {
            ManualState::UnauthorizedPosting => {
                let roi = clean_zone(w, h);
                thick_rect(frame, &roi, BLUE, BOX_THICKNESS);
                text(frame, font, roi.x0 as i32, roi.y0 as i32 - 28, 24.0, BLUE, "CLEAN ZONE (ROI)");
            }
            ManualState::Littering => {
                text(frame, font, 50, 150, 40.0, ORANGE, "TRASH DETECTED");
            }
            _ => {}
        }

        let bar = Region::new(0, 0, w, STATUS_BAR_HEIGHT.min(h));
        fill_rect(frame, &bar, BLACK);
        let (status, color) = match active {
            Some(kind) => (kind.status_text(), image::Rgb(kind.color())),
            None => (NORMAL_TEXT, GREEN),
        };
        text(frame, font, 20, 14, 32.0, color, status);
        text(frame, font, 20, h as i32 - 36, 22.0, WHITE, LEGEND);

        report
    }
}
