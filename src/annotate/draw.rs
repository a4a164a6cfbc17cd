/// 绘制原语 (imageproc + ab_glyph)
/// Drawing primitives
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;

use super::Region;

// ========== 颜色 (RGB) ==========

pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
pub const ORANGE: Rgb<u8> = Rgb([255, 165, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
pub const PRIVACY_GRAY: Rgb<u8> = Rgb([200, 200, 200]);

fn to_rect(r: &Region) -> Option<Rect> {
    if r.is_empty() {
        return None;
    }
    Some(Rect::at(r.x0 as i32, r.y0 as i32).of_size(r.width(), r.height()))
}

/// 粗边框 (向内收缩绘制多层)
pub fn thick_rect(img: &mut RgbImage, region: &Region, color: Rgb<u8>, thickness: u32) {
    for t in 0..thickness {
        let inner = region.shrink(t);
        match to_rect(&inner) {
            Some(rect) => draw_hollow_rect_mut(img, rect, color),
            None => break,
        }
    }
}

pub fn fill_rect(img: &mut RgbImage, region: &Region, color: Rgb<u8>) {
    if let Some(rect) = to_rect(region) {
        draw_filled_rect_mut(img, rect, color);
    }
}

/// 粗线段 (沿法向平移叠加)
pub fn line(img: &mut RgbImage, from: (f32, f32), to: (f32, f32), color: Rgb<u8>, thickness: u32) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let len = (dx * dx + dy * dy).sqrt().max(1e-3);
    let (nx, ny) = (-dy / len, dx / len);
    let half = thickness as f32 / 2.0;
    for i in 0..thickness.max(1) {
        let off = i as f32 - half + 0.5;
        draw_line_segment_mut(
            img,
            (from.0 + nx * off, from.1 + ny * off),
            (to.0 + nx * off, to.1 + ny * off),
            color,
        );
    }
}

/// 文字 (无字体时跳过)
pub fn text(img: &mut RgbImage, font: Option<&FontArc>, x: i32, y: i32, size: f32, color: Rgb<u8>, s: &str) {
    if let Some(font) = font {
        draw_text_mut(img, color, x, y, PxScale::from(size), font, s);
    }
}

/// 原地高斯模糊 (不可逆,原始像素不保留)
pub fn blur_region(img: &mut RgbImage, region: &Region, sigma: f32) {
    if region.is_empty() {
        return;
    }
    let sub = image::imageops::crop_imm(img, region.x0, region.y0, region.width(), region.height())
        .to_image();
    let blurred = imageproc::filter::gaussian_blur_f32(&sub, sigma.max(0.1));
    image::imageops::replace(img, &blurred, region.x0 as i64, region.y0 as i64);
}
