//! # 合成例程
//!
//! ## 设计思路
//!
//! 纯函数式的单次合成：输入为模板位图、头像位图、像素版式与可选姓名，
//! 副作用仅限于传入的 `RenderTarget`。同样的输入两次调用得到逐字节一致的输出。
//!
//! ## 绘制顺序
//!
//! 1. 整体清空目标（含 alpha）
//! 2. 模板拉伸铺满画布（不保持宽高比、不留边）
//! 3. 头像取居中正方形裁剪：边长 `min(w, h)`
//! 4. （边框预设）先填充外扩 `border_width` 的不透明正方形
//! 5. 头像缩放到 `size × size`，以 `(center_x, center_y)` 为中心绘制
//! 6. （姓名预设）在头像下方按基线绘制居中姓名

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use rusttype::Font;

use super::pipeline::resize_exact;
use super::text::draw_text_centered;
use super::{ImageError, Placement, RenderTarget};

/// 单次合成的绘制风格。
#[derive(Clone, Copy)]
pub struct RenderStyle<'a> {
    pub filter: FilterType,
    pub name_color: Rgba<u8>,
    pub border_color: Rgba<u8>,
    pub font: Option<&'a Font<'static>>,
}

/// 居中正方形裁剪窗口：`(x, y, side)`。
pub fn center_square_crop(width: u32, height: u32) -> (u32, u32, u32) {
    let side = width.min(height);
    ((width - side) / 2, (height - side) / 2, side)
}

/// 将模板拉伸到 `width × height`。
///
/// `render` 收到已是画布尺寸的模板时直接铺底，调用方可预先缩放并缓存。
pub fn scale_template(
    template: &RgbaImage,
    width: u32,
    height: u32,
    filter: FilterType,
) -> Result<RgbaImage, ImageError> {
    resize_exact(template, width, height, filter)
}

/// 执行一次完整合成。
pub fn render(
    target: &mut RenderTarget,
    placement: &Placement,
    template: &RgbaImage,
    photo: &RgbaImage,
    name: Option<&str>,
    style: &RenderStyle<'_>,
) -> Result<(), ImageError> {
    if (target.width(), target.height()) != (placement.width, placement.height) {
        return Err(ImageError::InvalidFormat(format!(
            "渲染目标尺寸 {}x{} 与版式 {}x{} 不一致",
            target.width(),
            target.height(),
            placement.width,
            placement.height
        )));
    }
    ensure_non_empty("模板", template)?;
    ensure_non_empty("头像", photo)?;

    let text_job = match (placement.text, name.map(str::trim).filter(|n| !n.is_empty())) {
        (Some(text), Some(name)) => {
            let font = style
                .font
                .ok_or_else(|| ImageError::Font("绘制姓名需要先加载字体".to_string()))?;
            Some((text, name, font))
        }
        _ => None,
    };

    target.clear();

    if template.dimensions() == (placement.width, placement.height) {
        imageops::overlay(target.pixels_mut(), template, 0, 0);
    } else {
        let background = scale_template(template, placement.width, placement.height, style.filter)?;
        imageops::overlay(target.pixels_mut(), &background, 0, 0);
    }

    let (crop_x, crop_y, side) = center_square_crop(photo.width(), photo.height());
    let cropped = imageops::crop_imm(photo, crop_x, crop_y, side, side).to_image();
    let scaled = resize_exact(&cropped, placement.size, placement.size, style.filter)?;
    let (x, y) = placement.photo_origin();

    if let Some(border) = placement.border_width {
        let outer = placement.size + border * 2;
        let rect = Rect::at((x - border as i64) as i32, (y - border as i64) as i32).of_size(outer, outer);
        draw_filled_rect_mut(target.pixels_mut(), rect, style.border_color);
    }

    imageops::overlay(target.pixels_mut(), &scaled, x, y);

    if let Some((text, name, font)) = text_job {
        draw_text_centered(
            target.pixels_mut(),
            font,
            text.font_px,
            text.x,
            text.baseline_y,
            style.name_color,
            name,
        );
    }

    log::debug!(
        "🎨 合成完成 - 画布: {}x{} 头像: {}px @ ({}, {}) 裁剪: {}px@({}, {})",
        placement.width,
        placement.height,
        placement.size,
        x,
        y,
        side,
        crop_x,
        crop_y
    );

    Ok(())
}

fn ensure_non_empty(label: &str, image: &RgbaImage) -> Result<(), ImageError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ImageError::InvalidFormat(format!(
            "{}尺寸无效：{}x{}",
            label,
            image.width(),
            image.height()
        )));
    }
    Ok(())
}
