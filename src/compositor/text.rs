//! # 姓名文字绘制
//!
//! ## 设计思路
//!
//! 等价于画布的 `fillText` + `textAlign = "center"`：
//! 按字形前进宽度（advance width）测量整行，以 `x` 为水平中心，`baseline_y` 为基线。
//! 字形覆盖率按 source-over 混合到目标像素上。
//!
//! 字体文件由调用方提供（如 Poppins Regular），本模块不内置字体。

use std::path::Path;
use std::sync::Arc;

use image::{Pixel, Rgba, RgbaImage};
use rusttype::{Font, Scale, point};

use super::ImageError;

/// 已加载的字体。
pub type FontFace = Arc<Font<'static>>;

/// 从文件加载 TTF/OTF 字体。
pub fn load_font(path: &Path) -> Result<FontFace, ImageError> {
    let bytes = std::fs::read(path)
        .map_err(|e| ImageError::Font(format!("无法读取字体文件 {}：{}", path.display(), e)))?;
    let font = font_from_bytes(bytes)?;
    log::info!("🔤 字体已加载 - {}", path.display());
    Ok(font)
}

pub fn font_from_bytes(bytes: Vec<u8>) -> Result<FontFace, ImageError> {
    Font::try_from_vec(bytes)
        .map(Arc::new)
        .ok_or_else(|| ImageError::Font("无法解析字体数据".to_string()))
}

/// 测量单行文字的前进宽度（含字距调整）。
pub fn measure_text_width(font: &Font<'static>, px: f32, text: &str) -> f32 {
    let scale = Scale::uniform(px);
    font.layout(text, scale, point(0.0, 0.0))
        .last()
        .map(|glyph| glyph.position().x + glyph.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0)
}

/// 以 `(center_x, baseline_y)` 为锚点水平居中绘制文字。
pub fn draw_text_centered(
    img: &mut RgbaImage,
    font: &Font<'static>,
    px: f32,
    center_x: f64,
    baseline_y: f64,
    color: Rgba<u8>,
    text: &str,
) {
    if text.is_empty() {
        return;
    }

    let scale = Scale::uniform(px);
    let width = measure_text_width(font, px, text);
    let origin = point(center_x as f32 - width / 2.0, baseline_y as f32);

    for glyph in font.layout(text, scale, origin) {
        let Some(bb) = glyph.pixel_bounding_box() else {
            continue;
        };

        glyph.draw(|gx, gy, coverage| {
            let x = gx as i32 + bb.min.x;
            let y = gy as i32 + bb.min.y;
            if x < 0 || y < 0 {
                return;
            }
            let (x, y) = (x as u32, y as u32);
            if x >= img.width() || y >= img.height() {
                return;
            }

            let alpha = (coverage.clamp(0.0, 1.0) * color.0[3] as f32).round() as u8;
            if alpha == 0 {
                return;
            }

            let src = Rgba([color.0[0], color.0[1], color.0[2], alpha]);
            img.get_pixel_mut(x, y).blend(&src);
        });
    }
}

/// 测试用字体：优先 `PROFILE_FRAME_TEST_FONT`，其次常见系统字体路径。
#[cfg(test)]
pub(crate) fn find_test_font() -> Option<FontFace> {
    const CANDIDATES: [&str; 4] = [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/Library/Fonts/Arial Unicode.ttf",
    ];

    std::env::var("PROFILE_FRAME_TEST_FONT")
        .ok()
        .into_iter()
        .chain(CANDIDATES.iter().map(|p| p.to_string()))
        .find_map(|path| load_font(Path::new(&path)).ok())
}
