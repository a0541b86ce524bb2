//! # 渲染目标
//!
//! 固定尺寸的 RGBA 像素缓冲，对应页面中可复用的画布。
//! 每次合成前整体清空（含 alpha），不做增量更新。

use image::{Rgba, RgbaImage};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// 可复用的绘制表面。
#[derive(Debug, Clone)]
pub struct RenderTarget {
    pixels: RgbaImage,
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, TRANSPARENT),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// 整体清空为全透明。
    pub fn clear(&mut self) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = TRANSPARENT;
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    /// 复制当前内容，目标本身继续复用。
    pub fn snapshot(&self) -> RgbaImage {
        self.pixels.clone()
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }
}
