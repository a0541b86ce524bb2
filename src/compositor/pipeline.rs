//! # 解码与缩放流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像 → RGBA”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//! 同时承载合成阶段复用的精确缩放能力（模板铺满、头像缩放）。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸
//! 2. 拒绝零尺寸，按像素与内存上限快速拒绝
//! 3. 完整解码并应用 EXIF 方向（与浏览器 `<img>` 行为一致）
//! 4. 转换 RGBA，并校验字节长度一致性

use fast_image_resize as fr;
use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, ImageDecoder, ImageReader, Rgba, RgbaImage};
use std::io::Cursor;

use super::source::RawImageData;
use super::{CompositorConfig, DecodedImage, FrameHandler, ImageError};

impl FrameHandler {
    /// 将原始字节解码为不可变 RGBA 位图。
    pub(crate) fn decode_image(
        &self,
        raw: RawImageData,
        config: &CompositorConfig,
    ) -> Result<DecodedImage, ImageError> {
        let (header_width, header_height) = inspect_dimensions_from_memory(&raw.bytes)?;
        validate_dimensions(config, header_width, header_height)?;

        let reader = ImageReader::new(Cursor::new(&raw.bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;
        let mut decoder = reader
            .into_decoder()
            .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;
        let orientation = decoder
            .orientation()
            .map_err(|e| ImageError::Decode(format!("读取图片方向失败：{}", e)))?;
        let mut decoded = DynamicImage::from_decoder(decoder)
            .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;
        decoded.apply_orientation(orientation);

        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        validate_dimensions(config, width, height)?;

        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| ImageError::ResourceLimit("图片尺寸导致内存溢出风险".to_string()))?;

        if rgba.as_raw().len() != expected_len {
            return Err(ImageError::Decode("解码后像素数据长度异常".to_string()));
        }

        log::debug!(
            "🧩 解码完成 - 来源: {} 原始尺寸: {}x{} 输出尺寸: {}x{}",
            raw.source_hint,
            header_width,
            header_height,
            width,
            height
        );

        Ok(DecodedImage::new(rgba))
    }
}

/// 仅通过内存中的图片头信息读取宽高。
///
/// 用于在完整解码前做像素限制检查。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

    reader
        .into_dimensions()
        .map_err(|e| ImageError::InvalidFormat(format!("无法读取图片尺寸：{}", e)))
}

fn validate_dimensions(config: &CompositorConfig, width: u32, height: u32) -> Result<(), ImageError> {
    if width == 0 || height == 0 {
        return Err(ImageError::InvalidFormat(format!(
            "图片尺寸无效：{}x{}",
            width, height
        )));
    }

    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > config.max_decoded_pixels {
        return Err(ImageError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    let estimated = pixels
        .checked_mul(4)
        .ok_or_else(|| ImageError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

    if estimated > config.max_decoded_bytes {
        return Err(ImageError::ResourceLimit(format!(
            "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
            estimated as f64 / 1024.0 / 1024.0,
            config.max_decoded_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(())
}

/// 将位图精确缩放到 `width × height`，不保持宽高比。
///
/// 尺寸一致时直接复制，保证像素逐字节不变。
pub fn resize_exact(
    image: &RgbaImage,
    width: u32,
    height: u32,
    filter: FilterType,
) -> Result<RgbaImage, ImageError> {
    if width == 0 || height == 0 || image.width() == 0 || image.height() == 0 {
        return Err(ImageError::InvalidFormat(format!(
            "无法缩放零尺寸图片：{}x{} -> {}x{}",
            image.width(),
            image.height(),
            width,
            height
        )));
    }

    if image.dimensions() == (width, height) {
        return Ok(image.clone());
    }

    match resize_with_fast_image_resize(image, width, height, filter) {
        Ok(resized) => Ok(resized),
        Err(err) => {
            log::warn!(
                "⚠️ fast_image_resize 缩放失败，回退 image::resize：{}",
                err
            );
            Ok(image::imageops::resize(image, width, height, filter))
        }
    }
}

fn resize_with_fast_image_resize(
    image: &RgbaImage,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> Result<RgbaImage, ImageError> {
    let (src_width, src_height) = image.dimensions();

    let src_image = fr::images::Image::from_vec_u8(
        src_width,
        src_height,
        image.as_raw().clone(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| ImageError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let options = if filter == FilterType::Nearest {
        fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Nearest)
    } else {
        fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(to_fast_filter(filter)))
    };

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| ImageError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

    ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| ImageError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))
}

fn to_fast_filter(filter: FilterType) -> fr::FilterType {
    match filter {
        FilterType::Nearest => fr::FilterType::Box,
        FilterType::Triangle => fr::FilterType::Bilinear,
        FilterType::CatmullRom => fr::FilterType::CatmullRom,
        FilterType::Gaussian => fr::FilterType::Mitchell,
        FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;

    fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let r = (x % 255) as u8;
            let g = (y % 255) as u8;
            let b = ((x + y) % 255) as u8;
            Rgba([r, g, b, 255])
        });

        let dyn_img = DynamicImage::ImageRgba8(img);
        let mut cursor = Cursor::new(Vec::new());
        dyn_img
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    fn raw(bytes: Vec<u8>) -> RawImageData {
        RawImageData {
            bytes,
            declared_mime: Some("image/png".into()),
            source_hint: "test",
        }
    }

    #[test]
    fn decode_keeps_source_dimensions() {
        let handler = FrameHandler::new(CompositorConfig::default()).expect("handler init failed");
        let config = handler.config_snapshot().expect("config snapshot failed");

        let decoded = handler
            .decode_image(raw(create_png_bytes(1000, 1500)), &config)
            .expect("decode should succeed");

        assert_eq!((decoded.width(), decoded.height()), (1000, 1500));
        assert_eq!(decoded.image.as_raw().len(), 1000 * 1500 * 4);
    }

    #[test]
    fn stress_rejects_too_many_pixels() {
        let mut config = CompositorConfig::default();
        config.max_decoded_pixels = 1_000_000;

        let handler = FrameHandler::new(config).expect("handler init failed");
        let config = handler.config_snapshot().expect("config snapshot failed");

        let result = handler.decode_image(raw(create_png_bytes(2000, 2000)), &config);

        assert!(matches!(result, Err(ImageError::ResourceLimit(_))));
    }

    #[test]
    fn decode_rejects_garbage_bytes() {
        let handler = FrameHandler::new(CompositorConfig::default()).expect("handler init failed");
        let config = handler.config_snapshot().expect("config snapshot failed");

        let result = handler.decode_image(raw(b"definitely not an image".to_vec()), &config);
        assert!(result.is_err());
    }

    #[test]
    fn resize_exact_is_identity_at_same_size() {
        let img = ImageBuffer::from_fn(7, 5, |x, y| Rgba([x as u8 * 30, y as u8 * 40, 9, 200]));
        let out = resize_exact(&img, 7, 5, FilterType::Lanczos3).expect("resize failed");
        assert_eq!(out, img);
    }

    #[test]
    fn resize_exact_hits_requested_size() {
        let img = ImageBuffer::from_pixel(300, 200, Rgba([10, 20, 30, 255]));
        let out = resize_exact(&img, 64, 128, FilterType::Triangle).expect("resize failed");
        assert_eq!(out.dimensions(), (64, 128));
        let px = out.get_pixel(32, 64);
        for (got, want) in px.0.iter().zip([10u8, 20, 30, 255]) {
            assert!(got.abs_diff(want) <= 1, "pixel {:?}", px);
        }
    }

    #[test]
    fn resize_exact_rejects_zero_sizes() {
        let img = RgbaImage::new(0, 10);
        assert!(matches!(
            resize_exact(&img, 10, 10, FilterType::Triangle),
            Err(ImageError::InvalidFormat(_))
        ));
    }
}
