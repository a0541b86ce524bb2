//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `FrameHandler` 只负责“加载 → 校验 → 解码”流程编排与配置管理，不持有会话状态。
//! 处理链路固定为：
//! 1. 读取配置快照
//! 2. 按来源加载原始字节
//! 3. 按上传策略校验（类型白名单 + 体积）
//! 4. 解码为 RGBA 位图
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<CompositorConfig>>` 支持运行时动态切档。
//! - 单次请求内使用“同一配置快照”，避免处理中途配置漂移。
//! - 记录 `load/decode/total` 阶段耗时，便于性能诊断。

use std::sync::{Arc, RwLock};
use std::time::Instant;

use super::source::RawImageData;
use super::{CompositorConfig, DecodedImage, ImageError, ImageSource, SmoothingQuality, UploadPolicy};

const MIN_UPLOAD_LIMIT: u64 = 64 * 1024;
const MAX_UPLOAD_LIMIT: u64 = 50 * 1024 * 1024;

/// 图片加载处理器。
pub struct FrameHandler {
    pub(super) config: Arc<RwLock<CompositorConfig>>,
    pub(super) http_client: reqwest::Client,
}

impl FrameHandler {
    /// 根据初始配置创建处理器。
    ///
    /// 这里同时构建复用型 HTTP 客户端，减少每次请求的初始化开销。
    pub fn new(config: CompositorConfig) -> Result<Self, ImageError> {
        let http_client = Self::build_http_client(&config)?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            http_client,
        })
    }

    /// 获取配置快照。
    ///
    /// 作用：保证单次请求链路使用一致参数。
    pub fn config_snapshot(&self) -> Result<CompositorConfig, ImageError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| ImageError::Internal("配置读取锁已中毒".to_string()))
    }

    /// 设置平滑档位。
    pub fn set_smoothing_quality(&self, quality: SmoothingQuality) -> Result<(), ImageError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| ImageError::Internal("配置写入锁已中毒".to_string()))?;
        config.apply_smoothing_quality(quality);

        log::info!(
            "⚙️ 已切换平滑档位：{}（filter={:?}）",
            quality.as_str(),
            config.resize_filter
        );

        Ok(())
    }

    /// 获取当前生效档位。
    pub fn smoothing_quality(&self) -> Result<SmoothingQuality, ImageError> {
        let config = self
            .config
            .read()
            .map_err(|_| ImageError::Internal("配置读取锁已中毒".to_string()))?;
        Ok(config.smoothing_quality)
    }

    /// 调整严格模式下的上传体积上限。
    pub fn set_upload_limit(&self, max_upload_size: u64) -> Result<(), ImageError> {
        if !(MIN_UPLOAD_LIMIT..=MAX_UPLOAD_LIMIT).contains(&max_upload_size) {
            return Err(ImageError::InvalidFormat(format!(
                "max_upload_size 必须在 {}KB~{}MB 之间",
                MIN_UPLOAD_LIMIT / 1024,
                MAX_UPLOAD_LIMIT / 1024 / 1024
            )));
        }

        let mut config = self
            .config
            .write()
            .map_err(|_| ImageError::Internal("配置写入锁已中毒".to_string()))?;
        config.max_upload_size = max_upload_size;
        Ok(())
    }

    /// 加载并解码图片，不做上传白名单校验（用于背景模板）。
    pub async fn load_image(&self, source: ImageSource) -> Result<DecodedImage, ImageError> {
        let config = self.config_snapshot()?;
        let policy = config.upload_policy(false);
        self.load_with_policy(source, &config, &policy).await
    }

    /// 加载、按策略校验并解码图片（用于用户头像）。
    pub async fn load_upload(
        &self,
        source: ImageSource,
        strict: bool,
    ) -> Result<DecodedImage, ImageError> {
        let config = self.config_snapshot()?;
        let policy = config.upload_policy(strict);
        self.load_with_policy(source, &config, &policy).await
    }

    async fn load_with_policy(
        &self,
        source: ImageSource,
        config: &CompositorConfig,
        policy: &UploadPolicy,
    ) -> Result<DecodedImage, ImageError> {
        let total_start = Instant::now();
        let description = source.describe();

        let load_start = Instant::now();
        let raw: RawImageData = match source {
            ImageSource::Url(url) => self.load_from_url(&url, config).await?,
            ImageSource::DataUrl(data) => self.load_from_data_url(&data, config)?,
            ImageSource::FilePath(path) => self.load_from_file(&path, config)?,
            ImageSource::Upload(file) => self.load_from_upload(file, config)?,
        };
        let load_elapsed = load_start.elapsed();

        Self::validate_upload(&raw, policy)?;

        let decode_start = Instant::now();
        let decoded = self.decode_image(raw, config)?;
        let decode_elapsed = decode_start.elapsed();

        log::info!(
            "✅ 图片就绪 - 来源: {} 尺寸: {}x{} load={}ms decode={}ms total={}ms",
            description,
            decoded.width(),
            decoded.height(),
            load_elapsed.as_millis(),
            decode_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, ((x + y) % 255) as u8, 255])
        });

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    #[test]
    fn upload_limit_rejects_out_of_range_values() {
        let handler = FrameHandler::new(CompositorConfig::default()).expect("handler init failed");

        assert!(matches!(
            handler.set_upload_limit(1024),
            Err(ImageError::InvalidFormat(_))
        ));
        assert!(matches!(
            handler.set_upload_limit(200 * 1024 * 1024),
            Err(ImageError::InvalidFormat(_))
        ));

        handler
            .set_upload_limit(2 * 1024 * 1024)
            .expect("2MB should be accepted");
        let snapshot = handler.config_snapshot().expect("config snapshot failed");
        assert_eq!(snapshot.max_upload_size, 2 * 1024 * 1024);
    }

    #[test]
    fn smoothing_quality_round_trips_through_handler() {
        let handler = FrameHandler::new(CompositorConfig::default()).expect("handler init failed");
        assert_eq!(handler.smoothing_quality().unwrap(), SmoothingQuality::High);

        handler
            .set_smoothing_quality(SmoothingQuality::Medium)
            .expect("switch quality failed");
        assert_eq!(handler.smoothing_quality().unwrap(), SmoothingQuality::Medium);
    }

    #[tokio::test]
    async fn load_upload_decodes_valid_png() {
        let handler = FrameHandler::new(CompositorConfig::default()).expect("handler init failed");
        let upload = super::super::UploadedFile {
            name: "avatar.png".into(),
            declared_mime: Some("image/png".into()),
            bytes: create_png_bytes(64, 48),
        };

        let decoded = handler
            .load_upload(ImageSource::Upload(upload), true)
            .await
            .expect("valid png should load");

        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[tokio::test]
    async fn strict_upload_rejects_disallowed_declared_type() {
        let handler = FrameHandler::new(CompositorConfig::default()).expect("handler init failed");
        let upload = super::super::UploadedFile {
            name: "avatar.gif".into(),
            declared_mime: Some("image/gif".into()),
            bytes: create_png_bytes(8, 8),
        };

        let result = handler.load_upload(ImageSource::Upload(upload), true).await;
        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
    }
}
