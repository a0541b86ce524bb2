//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `CompositorConfig`，保证运行时行为可观测、可调整、可测试。
//! 其中平滑档位（high / medium / low）作为高层语义，映射到底层缩放滤镜，
//! 对应画布的 `imageSmoothingQuality`。
//!
//! ## 实现思路
//!
//! - `Default` 提供与最终版页面一致的限制（JPEG/PNG、5MB 上传上限）。
//! - `SmoothingQuality` 负责档位字符串解析与反向输出。
//! - `apply_smoothing_quality` 将档位转换为具体滤镜。
//! - `upload_policy` 按是否严格校验生成上传策略快照。

use image::imageops::FilterType;
use image::Rgba;
use serde::{Deserialize, Serialize};

use super::ImageError;

/// 合成配置。
///
/// 字段覆盖了加载、校验、解码、缩放与绘制颜色五个方面。
#[derive(Debug, Clone)]
pub struct CompositorConfig {
    /// 读取任意来源原始字节时允许的最大体积（字节），对模板与未校验上传同样生效。
    pub max_file_size: u64,
    /// 严格校验模式下，用户上传文件的体积上限（字节）。
    pub max_upload_size: u64,
    /// 严格校验模式下允许的上传 MIME 类型。
    pub allowed_upload_types: Vec<String>,
    /// 网络下载超时时间（秒）。
    pub download_timeout: u64,
    /// 建立连接超时时间（秒）。
    pub connect_timeout: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 当前平滑档位。
    pub smoothing_quality: SmoothingQuality,
    /// 缩放滤镜策略，由平滑档位决定。
    pub resize_filter: FilterType,
    /// 姓名文字颜色（`#RRGGBB`）。
    pub name_color: String,
    /// 头像边框颜色（`#RRGGBB`）。
    pub border_color: String,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            max_upload_size: 5 * 1024 * 1024,
            allowed_upload_types: vec!["image/jpeg".to_string(), "image/png".to_string()],
            download_timeout: 30,
            connect_timeout: 8,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            smoothing_quality: SmoothingQuality::High,
            resize_filter: FilterType::Lanczos3,
            name_color: "#000000".to_string(),
            border_color: "#FFFFFF".to_string(),
        }
    }
}

/// 上传校验策略快照。
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// 允许的 MIME 类型；`None` 表示不做白名单校验。
    pub allowed_types: Option<Vec<String>>,
    /// 体积上限（字节）。
    pub max_size: u64,
}

impl UploadPolicy {
    pub fn is_strict(&self) -> bool {
        self.allowed_types.is_some()
    }

    pub(crate) fn allows(&self, mime: &str) -> bool {
        match &self.allowed_types {
            Some(types) => types.iter().any(|t| t.eq_ignore_ascii_case(mime.trim())),
            None => true,
        }
    }
}

/// 图像平滑档位。
///
/// - `High`：与浏览器 `imageSmoothingQuality = "high"` 接近
/// - `Medium`：质量与速度平衡
/// - `Low`：优先速度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingQuality {
    High,
    Medium,
    Low,
}

impl SmoothingQuality {
    /// 从外部字符串解析档位。
    ///
    /// # 示例
    /// ```rust
    /// use profile_frame::compositor::SmoothingQuality;
    ///
    /// let q = SmoothingQuality::from_str("HIGH")?;
    /// assert_eq!(q.as_str(), "high");
    /// # Ok::<(), profile_frame::compositor::ImageError>(())
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(quality: &str) -> Result<Self, ImageError> {
        match quality.trim().to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(ImageError::InvalidFormat(format!(
                "未知平滑档位：{}（可选：high / medium / low）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub(crate) fn filter(self) -> FilterType {
        match self {
            Self::High => FilterType::Lanczos3,
            Self::Medium => FilterType::CatmullRom,
            Self::Low => FilterType::Triangle,
        }
    }
}

impl CompositorConfig {
    /// 应用指定平滑档位到实际滤镜。
    pub(crate) fn apply_smoothing_quality(&mut self, quality: SmoothingQuality) {
        self.smoothing_quality = quality;
        self.resize_filter = quality.filter();
    }

    /// 生成上传策略。
    ///
    /// `strict = false` 时沿用早期版本行为：不做类型白名单，只受通用体积上限约束。
    pub fn upload_policy(&self, strict: bool) -> UploadPolicy {
        if strict {
            UploadPolicy {
                allowed_types: Some(self.allowed_upload_types.clone()),
                max_size: self.max_upload_size.min(self.max_file_size),
            }
        } else {
            UploadPolicy {
                allowed_types: None,
                max_size: self.max_file_size,
            }
        }
    }

    pub(crate) fn name_rgba(&self) -> Result<Rgba<u8>, ImageError> {
        parse_hex_color(&self.name_color)
    }

    pub(crate) fn border_rgba(&self) -> Result<Rgba<u8>, ImageError> {
        parse_hex_color(&self.border_color)
    }
}

/// 解析 `#RRGGBB` 颜色为不透明 RGBA。
pub fn parse_hex_color(s: &str) -> Result<Rgba<u8>, ImageError> {
    let hex_part = s.trim().trim_start_matches('#');
    if hex_part.len() != 6 {
        return Err(ImageError::InvalidFormat(format!("无效颜色：{}", s)));
    }
    let bytes = hex::decode(hex_part)
        .map_err(|_| ImageError::InvalidFormat(format!("无效颜色：{}", s)))?;
    Ok(Rgba([bytes[0], bytes[1], bytes[2], 255]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_upload_policy_matches_final_page_limits() {
        let config = CompositorConfig::default();
        let policy = config.upload_policy(true);

        assert!(policy.is_strict());
        assert_eq!(policy.max_size, 5 * 1024 * 1024);
        assert!(policy.allows("image/png"));
        assert!(policy.allows("IMAGE/JPEG"));
        assert!(!policy.allows("image/gif"));
    }

    #[test]
    fn lenient_policy_accepts_any_type_up_to_general_ceiling() {
        let config = CompositorConfig::default();
        let policy = config.upload_policy(false);

        assert!(!policy.is_strict());
        assert!(policy.allows("image/webp"));
        assert_eq!(policy.max_size, config.max_file_size);
    }

    #[test]
    fn smoothing_quality_maps_to_filters() {
        let mut config = CompositorConfig::default();
        config.apply_smoothing_quality(SmoothingQuality::Low);
        assert_eq!(config.resize_filter, FilterType::Triangle);
        assert!(SmoothingQuality::from_str("ultra").is_err());
    }

    #[test]
    fn hex_color_parsing() {
        assert_eq!(parse_hex_color("#000000").unwrap(), Rgba([0, 0, 0, 255]));
        assert_eq!(parse_hex_color("ff8000").unwrap(), Rgba([255, 128, 0, 255]));
        assert!(parse_hex_color("#fff").is_err());
        assert!(parse_hex_color("#zzzzzz").is_err());
    }
}
