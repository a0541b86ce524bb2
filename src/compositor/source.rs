//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `ImageSource` 表示外部来源语义
//! - `RawImageData` 表示已加载但未解码的字节
//! - `DecodedImage` 表示可直接参与合成的 RGBA 位图

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;

/// 用户上传的文件（等价于浏览器 `File` 对象）。
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// 原始文件名。
    pub name: String,
    /// 声明的 MIME 类型（浏览器 `file.type`）。
    pub declared_mime: Option<String>,
    /// 文件内容。
    pub bytes: Vec<u8>,
}

/// 图片输入来源。
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// 网络地址来源。
    Url(String),
    /// Data URL（`FileReader.readAsDataURL` 的产物）或纯 Base64。
    DataUrl(String),
    /// 本地文件路径来源。
    FilePath(PathBuf),
    /// 内存中的上传文件。
    Upload(UploadedFile),
}

impl ImageSource {
    /// 按字符串形态推断来源：`http(s)://` → URL，`data:` → Data URL，其余视为路径。
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(trimmed.to_string())
        } else if lower.starts_with("data:") {
            Self::DataUrl(trimmed.to_string())
        } else {
            Self::FilePath(PathBuf::from(trimmed))
        }
    }

    /// 日志用的简短来源描述。
    pub fn describe(&self) -> String {
        match self {
            Self::Url(url) => url.split('?').next().unwrap_or(url).to_string(),
            Self::DataUrl(data) => format!("data-url({} chars)", data.len()),
            Self::FilePath(path) => path.display().to_string(),
            Self::Upload(file) => format!("upload({})", file.name),
        }
    }
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    /// 原始图片字节。
    pub(crate) bytes: Vec<u8>,
    /// 来源声明的 MIME 类型（若可得）。
    pub(crate) declared_mime: Option<String>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 解码阶段输出：不可变的 RGBA 位图。
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: Arc<RgbaImage>,
}

impl DecodedImage {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
