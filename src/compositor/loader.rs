//! # 加载与校验模块
//!
//! ## 设计思路
//!
//! 统一处理不同来源（URL / Data URL / 本地文件 / 上传文件）的原始字节加载，
//! 并在“尽可能早”的阶段执行输入校验，目标是尽快失败，减少不必要内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - URL：协议 + 状态码 + 内容类型 + 体积校验 + 流式下载，不做自动重试。
//! - Data URL：格式解析 + 解码前体积估算。
//! - 文件：存在性 + metadata 体积限制 + 读取，声明类型取自扩展名。
//! - 上传：声明类型取自上传对象本身。
//! - 所有来源最终都经过文件签名（magic bytes）校验。

use base64::{Engine as _, engine::general_purpose};
use std::path::Path;
use std::time::Duration;

use super::source::RawImageData;
use super::{CompositorConfig, FrameHandler, ImageError, UploadPolicy, UploadedFile};

const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

impl FrameHandler {
    pub(super) fn build_http_client(config: &CompositorConfig) -> Result<reqwest::Client, ImageError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .build()
            .map_err(|e| ImageError::Network(format!("无法创建 HTTP 客户端：{}", e)))
    }

    /// 从 URL 加载图片原始字节。
    pub(super) async fn load_from_url(
        &self,
        url: &str,
        config: &CompositorConfig,
    ) -> Result<RawImageData, ImageError> {
        log::info!("🌐 开始下载图片 - URL: {}", Self::redact_url_for_log(url));

        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ImageError::InvalidFormat(format!("URL 格式错误：{}", e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ImageError::InvalidFormat("仅支持 HTTP/HTTPS".to_string()));
        }

        let mut response = self
            .http_client
            .get(parsed)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e, url, config))?;

        if !response.status().is_success() {
            return Err(ImageError::Network(format!(
                "HTTP {}: {}",
                response.status().as_u16(),
                Self::status_message(response.status().as_u16())
            )));
        }

        let declared_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase());

        if let Some(ct) = declared_mime.as_deref() {
            if !ct.starts_with("image/") {
                return Err(ImageError::InvalidFormat(format!("不是图片类型：{}", ct)));
            }
        }

        let total_len = response.content_length();
        if let Some(size) = total_len {
            Self::check_size(size, config.max_file_size)?;
        }

        let initial_capacity = total_len
            .map(|len| len.min(config.max_file_size) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut total: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.map_reqwest_error(e, url, config))?
        {
            total = total.saturating_add(chunk.len() as u64);
            if total > config.max_file_size {
                return Err(ImageError::ResourceLimit("下载后文件超过大小限制".to_string()));
            }
            buffer.extend_from_slice(&chunk);
        }

        Self::validate_image_signature(&buffer)?;
        log::debug!("✅ 下载完成 - {} bytes", total);

        Ok(RawImageData {
            bytes: buffer,
            declared_mime,
            source_hint: "url",
        })
    }

    /// 从 Data URL 或纯 Base64 字符串加载图片原始字节。
    pub(super) fn load_from_data_url(
        &self,
        data: &str,
        config: &CompositorConfig,
    ) -> Result<RawImageData, ImageError> {
        log::info!("📝 开始处理 Data URL 图片");

        let declared_mime = Self::data_url_media_type(data);
        let bytes = Self::parse_base64_with_limit(data, config.max_file_size)?;
        Self::check_size(bytes.len() as u64, config.max_file_size)?;
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            declared_mime,
            source_hint: "data-url",
        })
    }

    /// 从本地路径加载图片原始字节。
    pub(super) fn load_from_file(
        &self,
        path: &Path,
        config: &CompositorConfig,
    ) -> Result<RawImageData, ImageError> {
        log::info!("📁 开始读取本地图片 - 路径: {}", path.display());

        if !path.exists() {
            return Err(ImageError::FileSystem(format!("文件不存在：{}", path.display())));
        }

        let metadata = std::fs::metadata(path)
            .map_err(|e| ImageError::FileSystem(format!("无法读取文件信息：{}", e)))?;
        Self::check_size(metadata.len(), config.max_file_size)?;

        let bytes = std::fs::read(path)
            .map_err(|e| ImageError::FileSystem(format!("无法读取图片文件：{}", e)))?;
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            declared_mime: Self::mime_from_extension(path).map(str::to_string),
            source_hint: "file",
        })
    }

    /// 接收内存中的上传文件。
    pub(super) fn load_from_upload(
        &self,
        file: UploadedFile,
        config: &CompositorConfig,
    ) -> Result<RawImageData, ImageError> {
        log::info!("📤 收到上传文件 - 名称: {} 大小: {} bytes", file.name, file.bytes.len());

        Self::check_size(file.bytes.len() as u64, config.max_file_size)?;
        Self::validate_image_signature(&file.bytes)?;

        let declared_mime = file
            .declared_mime
            .or_else(|| Self::mime_from_extension(Path::new(&file.name)).map(str::to_string));

        Ok(RawImageData {
            bytes: file.bytes,
            declared_mime,
            source_hint: "upload",
        })
    }

    /// 按上传策略校验：声明类型白名单、嗅探类型白名单、体积上限。
    pub(super) fn validate_upload(raw: &RawImageData, policy: &UploadPolicy) -> Result<(), ImageError> {
        if policy.is_strict() {
            let declared = raw.declared_mime.as_deref().unwrap_or("");
            if !policy.allows(declared) {
                return Err(ImageError::InvalidFormat(format!(
                    "仅支持 JPG 或 PNG 图片（当前类型：{}）",
                    if declared.is_empty() { "未知" } else { declared }
                )));
            }

            let sniffed = infer::get(&raw.bytes).map(|kind| kind.mime_type()).unwrap_or("");
            if !policy.allows(sniffed) {
                return Err(ImageError::InvalidFormat(format!(
                    "文件内容与允许的类型不符：{}",
                    if sniffed.is_empty() { "未知" } else { sniffed }
                )));
            }
        }

        let size = raw.bytes.len() as u64;
        if size > policy.max_size {
            return Err(ImageError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                size as f64 / 1024.0 / 1024.0,
                policy.max_size as f64 / 1024.0 / 1024.0
            )));
        }

        log::debug!(
            "🔎 上传校验通过 - 来源: {} 类型: {:?} 大小: {} bytes",
            raw.source_hint,
            raw.declared_mime,
            size
        );

        Ok(())
    }

    fn check_size(size: u64, limit: u64) -> Result<(), ImageError> {
        if size > limit {
            return Err(ImageError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                size as f64 / 1024.0 / 1024.0,
                limit as f64 / 1024.0 / 1024.0
            )));
        }
        Ok(())
    }

    /// 由扩展名推断声明类型。
    pub(super) fn mime_from_extension(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "gif" => Some("image/gif"),
            "webp" => Some("image/webp"),
            "bmp" => Some("image/bmp"),
            _ => None,
        }
    }

    fn data_url_media_type(data: &str) -> Option<String> {
        let rest = data.trim().strip_prefix("data:")?;
        let media = rest.split([';', ',']).next()?.trim();
        if media.is_empty() {
            None
        } else {
            Some(media.to_ascii_lowercase())
        }
    }

    fn redact_url_for_log(url: &str) -> String {
        let Ok(parsed) = reqwest::Url::parse(url) else {
            return "<invalid-url>".to_string();
        };

        let host = parsed.host_str().unwrap_or("<unknown-host>");
        let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

        format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
    }

    fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, ImageError> {
        let len = base64_data.trim().len() as u64;
        let groups = len
            .checked_add(3)
            .ok_or_else(|| ImageError::ResourceLimit("Base64 输入长度溢出".to_string()))?
            / 4;

        groups
            .checked_mul(3)
            .ok_or_else(|| ImageError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
    }

    pub(super) fn parse_base64_with_limit(data: &str, max_file_size: u64) -> Result<Vec<u8>, ImageError> {
        let normalized = data.trim();

        let payload = if normalized.starts_with("data:") {
            if !normalized.starts_with("data:image/") {
                return Err(ImageError::InvalidFormat("Data URL 不是图片类型".to_string()));
            }
            let base64_start = normalized
                .find(";base64,")
                .ok_or_else(|| ImageError::InvalidFormat("缺少 base64 标记".to_string()))?;
            &normalized[base64_start + 8..]
        } else {
            normalized
        };

        let estimated_len = Self::estimate_base64_decoded_upper_bound_len(payload)?;
        if estimated_len > max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
                estimated_len as f64 / 1024.0 / 1024.0,
                max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| ImageError::Decode(format!("Base64 解码失败：{}", e)))
    }

    /// 统一映射 reqwest 错误到业务错误。
    fn map_reqwest_error(&self, e: reqwest::Error, url: &str, config: &CompositorConfig) -> ImageError {
        let err_msg = e.to_string().replace(url, &Self::redact_url_for_log(url));

        if e.is_timeout() {
            ImageError::Timeout(format!("下载超时（{}秒）", config.download_timeout))
        } else if e.is_connect() {
            ImageError::Network(format!("无法连接：{}", err_msg))
        } else {
            ImageError::Network(format!("请求失败：{}", err_msg))
        }
    }

    fn status_message(code: u16) -> &'static str {
        match code {
            404 => "未找到",
            403 => "访问被拒绝",
            500..=599 => "服务器错误",
            _ => "请求失败",
        }
    }

    /// 通过文件签名（magic bytes）校验输入是否为图片。
    fn validate_image_signature(bytes: &[u8]) -> Result<(), ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::InvalidFormat("图片内容为空".to_string()));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| ImageError::InvalidFormat("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(ImageError::InvalidFormat(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(())
    }
}
