//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载合成链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! 分类与交互语义对应关系：
//! - 缺少必填输入（未上传头像 / 未填写姓名）→ `MissingInput`
//! - 非法文件（类型不在白名单 / 体积超限）→ `InvalidFormat` / `ResourceLimit`
//! - 背景模板未就绪 → `TemplateUnavailable`

/// 合成链路统一错误类型。
///
/// 该类型会在命令层被上转为 `AppError`，最终输出给 CLI。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("缺少输入：{0}")]
    MissingInput(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("编码错误：{0}")]
    Encode(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("网络错误：{0}")]
    Network(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("模板未就绪：{0}")]
    TemplateUnavailable(String),

    #[error("字体错误：{0}")]
    Font(String),

    /// 锁中毒等内部状态损坏。
    #[error("内部错误：{0}")]
    Internal(String),
}

impl ImageError {
    /// 稳定的错误码，供 JSON 报告与脚本判断。
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingInput(_) => "missing_input",
            Self::InvalidFormat(_) => "invalid_format",
            Self::ResourceLimit(_) => "resource_limit",
            Self::Decode(_) => "decode",
            Self::Encode(_) => "encode",
            Self::FileSystem(_) => "file_system",
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::TemplateUnavailable(_) => "template_unavailable",
            Self::Font(_) => "font",
            Self::Internal(_) => "internal",
        }
    }

    /// 出错所在阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::MissingInput(_) | Self::InvalidFormat(_) | Self::ResourceLimit(_) => "validate",
            Self::FileSystem(_) | Self::Network(_) | Self::Timeout(_) => "load",
            Self::Decode(_) => "decode",
            Self::TemplateUnavailable(_) | Self::Font(_) => "render",
            Self::Encode(_) => "export",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_file_errors_belong_to_validate_stage() {
        assert_eq!(ImageError::InvalidFormat("x".into()).stage(), "validate");
        assert_eq!(ImageError::ResourceLimit("x".into()).stage(), "validate");
        assert_eq!(ImageError::MissingInput("x".into()).code(), "missing_input");
    }

    #[test]
    fn template_failure_is_reported_at_render_stage() {
        let err = ImageError::TemplateUnavailable("vertical".into());
        assert_eq!(err.code(), "template_unavailable");
        assert_eq!(err.stage(), "render");
        assert!(err.to_string().contains("vertical"));
    }

    #[test]
    fn internal_errors_do_not_claim_validate_stage() {
        let err = ImageError::Internal("头像锁已中毒".into());
        assert_eq!(err.code(), "internal");
        assert_eq!(err.stage(), "internal");
    }
}
