//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `AppError` 枚举，替代各模块中分散的
//! `.map_err(|e| e.to_string())`、`format!(...)`、`expect()` 等不一致模式。
//!
//! CLI 入口统一处理 `Result<T, AppError>`，`--json` 模式下通过 `Serialize`
//! 输出结构化的错误信息。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `ImageError` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串。

use serde::Serialize;

use crate::compositor::ImageError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 合成流水线错误（加载 / 校验 / 解码 / 合成 / 导出）
    #[error("{0}")]
    Image(#[from] ImageError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 设置文件无法读取或内容非法
    #[error("设置无效: {0}")]
    Settings(String),

    /// 输出目录不可用
    #[error("存储目录不可用: {0}")]
    Storage(String),
}

impl AppError {
    /// 稳定的错误码，合成错误沿用 `ImageError::code`。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Image(err) => err.code(),
            Self::Io(_) => "io",
            Self::Settings(_) => "settings",
            Self::Storage(_) => "storage",
        }
    }
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
