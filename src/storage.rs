//! 导出目录管理模块
//!
//! # 设计思路
//!
//! 统一管理导出 PNG 的落盘目录，支持用户自定义目录，
//! 并在目录不存在时自动创建。
//!
//! # 实现思路
//!
//! - 优先使用用户在设置或命令行中配置的目录。
//! - 未设置时回退到当前工作目录下的 `output` 子目录。
//! - 目录不存在时自动 `create_dir_all`，避免上层判断。
//! - 所有可能失败的操作均返回 `Result`，不使用 `expect()` / `unwrap()`。

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// 存储目录信息
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub path: String,
    pub total_size: u64,
    pub file_count: u64,
}

/// 获取导出目录
///
/// # 参数
/// * `custom_dir` - 用户自定义目录（可选）
///
/// # 返回
/// - `Ok(PathBuf)` — 可用的导出目录
/// - `Err(AppError::Storage)` — 无法获取或创建目录
pub fn get_output_dir(custom_dir: Option<&str>) -> Result<PathBuf, AppError> {
    if let Some(dir) = custom_dir.map(str::trim).filter(|d| !d.is_empty()) {
        let path = PathBuf::from(dir);
        if !path.exists() {
            fs::create_dir_all(&path).map_err(|e| {
                AppError::Storage(format!("创建自定义目录 '{}' 失败: {}", dir, e))
            })?;
        }
        return Ok(path);
    }

    let cwd = std::env::current_dir()
        .map_err(|e| AppError::Storage(format!("获取当前工作目录失败: {}", e)))?;
    let output_dir = cwd.join("output");
    if !output_dir.exists() {
        fs::create_dir_all(&output_dir)
            .map_err(|e| AppError::Storage(format!("创建导出目录失败: {}", e)))?;
    }
    Ok(output_dir)
}

/// 获取导出目录信息（路径 + 占用大小 + 文件数）
pub fn output_dir_info(dir: &Path) -> StorageInfo {
    let mut total_size: u64 = 0;
    let mut file_count: u64 = 0;

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            if let Ok(metadata) = entry.metadata() {
                if metadata.is_file() {
                    total_size += metadata.len();
                    file_count += 1;
                }
            }
        }
    }

    StorageInfo {
        path: dir.to_string_lossy().to_string(),
        total_size,
        file_count,
    }
}
