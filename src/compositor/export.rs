//! # 导出模块
//!
//! ## 设计思路
//!
//! 负责把渲染目标变成可交付物：PNG 字节、预览用 Data URL、导出文件名与落盘。
//!
//! ## 文件名规则
//!
//! - classic：`Wireframed2024_<姓名>.png`
//! - dual：`Wireframed2024_<姓名>_story.png` / `Wireframed2024_<姓名>_post.png`
//! - bordered：固定为 `Wireframed2024_story.png` / `Wireframed2024_post.png`
//!
//! 姓名先去除首尾空白，连续空白替换为 `_`，并剔除路径非法字符。

use base64::{Engine as _, engine::general_purpose};
use image::{ImageFormat, RgbaImage};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use super::{ImageError, Preset, TemplateKind};

const EXPORT_PREFIX: &str = "Wireframed2024";

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static PATH_HOSTILE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[/\\:*?"<>|]"#).expect("path regex"));

/// 将位图编码为 PNG。
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ImageError> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| ImageError::Encode(format!("PNG 编码失败：{}", e)))?;
    Ok(cursor.into_inner())
}

/// PNG 字节转 `data:image/png;base64,...`，对应画布的 `toDataURL`。
pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(png))
}

/// 姓名转文件名片段。
///
/// 先去除首尾空白再替换，`" Jane Doe "` 得到 `Jane_Doe` 而不是 `_Jane_Doe_`。
pub fn sanitize_name(name: &str) -> String {
    let collapsed = WHITESPACE_RUN.replace_all(name.trim(), "_");
    PATH_HOSTILE.replace_all(&collapsed, "").into_owned()
}

/// 计算导出文件名。
pub fn export_file_name(preset: Preset, template: TemplateKind, name: Option<&str>) -> String {
    let name = name.map(sanitize_name).filter(|n| !n.is_empty());

    match (preset, name) {
        (Preset::Bordered, _) | (_, None) => {
            format!("{}_{}.png", EXPORT_PREFIX, template.export_suffix())
        }
        (Preset::Classic, Some(name)) => format!("{}_{}.png", EXPORT_PREFIX, name),
        (Preset::Dual, Some(name)) => {
            format!("{}_{}_{}.png", EXPORT_PREFIX, name, template.export_suffix())
        }
    }
}

/// 将 PNG 字节写入目录，返回完整路径。
pub fn save_png(dir: &Path, file_name: &str, png: &[u8]) -> Result<PathBuf, ImageError> {
    let path = dir.join(file_name);
    std::fs::write(&path, png)
        .map_err(|e| ImageError::FileSystem(format!("写入 {} 失败：{}", path.display(), e)))?;

    log::info!("💾 已导出 - {} ({} KB)", path.display(), png.len() / 1024);
    Ok(path)
}
