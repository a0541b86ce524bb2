//! 应用设置模块
//!
//! # 设计思路
//!
//! 设置以 JSON 文件保存，字段缺失时回落到默认值（`#[serde(default)]`），
//! 老版本设置文件可以直接被新版本读取。
//!
//! # 实现思路
//!
//! - `load_settings` 读取并解析文件；文件不存在视为错误，由调用方决定是否回退默认。
//! - `compositor_config` 把设置转换为合成配置，并在此处提前校验颜色等参数。
//! - CLI 参数覆盖设置文件中的同名字段。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compositor::{CompositorConfig, Preset, SmoothingQuality, parse_hex_color};
use crate::error::AppError;

/// 应用设置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    /// 页面版本预设。
    pub preset: Preset,
    /// 竖版模板来源（路径 / URL / Data URL）。
    pub vertical_template: Option<String>,
    /// 方版模板来源。
    pub square_template: Option<String>,
    /// 姓名字体文件路径。
    pub font: Option<String>,
    /// 导出目录，为空时使用当前目录下的 `output`。
    pub output_dir: Option<String>,
    pub name_color: String,
    pub border_color: String,
    pub smoothing: SmoothingQuality,
    /// 严格校验模式下的上传体积上限（字节）。
    pub max_upload_size: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        let config = CompositorConfig::default();
        Self {
            preset: Preset::Bordered,
            vertical_template: Some("template.png".to_string()),
            square_template: Some("template-square.png".to_string()),
            font: None,
            output_dir: None,
            name_color: config.name_color,
            border_color: config.border_color,
            smoothing: config.smoothing_quality,
            max_upload_size: config.max_upload_size,
        }
    }
}

impl AppSettings {
    /// 转换为合成配置。
    pub fn compositor_config(&self) -> Result<CompositorConfig, AppError> {
        parse_hex_color(&self.name_color)?;
        parse_hex_color(&self.border_color)?;

        if self.max_upload_size == 0 {
            return Err(AppError::Settings("maxUploadSize 必须大于 0".to_string()));
        }

        let mut config = CompositorConfig {
            name_color: self.name_color.clone(),
            border_color: self.border_color.clone(),
            max_upload_size: self.max_upload_size,
            ..CompositorConfig::default()
        };
        config.apply_smoothing_quality(self.smoothing);
        Ok(config)
    }
}

/// 读取设置文件。
pub fn load_settings(path: &Path) -> Result<AppSettings, AppError> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::Settings(format!("读取设置文件 {} 失败: {}", path.display(), e)))?;

    let settings = serde_json::from_str::<AppSettings>(&content)
        .map_err(|e| AppError::Settings(format!("解析设置文件失败: {}", e)))?;

    log::info!("⚙️ 已加载设置 - {} (预设: {})", path.display(), settings.preset);
    Ok(settings)
}

/// 保存设置文件（格式化 JSON）。
pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<(), AppError> {
    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| AppError::Settings(format!("序列化设置失败: {}", e)))?;

    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unique_temp_dir() -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!("profile-frame-settings-{nanos}"));
        std::fs::create_dir_all(&dir).expect("create temp dir failed");
        dir
    }

    #[test]
    fn defaults_match_final_page() {
        let settings = AppSettings::default();
        assert_eq!(settings.preset, Preset::Bordered);
        assert_eq!(settings.border_color, "#FFFFFF");
        assert_eq!(settings.max_upload_size, 5 * 1024 * 1024);

        let config = settings.compositor_config().expect("defaults should be valid");
        assert_eq!(config.allowed_upload_types, vec!["image/jpeg", "image/png"]);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = unique_temp_dir();
        let path = dir.join("settings.json");
        std::fs::write(&path, r##"{ "preset": "dual", "nameColor": "#112233" }"##)
            .expect("write settings failed");

        let settings = load_settings(&path).expect("settings should parse");
        assert_eq!(settings.preset, Preset::Dual);
        assert_eq!(settings.name_color, "#112233");
        assert_eq!(settings.border_color, "#FFFFFF");
        assert_eq!(settings.vertical_template.as_deref(), Some("template.png"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = unique_temp_dir();
        let path = dir.join("settings.json");
        let settings = AppSettings {
            preset: Preset::Classic,
            smoothing: SmoothingQuality::Low,
            output_dir: Some("exports".to_string()),
            ..AppSettings::default()
        };

        save_settings(&path, &settings).expect("save failed");
        assert_eq!(load_settings(&path).expect("load failed"), settings);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn invalid_color_and_missing_file_are_reported() {
        let settings = AppSettings {
            border_color: "white".to_string(),
            ..AppSettings::default()
        };
        assert!(matches!(settings.compositor_config(), Err(AppError::Image(_))));

        let missing = load_settings(Path::new("/nonexistent/profile-frame.json"));
        assert!(matches!(missing, Err(AppError::Settings(_))));
    }

    #[test]
    fn smoothing_selects_filter() {
        let settings = AppSettings {
            smoothing: SmoothingQuality::Medium,
            ..AppSettings::default()
        };
        let config = settings.compositor_config().expect("config failed");
        assert_eq!(config.resize_filter, image::imageops::FilterType::CatmullRom);
    }
}
