//! # 命令层
//!
//! ## 设计思路
//!
//! 命令层仅做 CLI 参数接收与结果返回，不承载合成逻辑。
//! 所有实际处理交由 `Session`，保持命令函数薄、稳定、易测试。

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use super::{
    ImageError, ImageSource, Placement, Preset, Resolution, Session, TemplateKind, Variant,
    load_font, save_png,
};
use crate::error::AppError;
use crate::settings::AppSettings;
use crate::storage::{self, StorageInfo};

/// 结构化错误，`--json` 模式下输出。
#[derive(Debug, Clone, Serialize)]
pub struct CommandError {
    pub code: &'static str,
    pub stage: &'static str,
    pub message: String,
}

impl From<&AppError> for CommandError {
    fn from(error: &AppError) -> Self {
        let stage = match error {
            AppError::Image(err) => err.stage(),
            AppError::Io(_) | AppError::Storage(_) => "export",
            AppError::Settings(_) => "settings",
        };
        Self {
            code: error.code(),
            stage,
            message: error.to_string(),
        }
    }
}

impl From<ImageError> for CommandError {
    fn from(error: ImageError) -> Self {
        Self::from(&AppError::Image(error))
    }
}

/// 一次生成请求（设置文件与命令行参数已合并）。
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// 头像来源（路径 / URL / Data URL）。
    pub photo: String,
    pub name: Option<String>,
    pub settings: AppSettings,
    /// 同时落盘预览图。
    pub with_previews: bool,
}

/// 单个已保存的输出。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedFrame {
    pub template: TemplateKind,
    pub resolution: Resolution,
    pub width: u32,
    pub height: u32,
    pub path: PathBuf,
}

/// 生成报告。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReport {
    pub preset: Preset,
    pub frames: Vec<SavedFrame>,
    pub output: StorageInfo,
    pub elapsed_ms: u128,
}

/// 版式表中的一行（已解析为像素）。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementReport {
    pub preset: Preset,
    pub template: TemplateKind,
    pub resolution: Resolution,
    pub placement: Placement,
}

/// 执行一次完整生成并写出 PNG。
pub async fn generate(request: GenerateRequest) -> Result<GenerateReport, AppError> {
    let started = Instant::now();
    let GenerateRequest {
        photo,
        name,
        settings,
        with_previews,
    } = request;

    let config = settings.compositor_config()?;
    let font = settings
        .font
        .as_deref()
        .map(|path| load_font(Path::new(path)))
        .transpose()?;

    let session = Session::new(settings.preset, config, font)?;
    let out_dir = storage::get_output_dir(settings.output_dir.as_deref())?;

    let vertical = settings.vertical_template.as_deref().map(ImageSource::parse);
    let square = settings.square_template.as_deref().map(ImageSource::parse);
    tokio::try_join!(
        session.load_templates(vertical, square),
        session.select_photo(ImageSource::parse(&photo)),
    )?;

    let frames = session.generate_when_ready(name.as_deref()).await?;

    let mut saved = Vec::new();
    for frame in &frames.frames {
        if frame.variant.resolution == Resolution::Preview && !with_previews {
            continue;
        }
        let png = frame.encode_png()?;
        let path = save_png(&out_dir, &frame.file_name, &png)?;
        saved.push(SavedFrame {
            template: frame.variant.template,
            resolution: frame.variant.resolution,
            width: frame.image.width(),
            height: frame.image.height(),
            path,
        });
    }

    Ok(GenerateReport {
        preset: settings.preset,
        frames: saved,
        output: storage::output_dir_info(&out_dir),
        elapsed_ms: started.elapsed().as_millis(),
    })
}

/// 导出版式表；`preset` 为空时列出全部预设。
pub fn describe_layout(preset: Option<Preset>) -> Result<Vec<PlacementReport>, ImageError> {
    let presets = match preset {
        Some(preset) => vec![preset],
        None => Preset::ALL.to_vec(),
    };

    let mut rows = Vec::new();
    for preset in presets {
        for &template in preset.templates() {
            for resolution in Resolution::ALL {
                rows.push(PlacementReport {
                    preset,
                    template,
                    resolution,
                    placement: Variant::new(preset, template, resolution).placement()?,
                });
            }
        }
    }
    Ok(rows)
}
