//! # 版式表模块
//!
//! ## 设计思路
//!
//! 三个版本页面的差异（单模板带姓名 / 双模板带姓名 / 双模板带边框）
//! 全部收敛为一张静态版式表，替代 `isPreview`、`templateType` 之类的分支判断。
//! 表中只记录预览尺度的数值，高清尺度统一乘以 `Resolution::scale()`，
//! 从而保证预览与下载在所有线性量上严格 2 倍对应。
//!
//! ## 版式表
//!
//! | 预设 | 模板 | 预览画布 | centerY | 头像边长 | 边框 | 字号 | 文字偏移 |
//! |------|------|----------|---------|----------|------|------|----------|
//! | classic | vertical | 1080×1920 | 0.29 | 360 | – | 80 | 190 |
//! | dual | vertical | 1080×1920 | 0.327 | 405 | – | 80 | 190 |
//! | dual | square | 1080×1080 | 0.32 | 324 | – | 60 | 150 |
//! | bordered | vertical | 1080×1920 | 0.327 | 405 | 5 | – | – |
//! | bordered | square | 1080×1080 | 0.32 | 324 | 5 | – | – |

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ImageError;

/// 背景模板种类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    /// 竖版（快拍 / story）。
    Vertical,
    /// 方版（帖子 / post）。
    Square,
}

impl TemplateKind {
    /// 预览尺度的画布尺寸。
    pub fn preview_canvas(self) -> (u32, u32) {
        match self {
            Self::Vertical => (1080, 1920),
            Self::Square => (1080, 1080),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vertical => "vertical",
            Self::Square => "square",
        }
    }

    /// 导出文件名中的后缀。
    pub fn export_suffix(self) -> &'static str {
        match self {
            Self::Vertical => "story",
            Self::Square => "post",
        }
    }
}

/// 渲染分辨率。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Preview,
    Full,
}

impl Resolution {
    pub const ALL: [Resolution; 2] = [Resolution::Preview, Resolution::Full];

    /// 相对预览的线性倍数。
    pub fn scale(self) -> u32 {
        match self {
            Self::Preview => 1,
            Self::Full => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Full => "full",
        }
    }
}

/// 页面版本预设。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// 第一版：单竖版模板 + 姓名。
    Classic,
    /// 第二版：竖版 + 方版模板 + 姓名。
    Dual,
    /// 最终版：竖版 + 方版模板 + 头像边框，上传严格校验。
    Bordered,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Classic, Preset::Dual, Preset::Bordered];

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(preset: &str) -> Result<Self, ImageError> {
        match preset.trim().to_lowercase().as_str() {
            "classic" => Ok(Self::Classic),
            "dual" => Ok(Self::Dual),
            "bordered" => Ok(Self::Bordered),
            other => Err(ImageError::InvalidFormat(format!(
                "未知预设：{}（可选：classic / dual / bordered）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Dual => "dual",
            Self::Bordered => "bordered",
        }
    }

    /// 该预设需要的模板，按渲染顺序排列。
    pub fn templates(self) -> &'static [TemplateKind] {
        match self {
            Self::Classic => &[TemplateKind::Vertical],
            Self::Dual | Self::Bordered => &[TemplateKind::Vertical, TemplateKind::Square],
        }
    }

    /// 是否绘制姓名（即姓名为必填）。
    pub fn requires_name(self) -> bool {
        !matches!(self, Self::Bordered)
    }

    /// 是否对上传执行类型白名单与 5MB 校验。
    pub fn validates_uploads(self) -> bool {
        matches!(self, Self::Bordered)
    }

    /// 查找版式表条目。
    pub fn layout(self, template: TemplateKind) -> Option<&'static LayoutEntry> {
        LAYOUT_TABLE
            .iter()
            .find(|(preset, kind, _)| *preset == self && *kind == template)
            .map(|(_, _, entry)| entry)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 姓名文字参数（预览尺度）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    pub font_px: u32,
    /// 头像下边缘到文字基线的距离。
    pub offset: u32,
}

/// 版式表条目（预览尺度）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutEntry {
    pub center_x_fraction: f64,
    pub center_y_fraction: f64,
    pub photo_size: u32,
    pub border_width: Option<u32>,
    pub text: Option<TextMetrics>,
}

const VERTICAL_NAMED: LayoutEntry = LayoutEntry {
    center_x_fraction: 0.5,
    center_y_fraction: 0.327,
    photo_size: 405,
    border_width: None,
    text: Some(TextMetrics {
        font_px: 80,
        offset: 190,
    }),
};

const SQUARE_NAMED: LayoutEntry = LayoutEntry {
    center_x_fraction: 0.5,
    center_y_fraction: 0.32,
    photo_size: 324,
    border_width: None,
    text: Some(TextMetrics {
        font_px: 60,
        offset: 150,
    }),
};

static LAYOUT_TABLE: [(Preset, TemplateKind, LayoutEntry); 5] = [
    (
        Preset::Classic,
        TemplateKind::Vertical,
        LayoutEntry {
            center_x_fraction: 0.5,
            center_y_fraction: 0.29,
            photo_size: 360,
            border_width: None,
            text: Some(TextMetrics {
                font_px: 80,
                offset: 190,
            }),
        },
    ),
    (Preset::Dual, TemplateKind::Vertical, VERTICAL_NAMED),
    (Preset::Dual, TemplateKind::Square, SQUARE_NAMED),
    (
        Preset::Bordered,
        TemplateKind::Vertical,
        LayoutEntry {
            border_width: Some(5),
            text: None,
            ..VERTICAL_NAMED
        },
    ),
    (
        Preset::Bordered,
        TemplateKind::Square,
        LayoutEntry {
            border_width: Some(5),
            text: None,
            ..SQUARE_NAMED
        },
    ),
];

/// 一次渲染的目标组合。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    pub preset: Preset,
    pub template: TemplateKind,
    pub resolution: Resolution,
}

impl Variant {
    pub fn new(preset: Preset, template: TemplateKind, resolution: Resolution) -> Self {
        Self {
            preset,
            template,
            resolution,
        }
    }

    /// 解析为具体像素版式。
    pub fn placement(self) -> Result<Placement, ImageError> {
        let entry = self.preset.layout(self.template).ok_or_else(|| {
            ImageError::TemplateUnavailable(format!(
                "预设 {} 不包含 {} 模板",
                self.preset.as_str(),
                self.template.as_str()
            ))
        })?;
        Ok(entry.resolve(self.template, self.resolution))
    }
}

/// 姓名绘制位置（像素）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TextPlacement {
    pub font_px: f32,
    pub x: f64,
    pub baseline_y: f64,
}

/// 解析后的像素版式。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub width: u32,
    pub height: u32,
    pub center_x: f64,
    pub center_y: f64,
    pub size: u32,
    pub border_width: Option<u32>,
    pub text: Option<TextPlacement>,
    /// 相对预览的线性倍数。
    pub scale: u32,
}

impl LayoutEntry {
    pub fn resolve(&self, template: TemplateKind, resolution: Resolution) -> Placement {
        let scale = resolution.scale();
        let (preview_w, preview_h) = template.preview_canvas();
        let width = preview_w * scale;
        let height = preview_h * scale;
        let size = self.photo_size * scale;

        let center_x = width as f64 * self.center_x_fraction;
        let center_y = height as f64 * self.center_y_fraction;

        let text = self.text.map(|metrics| TextPlacement {
            font_px: (metrics.font_px * scale) as f32,
            x: center_x,
            baseline_y: center_y + size as f64 / 2.0 + (metrics.offset * scale) as f64,
        });

        Placement {
            width,
            height,
            center_x,
            center_y,
            size,
            border_width: self.border_width.map(|bw| bw * scale),
            text,
            scale,
        }
    }
}

impl Placement {
    /// 头像绘制区域左上角。
    ///
    /// 在预览尺度上四舍五入到整像素后再乘倍数，高清坐标恒为预览的整数倍。
    pub fn photo_origin(&self) -> (i64, i64) {
        let scale = self.scale.max(1) as f64;
        let half = self.size as f64 / scale / 2.0;
        let snap = |center: f64| (center / scale - half).round() as i64 * self.scale.max(1) as i64;
        (snap(self.center_x), snap(self.center_y))
    }
}
