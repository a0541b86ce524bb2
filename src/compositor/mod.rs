//! # 头像相框合成模块（compositor）
//!
//! ## 设计思路
//!
//! 该模块将“图片来源识别 → 加载校验 → 解码 → 版式计算 → 合成 → PNG 导出”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `commands`：CLI 入参/出参适配（薄封装）
//! - `session`：承载会话状态（模板、当前头像、渲染目标）与就绪信号
//! - `handler`：编排“加载 → 校验 → 解码”流水线
//! - `loader`：负责 URL/Data URL/文件/上传加载与安全校验
//! - `pipeline`：负责解码、像素限制、精确缩放
//! - `layout`：预设版式表与像素级摆放计算
//! - `render/target/text`：单次合成、可复用画布、姓名绘制
//! - `export`：PNG 编码、文件命名与落盘
//! - `config/error/source`：配置、错误、中间数据模型
//!
//! ## 实现思路
//!
//! 对外仅暴露必要类型与入口函数，加载细节保持 `mod` 私有。
//! 版式数据集中在一张静态表中，预览与高清共享同一组比例，只差一个缩放系数。
//!
//! ## 新同事快速上手
//!
//! 可以按下面顺序理解调用链：
//!
//! ```text
//! CLI（main.rs）
//!    ↓
//! commands.rs（参数合并、报告输出）
//!    ↓
//! session.rs（模板 + 头像并行加载，join 两个就绪信号）
//!    ├─ handler.rs（统一编排 + 阶段耗时日志）
//!    │    ├─ loader.rs（来源加载 + 上传白名单/体积校验）
//!    │    └─ pipeline.rs（解码 + EXIF 方向 + 像素限制）
//!    ├─ layout.rs（预设 × 模板 × 分辨率 → 像素版式）
//!    └─ render.rs（模板铺底 → 边框 → 头像 → 姓名）
//!    ↓
//! export.rs（PNG 编码 + 文件命名 + 写盘）
//! ```
//!
//! ## 分层职责建议
//!
//! - 新增预设或调整坐标优先改 `layout.rs` 的版式表
//! - 上传策略变更优先改 `config.rs`
//! - 绘制顺序变更优先改 `render.rs`
//! - 下载文件名规则变更优先改 `export.rs`

pub mod commands;
mod config;
mod error;
pub mod export;
mod handler;
mod layout;
mod loader;
mod pipeline;
pub mod render;
mod session;
mod source;
mod target;
pub mod text;

pub use config::{CompositorConfig, SmoothingQuality, UploadPolicy, parse_hex_color};
pub use error::ImageError;
pub use export::{encode_png, export_file_name, png_data_url, sanitize_name, save_png};
pub use handler::FrameHandler;
pub use layout::{
    LayoutEntry, Placement, Preset, Resolution, TemplateKind, TextMetrics, TextPlacement, Variant,
};
pub use pipeline::resize_exact;
pub use render::{RenderStyle, render};
pub use session::{GeneratedFrames, PhotoTicket, PhotoUpdate, RenderedFrame, Session};
pub use source::{DecodedImage, ImageSource, UploadedFile};
pub use target::RenderTarget;
pub use text::{FontFace, load_font};
