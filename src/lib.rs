//! # 头像相框生成工具 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  CLI (clap + tokio)                      │
//! │                                                          │
//! │  generate ── layout                                      │
//! │       │  (设置合并 + JSON 报告)                          │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ Result<T, AppError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            库 (Rust)                             │
//! │                                                          │
//! │  ┌─ error ────── AppError (统一错误类型)                  │
//! │  │                                                       │
//! │  ├─ compositor ─ 模板 + 头像 + 姓名 → PNG                 │
//! │  │   ├─ session  模板/头像就绪信号 + 渲染目标复用         │
//! │  │   ├─ layout   三个预设的版式表（预览 / 2× 高清）       │
//! │  │   └─ render   清空 → 模板 → 边框 → 头像 → 姓名         │
//! │  │                                                       │
//! │  ├─ settings           JSON 设置文件 (serde 默认值)       │
//! │  └─ storage            导出目录 (返回 Result)             │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，CLI 与命令层的返回类型 |
//! | [`compositor`] | 加载校验图片、计算版式、合成并导出 PNG |
//! | [`settings`] | 设置文件读写与合成配置转换 |
//! | [`storage`] | 导出目录的获取与自动创建 |

pub mod error;
pub mod compositor;
pub mod settings;
pub mod storage;
