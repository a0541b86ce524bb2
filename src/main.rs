//! # 头像相框生成工具 — 命令行入口
//!
//! 本文件仅负责日志初始化、参数解析与结果输出。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use profile_frame::compositor::commands::{self, CommandError, GenerateRequest};
use profile_frame::compositor::Preset;
use profile_frame::error::AppError;
use profile_frame::settings::{self, AppSettings};

#[derive(Parser)]
#[command(name = "profile-frame", version, about = "把头像和姓名合成到 Wireframed2024 相框模板上")]
struct Cli {
    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 生成相框图片
    Generate {
        /// 头像来源：本地路径、http(s) 地址或 data URL
        #[arg(long)]
        photo: String,
        /// 姓名（classic / dual 预设必填）
        #[arg(long)]
        name: Option<String>,
        /// 预设：classic / dual / bordered
        #[arg(long)]
        preset: Option<String>,
        #[arg(long)]
        vertical_template: Option<String>,
        #[arg(long)]
        square_template: Option<String>,
        /// 姓名字体（TTF/OTF）
        #[arg(long)]
        font: Option<String>,
        /// 导出目录
        #[arg(short, long)]
        out: Option<String>,
        /// JSON 设置文件
        #[arg(long)]
        settings: Option<PathBuf>,
        /// 同时保存预览图
        #[arg(long)]
        with_previews: bool,
        /// 以 JSON 输出结果
        #[arg(long)]
        json: bool,
    },
    /// 打印版式表
    Layout {
        #[arg(long)]
        preset: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let json = matches!(cli.command, Commands::Generate { json: true, .. });

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("❌ {err}");
            if json {
                let payload = serde_json::json!({ "error": CommandError::from(&err) });
                println!("{payload}");
            } else {
                eprintln!("错误: {err}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<(), AppError> {
    match command {
        Commands::Generate {
            photo,
            name,
            preset,
            vertical_template,
            square_template,
            font,
            out,
            settings: settings_path,
            with_previews,
            json,
        } => {
            let mut settings = match settings_path {
                Some(path) => settings::load_settings(&path)?,
                None => AppSettings::default(),
            };

            if let Some(preset) = preset {
                settings.preset = Preset::from_str(&preset)?;
            }
            if vertical_template.is_some() {
                settings.vertical_template = vertical_template;
            }
            if square_template.is_some() {
                settings.square_template = square_template;
            }
            if font.is_some() {
                settings.font = font;
            }
            if out.is_some() {
                settings.output_dir = out;
            }

            let report = commands::generate(GenerateRequest {
                photo,
                name,
                settings,
                with_previews,
            })
            .await?;

            if json {
                let text = serde_json::to_string_pretty(&report)
                    .map_err(|e| AppError::Settings(format!("序列化报告失败: {}", e)))?;
                println!("{text}");
            } else {
                for frame in &report.frames {
                    println!(
                        "{} {} {}x{} → {}",
                        frame.template.as_str(),
                        frame.resolution.as_str(),
                        frame.width,
                        frame.height,
                        frame.path.display()
                    );
                }
            }
            Ok(())
        }
        Commands::Layout { preset } => {
            let preset = preset.as_deref().map(Preset::from_str).transpose()?;
            let rows = commands::describe_layout(preset)?;
            let text = serde_json::to_string_pretty(&rows)
                .map_err(|e| AppError::Settings(format!("序列化版式表失败: {}", e)))?;
            println!("{text}");
            Ok(())
        }
    }
}
