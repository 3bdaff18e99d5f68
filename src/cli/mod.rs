//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `compress`: 扫描并压缩
//! - `scan`: 只打印转换计划
//! - `tools`: 检查后端工具
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: compress, scan, tools

pub mod compress;
pub mod scan;
pub mod tools;

use clap::{Parser, Subcommand};

/// romcomp - ROM 与光盘镜像批量压缩
#[derive(Parser)]
#[command(name = "romcomp")]
#[command(version)]
#[command(about = "Compress ROM and disc images with the right tool for each format", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Show debug logging and every skipped file
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Compress every recognised image under a directory
    Compress(compress::CompressArgs),

    /// Show what compress would do, without touching anything
    Scan(scan::ScanArgs),

    /// Check which backend tools are installed
    Tools(tools::ToolsArgs),
}
