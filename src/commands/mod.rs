//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `batch/`, `pipeline/`, `models/`, `utils/`
//! - 子模块: compress, scan, tools

pub mod compress;
pub mod scan;
pub mod tools;

use crate::cli::Commands;
use crate::error::Result;

/// 执行命令
pub fn run(cmd: Commands, verbose: bool) -> Result<()> {
    match cmd {
        Commands::Compress(args) => compress::execute(args, verbose),
        Commands::Scan(args) => scan::execute(args, verbose),
        Commands::Tools(args) => tools::execute(args),
    }
}
