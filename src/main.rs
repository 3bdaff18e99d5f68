//! # romcomp - ROM 与光盘镜像批量压缩
//!
//! 扫描目录，按文件内容识别格式，调用对应的外部工具压缩，
//! 校验产物后原子地放到最终位置。
//!
//! ## 子命令
//! - `compress` - 批量压缩 (cue/bin → CHD, ISO → CSO/CHD, Wii/GC → RVZ, N64/NDS → ZIP)
//! - `scan`     - 只打印转换计划
//! - `tools`    - 检查后端工具
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── batch/     (收集、规划、并行执行)
//!   │     ├── pipeline/  (后端注册表、进程监管、校验与提交)
//!   │     ├── parsers/   (格式识别、cue 解析)
//!   │     └── models/    (数据模型)
//!   ├── utils/      (输出、进度条、日志)
//!   └── error.rs    (错误处理)
//! ```

mod batch;
mod cli;
mod commands;
mod error;
mod models;
mod parsers;
mod pipeline;
mod utils;

use clap::Parser;
use cli::Cli;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();
    utils::logging::init(cli.verbose);

    if let Err(e) = commands::run(cli.command, cli.verbose) {
        utils::output::print_error(&format!("{}", e));
        let code = match e {
            error::RomcompError::Aborted => 130,
            _ => 1,
        };
        std::process::exit(code);
    }
}
