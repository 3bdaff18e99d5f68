//! # scan 子命令 CLI 定义
//!
//! 只识别格式并解析转换单元，打印计划，不修改任何文件。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/scan.rs`

use crate::pipeline::registry::IsoTarget;
use clap::Args;
use std::path::PathBuf;

/// scan 子命令参数
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// ROM file or directory to scan
    pub root: PathBuf,

    /// Ignore files and directories matching this glob (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Target format for ISO 9660 images
    #[arg(long, value_enum, default_value_t = IsoTarget::Cso)]
    pub iso_target: IsoTarget,

    /// Also list files that were not recognised
    #[arg(short, long, default_value_t = false)]
    pub all: bool,
}
