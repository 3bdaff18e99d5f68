//! # tools 子命令 CLI 定义
//!
//! 检查后端工具是否可用。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/tools.rs`

use super::compress::ToolPathArgs;
use clap::Args;

/// tools 子命令参数
#[derive(Args, Debug)]
pub struct ToolsArgs {
    #[command(flatten)]
    pub tools: ToolPathArgs,
}
