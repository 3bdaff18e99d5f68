//! # tools 命令实现
//!
//! 列出每个后端工具的路径和版本。
//!
//! ## 依赖关系
//! - 使用 `cli/tools.rs` 定义的参数
//! - 使用 `pipeline/tools.rs`

use crate::cli::tools::ToolsArgs;
use crate::error::Result;
use crate::pipeline::tools::{ToolInfo, ToolLocator};
use crate::utils::output;
use tabled::{Table, Tabled};

/// 工具表格行
#[derive(Tabled)]
struct ToolRow {
    #[tabled(rename = "Tool")]
    tool: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Path")]
    path: String,
}

impl From<&ToolInfo> for ToolRow {
    fn from(info: &ToolInfo) -> Self {
        ToolRow {
            tool: info.tool.to_string(),
            status: if info.available { "found" } else { "missing" }.to_string(),
            version: info.version.clone().unwrap_or_else(|| "-".to_string()),
            path: info
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// 执行 tools 命令
pub fn execute(args: ToolsArgs) -> Result<()> {
    output::print_header("Backend Tools");

    let infos = ToolLocator::discover(&args.tools.overrides()).check_all();
    let rows: Vec<ToolRow> = infos.iter().map(ToolRow::from).collect();
    println!("{}", Table::new(&rows));

    let missing = infos.iter().filter(|i| !i.available).count();
    if missing == 0 {
        output::print_success("All backend tools are available");
    } else {
        output::print_warning(&format!(
            "{} of {} tools missing, their formats will be skipped",
            missing,
            infos.len()
        ));
    }

    Ok(())
}
