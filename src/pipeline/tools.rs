//! # 外部工具定位
//!
//! 查找每个后端工具的可执行文件，并报告可用性与版本。
//!
//! ## 功能
//! - 命令行/环境变量指定的路径优先，否则在 `PATH` 中用 `which` 查找
//! - 启动时只解析一次，运行期间不再改变
//! - `tools` 子命令的版本探测
//!
//! ## 依赖关系
//! - 被 `pipeline/registry.rs` 和 `commands/tools.rs` 使用
//! - 使用 `pipeline/supervisor.rs` 探测版本

use super::supervisor;
use serde::Serialize;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 版本探测的超时时间
const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

/// 后端使用的外部工具
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Tool {
    Chdman,
    Maxcso,
    DolphinTool,
    Rom64,
    BitButcher,
}

impl Tool {
    pub const ALL: [Tool; 5] = [
        Tool::Chdman,
        Tool::Maxcso,
        Tool::DolphinTool,
        Tool::Rom64,
        Tool::BitButcher,
    ];

    /// `PATH` 中查找的可执行文件名
    pub fn executable(self) -> &'static str {
        match self {
            Tool::Chdman => "chdman",
            Tool::Maxcso => "maxcso",
            Tool::DolphinTool => "dolphin-tool",
            Tool::Rom64 => "rom64",
            Tool::BitButcher => "BitButcher",
        }
    }

    /// 打印版本信息的参数，`None` 表示工具没有可靠的版本输出
    fn version_args(self) -> Option<&'static [&'static str]> {
        match self {
            // 不带参数时首行就是版本横幅
            Tool::Chdman => Some(&[]),
            Tool::Maxcso => Some(&["--version"]),
            Tool::DolphinTool | Tool::Rom64 | Tool::BitButcher => None,
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.executable())
    }
}

/// 单个工具的可用性信息
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub tool: Tool,
    pub available: bool,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// 已解析的工具路径
#[derive(Debug, Clone, Default)]
pub struct ToolLocator {
    paths: HashMap<Tool, PathBuf>,
}

impl ToolLocator {
    /// 解析所有工具路径
    ///
    /// 指定路径不可用时记录警告并退回到 `PATH` 查找；找不到的工具不会出现在结果中。
    pub fn discover(overrides: &HashMap<Tool, PathBuf>) -> Self {
        let mut paths = HashMap::new();

        for tool in Tool::ALL {
            let from_override = overrides.get(&tool).and_then(|p| {
                let found = which::which(p).ok();
                if found.is_none() {
                    tracing::warn!(
                        "configured {} path {} is not executable, searching PATH",
                        tool,
                        p.display()
                    );
                }
                found
            });

            let resolved = from_override.or_else(|| which::which(tool.executable()).ok());
            match resolved {
                Some(path) => {
                    tracing::debug!("{} -> {}", tool, path.display());
                    paths.insert(tool, path);
                }
                None => tracing::debug!("{} not found", tool),
            }
        }

        Self { paths }
    }

    /// 直接使用给定路径，不做查找
    #[cfg(test)]
    pub fn from_paths(paths: impl IntoIterator<Item = (Tool, PathBuf)>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn get(&self, tool: Tool) -> Option<&Path> {
        self.paths.get(&tool).map(|p| p.as_path())
    }

    /// 检查所有工具
    pub fn check_all(&self) -> Vec<ToolInfo> {
        Tool::ALL
            .iter()
            .map(|&tool| match self.get(tool) {
                Some(path) => ToolInfo {
                    tool,
                    available: true,
                    version: detect_version(tool, path),
                    path: Some(path.to_path_buf()),
                },
                None => ToolInfo {
                    tool,
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

/// 运行版本命令，取第一行非空输出
fn detect_version(tool: Tool, path: &Path) -> Option<String> {
    let args: Vec<OsString> = tool.version_args()?.iter().map(OsString::from).collect();

    // 很多工具打印用法后以非零状态退出，这里不看退出码
    let output = supervisor::run(path, &args, VERSION_TIMEOUT, 4096, None).ok()?;

    output
        .stdout
        .lines()
        .chain(output.stderr.lines())
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
