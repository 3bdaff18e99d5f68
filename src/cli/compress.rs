//! # compress 子命令 CLI 定义
//!
//! 扫描目录并把每个可识别的镜像压缩为对应格式。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/compress.rs`

use crate::models::FormatKind;
use crate::pipeline::registry::IsoTarget;
use crate::pipeline::tools::Tool;
use clap::{Args, ValueEnum};
use std::collections::HashMap;
use std::path::PathBuf;

/// 命令行可选择的格式
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FormatSelector {
    /// cue sheet with bin tracks -> CHD
    CueBin,
    /// ISO 9660 image -> CSO (or CHD with --iso-target chd)
    Iso,
    /// Wii / GameCube disc -> RVZ
    Wii,
    /// Nintendo 64 ROM -> zipped z64
    N64,
    /// Nintendo DS ROM -> trimmed and zipped
    Nds,
}

impl From<FormatSelector> for FormatKind {
    fn from(selector: FormatSelector) -> Self {
        match selector {
            FormatSelector::CueBin => FormatKind::CueBin,
            FormatSelector::Iso => FormatKind::RawIso,
            FormatSelector::Wii => FormatKind::WiiIso,
            FormatSelector::N64 => FormatKind::N64Rom,
            FormatSelector::Nds => FormatKind::NdsRom,
        }
    }
}

/// 后端工具路径（compress 与 tools 共用）
#[derive(Args, Debug, Clone, Default)]
pub struct ToolPathArgs {
    /// Path to chdman
    #[arg(long, env = "ROMCOMP_CHDMAN", value_name = "PATH")]
    pub chdman: Option<PathBuf>,

    /// Path to maxcso
    #[arg(long, env = "ROMCOMP_MAXCSO", value_name = "PATH")]
    pub maxcso: Option<PathBuf>,

    /// Path to dolphin-tool
    #[arg(long, env = "ROMCOMP_DOLPHIN_TOOL", value_name = "PATH")]
    pub dolphin_tool: Option<PathBuf>,

    /// Path to rom64
    #[arg(long, env = "ROMCOMP_ROM64", value_name = "PATH")]
    pub rom64: Option<PathBuf>,

    /// Path to BitButcher
    #[arg(long, env = "ROMCOMP_BITBUTCHER", value_name = "PATH")]
    pub bitbutcher: Option<PathBuf>,
}

impl ToolPathArgs {
    /// 只包含用户指定了路径的工具
    pub fn overrides(&self) -> HashMap<Tool, PathBuf> {
        [
            (Tool::Chdman, &self.chdman),
            (Tool::Maxcso, &self.maxcso),
            (Tool::DolphinTool, &self.dolphin_tool),
            (Tool::Rom64, &self.rom64),
            (Tool::BitButcher, &self.bitbutcher),
        ]
        .into_iter()
        .filter_map(|(tool, path)| path.clone().map(|p| (tool, p)))
        .collect()
    }
}

/// compress 子命令参数
#[derive(Args, Debug)]
pub struct CompressArgs {
    /// ROM file or directory to scan
    pub root: PathBuf,

    /// Number of parallel jobs (0 = one per CPU core)
    #[arg(short, long, env = "ROMCOMP_JOBS", default_value_t = 0)]
    pub jobs: usize,

    /// Delete the original files after a verified conversion
    #[arg(short = 'R', long, default_value_t = false)]
    pub remove: bool,

    /// Move outputs up out of directories that contain nothing else (needs --remove)
    #[arg(long, default_value_t = false)]
    pub flatten: bool,

    /// Only convert these formats
    #[arg(long, value_enum, value_delimiter = ',', conflicts_with = "skip")]
    pub only: Vec<FormatSelector>,

    /// Never convert these formats
    #[arg(long, value_enum, value_delimiter = ',')]
    pub skip: Vec<FormatSelector>,

    /// Target format for ISO 9660 images
    #[arg(long, value_enum, default_value_t = IsoTarget::Cso)]
    pub iso_target: IsoTarget,

    /// Kill a backend that runs longer than this many seconds
    #[arg(long, env = "ROMCOMP_TIMEOUT", default_value_t = 7200)]
    pub timeout: u64,

    /// Print the backend commands without running anything
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Ignore files and directories matching this glob (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Write the batch report to a CSV file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub tools: ToolPathArgs,
}

impl CompressArgs {
    /// 启用的格式集合
    pub fn enabled_formats(&self) -> Vec<FormatKind> {
        FormatKind::CONVERTIBLE
            .into_iter()
            .filter(|kind| {
                self.only.is_empty() || self.only.iter().any(|s| FormatKind::from(*s) == *kind)
            })
            .filter(|kind| !self.skip.iter().any(|s| FormatKind::from(*s) == *kind))
            .collect()
    }
}
