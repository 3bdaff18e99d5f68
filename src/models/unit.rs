//! # 转换单元数据模型
//!
//! 定义文件格式分类 `FormatKind` 和原子转换单元 `ConversionUnit`。
//!
//! ## 依赖关系
//! - 被 `parsers/` 和 `batch/planner.rs` 创建
//! - 被 `pipeline/` 消费

use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// 按内容（而不是扩展名）识别出的文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FormatKind {
    /// cue 描述文件 + 一个或多个 bin 轨道
    CueBin,
    /// ISO 9660 镜像（2048 字节扇区）
    RawIso,
    /// 已经是 CHD
    Chd,
    /// Wii / GameCube 光盘镜像
    WiiIso,
    /// Nintendo 64 ROM（任意字节序）
    N64Rom,
    /// Nintendo DS ROM
    NdsRom,
    /// 无法识别
    Unknown,
}

impl FormatKind {
    /// 全部可转换格式（不含 `Chd` 与 `Unknown`）
    pub const CONVERTIBLE: [FormatKind; 5] = [
        FormatKind::CueBin,
        FormatKind::RawIso,
        FormatKind::WiiIso,
        FormatKind::N64Rom,
        FormatKind::NdsRom,
    ];
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatKind::CueBin => write!(f, "cue/bin"),
            FormatKind::RawIso => write!(f, "iso"),
            FormatKind::Chd => write!(f, "chd"),
            FormatKind::WiiIso => write!(f, "wii/gc"),
            FormatKind::N64Rom => write!(f, "n64"),
            FormatKind::NdsRom => write!(f, "nds"),
            FormatKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// 一次转换必须一起处理的文件集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionUnit {
    /// 主描述文件（cue sheet 或单文件本身）
    descriptor: PathBuf,

    /// 依赖文件，按 cue sheet 中出现的顺序
    dependents: Vec<PathBuf>,

    kind: FormatKind,

    /// 输入已经是后端要产出的布局（例如大端 .z64），只需打包
    canonical: bool,
}

impl ConversionUnit {
    /// 单文件单元
    pub fn single(path: impl Into<PathBuf>, kind: FormatKind) -> Self {
        ConversionUnit {
            descriptor: path.into(),
            dependents: Vec::new(),
            kind,
            canonical: false,
        }
    }

    /// 带依赖文件的单元（cue + 轨道）
    pub fn with_dependents(
        descriptor: impl Into<PathBuf>,
        dependents: Vec<PathBuf>,
        kind: FormatKind,
    ) -> Self {
        ConversionUnit {
            descriptor: descriptor.into(),
            dependents,
            kind,
            canonical: false,
        }
    }

    /// 标记输入已经是规范布局
    pub fn canonical(mut self, canonical: bool) -> Self {
        self.canonical = canonical;
        self
    }

    pub fn descriptor(&self) -> &Path {
        &self.descriptor
    }

    pub fn dependents(&self) -> &[PathBuf] {
        &self.dependents
    }

    pub fn kind(&self) -> FormatKind {
        self.kind
    }

    pub fn is_canonical(&self) -> bool {
        self.canonical
    }

    /// 单元所在目录，临时工作目录和最终产物都放在这里
    pub fn directory(&self) -> &Path {
        match self.descriptor.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    /// 所有属于该单元的文件：描述文件在前，依赖文件按顺序在后
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.descriptor.as_path())
            .chain(self.dependents.iter().map(|p| p.as_path()))
    }

    /// 产物文件名主干
    ///
    /// `game.cue.txt` 这类描述文件会去掉多余的 `.cue`，得到 `game`。
    pub fn stem(&self) -> OsString {
        let stem = self
            .descriptor
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| OsString::from("output"));

        if self.kind == FormatKind::CueBin {
            let inner = Path::new(&stem);
            let is_cue = inner
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("cue"))
                .unwrap_or(false);
            if is_cue {
                if let Some(s) = inner.file_stem() {
                    return s.to_os_string();
                }
            }
        }

        stem
    }

    /// 输入文件总大小（字节）
    pub fn input_bytes(&self) -> u64 {
        self.files()
            .filter_map(|p| fs::metadata(p).ok())
            .map(|m| m.len())
            .sum()
    }
}
