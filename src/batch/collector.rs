//! # 文件收集器
//!
//! 枚举扫描根目录下的候选文件。
//!
//! ## 功能
//! - 支持单文件和目录输入
//! - 递归遍历，不跟随符号链接（避免循环）
//! - glob 排除模式（按文件名匹配）
//! - 跳过 romcomp 自己的临时工作目录
//! - 结果排序，保证报告顺序稳定
//!
//! ## 依赖关系
//! - 被 `batch/planner.rs` 调用
//! - 使用 `walkdir` 遍历目录，`glob` 匹配排除模式

use crate::error::{Result, RomcompError};
use crate::pipeline::WORKDIR_PREFIX;
use std::path::PathBuf;
use walkdir::{DirEntry, WalkDir};

/// 文件收集器
pub struct FileCollector {
    /// 输入路径
    input: PathBuf,
    /// 排除模式列表
    excludes: Vec<glob::Pattern>,
}

impl FileCollector {
    /// 创建新的文件收集器
    pub fn new(input: PathBuf) -> Self {
        Self {
            input,
            excludes: Vec::new(),
        }
    }

    /// 设置排除模式
    pub fn with_excludes(mut self, patterns: &[String]) -> Result<Self> {
        for pattern in patterns {
            let compiled =
                glob::Pattern::new(pattern).map_err(|e| RomcompError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
            self.excludes.push(compiled);
        }
        Ok(self)
    }

    /// 检查输入是否为单文件
    pub fn is_single_file(&self) -> bool {
        self.input.is_file()
    }

    /// 收集所有候选文件
    pub fn collect(&self) -> Vec<PathBuf> {
        if self.input.is_file() {
            return vec![self.input.clone()];
        }

        if !self.input.is_dir() {
            return vec![];
        }

        let walker = WalkDir::new(&self.input)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_ignored(e))
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!("skipping unreadable entry: {}", err);
                    None
                }
            })
            .filter(|e| e.file_type().is_file());

        let mut files: Vec<PathBuf> = walker.map(|e| e.into_path()).collect();
        files.sort();
        files
    }

    /// 临时工作目录和匹配排除模式的条目
    fn is_ignored(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();

        if entry.file_type().is_dir() && name.starts_with(WORKDIR_PREFIX) {
            return true;
        }

        self.excludes.iter().any(|p| p.matches(&name))
    }
}
