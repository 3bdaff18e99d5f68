//! # 作业结果数据模型
//!
//! 单个转换单元的结果 `JobResult` 与整个批次的汇总 `BatchReport`。
//!
//! ## 依赖关系
//! - 被 `batch/runner.rs`, `pipeline/mod.rs` 创建
//! - 被 `commands/compress.rs` 用于输出汇总和导出 CSV

use super::FormatKind;
use crate::error::UnitError;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// 单元失败的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    UnreadableInput,
    MissingTrack,
    BackendError,
    Timeout,
    Interrupted,
    VerificationFailed,
    FinalizeFailed,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::UnreadableInput => "unreadable input",
            ErrorKind::MissingTrack => "missing track",
            ErrorKind::BackendError => "backend error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::VerificationFailed => "verification failed",
            ErrorKind::FinalizeFailed => "finalize failed",
        };
        write!(f, "{}", name)
    }
}

/// 跳过原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// 内容无法识别
    UnknownFormat,
    /// 已经是压缩格式
    AlreadyCompressed,
    /// 该格式没有后端
    NoBackend(FormatKind),
    /// 该格式被命令行禁用
    Disabled(FormatKind),
    /// 后端工具不可用
    ToolUnavailable { kind: FormatKind, tool: String },
    /// 目标文件已存在
    TargetExists(PathBuf),
    /// 依赖文件已被另一个单元占用
    SharedDependents(PathBuf),
    /// dry-run 模式下计划执行的命令
    DryRun { command: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::UnknownFormat => write!(f, "unknown format"),
            SkipReason::AlreadyCompressed => write!(f, "already compressed"),
            SkipReason::NoBackend(kind) => write!(f, "no backend for {}", kind),
            SkipReason::Disabled(kind) => write!(f, "{} disabled", kind),
            SkipReason::ToolUnavailable { kind, tool } => {
                write!(f, "{} needs '{}' which is not available", kind, tool)
            }
            SkipReason::TargetExists(path) => {
                write!(f, "target already exists: {}", path.display())
            }
            SkipReason::SharedDependents(owner) => {
                write!(f, "tracks already claimed by {}", owner.display())
            }
            SkipReason::DryRun { command } => write!(f, "dry run: {}", command),
        }
    }
}

/// 单个转换单元的结果，创建后不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Succeeded {
        source: PathBuf,
        output: PathBuf,
        bytes_read: u64,
        bytes_written: u64,
        /// 删除原文件等提交后的问题，不影响转换结果
        warnings: Vec<String>,
    },
    Skipped {
        source: PathBuf,
        reason: SkipReason,
    },
    Failed {
        source: PathBuf,
        kind: ErrorKind,
        message: String,
    },
}

impl JobResult {
    pub fn skipped(source: impl Into<PathBuf>, reason: SkipReason) -> Self {
        JobResult::Skipped {
            source: source.into(),
            reason,
        }
    }

    pub fn failed(source: impl Into<PathBuf>, err: &UnitError) -> Self {
        JobResult::Failed {
            source: source.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// 单元的描述文件路径
    pub fn source(&self) -> &Path {
        match self {
            JobResult::Succeeded { source, .. }
            | JobResult::Skipped { source, .. }
            | JobResult::Failed { source, .. } => source,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobResult::Failed { .. })
    }
}

/// 批次汇总
///
/// 每次运行只生成一次，结果顺序与扫描顺序一致。
#[derive(Debug, Default)]
pub struct BatchReport {
    results: Vec<JobResult>,
    not_started: usize,
}

impl BatchReport {
    pub fn new(results: Vec<JobResult>, not_started: usize) -> Self {
        BatchReport {
            results,
            not_started,
        }
    }

    pub fn results(&self) -> &[JobResult] {
        &self.results
    }

    pub fn succeeded(&self) -> usize {
        self.count(|r| matches!(r, JobResult::Succeeded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, JobResult::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(JobResult::is_failed)
    }

    /// 中断后未开始的单元数
    pub fn not_started(&self) -> usize {
        self.not_started
    }

    pub fn is_partial(&self) -> bool {
        self.not_started > 0
    }

    pub fn total(&self) -> usize {
        self.results.len() + self.not_started
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|r| r.is_failed())
    }

    /// 成功单元的输入与输出总字节数
    pub fn byte_totals(&self) -> (u64, u64) {
        self.results
            .iter()
            .fold((0, 0), |(read, written), r| match r {
                JobResult::Succeeded {
                    bytes_read,
                    bytes_written,
                    ..
                } => (read + bytes_read, written + bytes_written),
                _ => (read, written),
            })
    }

    fn count<F>(&self, pred: F) -> usize
    where
        F: Fn(&JobResult) -> bool,
    {
        self.results.iter().filter(|r| pred(r)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(read: u64, written: u64) -> JobResult {
        JobResult::Succeeded {
            source: PathBuf::from("a.cue"),
            output: PathBuf::from("a.chd"),
            bytes_read: read,
            bytes_written: written,
            warnings: vec![],
        }
    }

    #[test]
    fn test_report_counts() {
        let report = BatchReport::new(
            vec![
                success(1000, 400),
                JobResult::skipped("orphan.bin", SkipReason::UnknownFormat),
                JobResult::Failed {
                    source: PathBuf::from("broken.cue"),
                    kind: ErrorKind::MissingTrack,
                    message: "missing".to_string(),
                },
                success(1000, 600),
            ],
            2,
        );

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.total(), 6);
        assert!(report.is_partial());
        assert_eq!(report.byte_totals(), (2000, 1000));
        assert_eq!(
            report.failures().next().map(|r| r.source()),
            Some(Path::new("broken.cue"))
        );
    }

    #[test]
    fn test_empty_report() {
        let report = BatchReport::default();
        assert_eq!(report.byte_totals(), (0, 0));
        assert!(!report.is_partial());
    }
}
