//! # 统一错误处理模块
//!
//! 定义 romcomp 的所有错误类型，使用 `thiserror` 派生。
//!
//! - `RomcompError`: 运行级错误，出现即中止整个批次（FatalConfig）
//! - `UnitError`: 单个转换单元的错误，只记录到 `JobResult`，不会中止批次
//! - `UnknownBackend`: 格式没有可用后端，单元记为跳过
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 使用 `models/job.rs` 的 `ErrorKind`

use crate::models::{ErrorKind, FormatKind, SkipReason};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// romcomp 运行级错误类型
#[derive(Error, Debug)]
pub enum RomcompError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 参数错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // 运行环境
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to install interrupt handler: {0}")]
    InterruptHandler(#[from] ctrlc::Error),

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    // ─────────────────────────────────────────────────────────────
    // CSV 错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Aborted by second interrupt, report is partial")]
    Aborted,
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, RomcompError>;

/// 后端查找失败，对应的单元会被跳过而不是失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnknownBackend {
    #[error("no backend for {0}")]
    NoBackend(FormatKind),

    #[error("already compressed")]
    AlreadyCompressed,

    #[error("{0} is disabled")]
    Disabled(FormatKind),

    #[error("{kind} needs '{tool}' which is not available")]
    ToolUnavailable { kind: FormatKind, tool: &'static str },
}

impl From<UnknownBackend> for SkipReason {
    fn from(err: UnknownBackend) -> Self {
        match err {
            UnknownBackend::NoBackend(kind) => SkipReason::NoBackend(kind),
            UnknownBackend::AlreadyCompressed => SkipReason::AlreadyCompressed,
            UnknownBackend::Disabled(kind) => SkipReason::Disabled(kind),
            UnknownBackend::ToolUnavailable { kind, tool } => SkipReason::ToolUnavailable {
                kind,
                tool: tool.to_string(),
            },
        }
    }
}

/// 单个转换单元的错误
///
/// 每个变体对应一个 `ErrorKind`，由批次调度器转换为 `JobResult`。
#[derive(Error, Debug)]
pub enum UnitError {
    #[error("cannot read {}: {source}", path.display())]
    UnreadableInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} references missing track file '{track}'", cue.display())]
    MissingTrack { cue: PathBuf, track: String },

    #[error("{tool} failed ({status}):\n{diagnostics}")]
    BackendError {
        tool: String,
        status: String,
        diagnostics: String,
    },

    #[error("{tool} did not finish within {after:?} and was killed")]
    Timeout { tool: String, after: Duration },

    #[error("{tool} was killed because the batch was aborted")]
    Interrupted { tool: String },

    #[error("output {} rejected: {reason}", path.display())]
    VerificationFailed { path: PathBuf, reason: String },

    #[error("could not commit {}: {reason}", path.display())]
    FinalizeFailed { path: PathBuf, reason: String },
}

impl UnitError {
    /// 错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            UnitError::UnreadableInput { .. } => ErrorKind::UnreadableInput,
            UnitError::MissingTrack { .. } => ErrorKind::MissingTrack,
            UnitError::BackendError { .. } => ErrorKind::BackendError,
            UnitError::Timeout { .. } => ErrorKind::Timeout,
            UnitError::Interrupted { .. } => ErrorKind::Interrupted,
            UnitError::VerificationFailed { .. } => ErrorKind::VerificationFailed,
            UnitError::FinalizeFailed { .. } => ErrorKind::FinalizeFailed,
        }
    }

    /// 工作目录 I/O 失败（复制、打包、创建临时目录）
    pub fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UnitError::FinalizeFailed {
            path: path.into(),
            reason: source.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_backend_skip_reason() {
        let reason: SkipReason = UnknownBackend::ToolUnavailable {
            kind: FormatKind::CueBin,
            tool: "chdman",
        }
        .into();
        assert_eq!(
            reason,
            SkipReason::ToolUnavailable {
                kind: FormatKind::CueBin,
                tool: "chdman".to_string()
            }
        );
        assert_eq!(
            SkipReason::from(UnknownBackend::NoBackend(FormatKind::Unknown)),
            SkipReason::NoBackend(FormatKind::Unknown)
        );
    }

    #[test]
    fn test_unit_error_kinds() {
        let err = UnitError::MissingTrack {
            cue: PathBuf::from("broken.cue"),
            track: "missing.bin".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::MissingTrack);
        assert!(err.to_string().contains("missing.bin"));

        let err = UnitError::Timeout {
            tool: "chdman".to_string(),
            after: Duration::from_secs(3),
        };
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("chdman"));

        let err = UnitError::Interrupted {
            tool: "maxcso".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Interrupted);
        assert_eq!(err.kind().to_string(), "interrupted");
    }
}
