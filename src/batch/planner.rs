//! # 转换计划
//!
//! 把收集到的候选文件变成有序的作业列表。
//!
//! ## 功能
//! - 并行嗅探每个候选文件的格式
//! - cue sheet 引用的文件被 cue 认领，不再单独成为作业
//! - 解析 cue 单元；轨道缺失的单元直接记为失败，不会派发
//! - 依赖文件重叠的单元去重：后出现的单元记为跳过
//!
//! ## 依赖关系
//! - 被 `commands/compress.rs` 和 `commands/scan.rs` 调用
//! - 使用 `parsers/` 嗅探，`pipeline/resolver.rs` 解析单元

use crate::error::UnitError;
use crate::models::{ConversionUnit, FormatKind, JobResult, SkipReason};
use crate::parsers;
use crate::pipeline::resolver;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// 一个计划中的作业
#[derive(Debug, Clone)]
pub enum PlannedJob {
    /// 需要运行后端
    Convert(ConversionUnit),
    /// 规划阶段已确定结果（跳过或失败）
    Resolved(JobResult),
}

impl PlannedJob {
    pub fn source(&self) -> &Path {
        match self {
            PlannedJob::Convert(unit) => unit.descriptor(),
            PlannedJob::Resolved(result) => result.source(),
        }
    }
}

/// 用于比较的路径，解析失败时用原路径
fn identity(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

type Sniffed = (PathBuf, Result<FormatKind, UnitError>);

/// cue sheet 引用的、确实存在的文件
fn claimed_by_cues(sniffed: &[Sniffed]) -> HashMap<PathBuf, PathBuf> {
    let mut claims = HashMap::new();

    for (path, kind) in sniffed {
        if !matches!(kind, Ok(FormatKind::CueBin)) {
            continue;
        }
        let sheet = match parsers::read_cue_sheet(path) {
            Ok(Some(sheet)) => sheet,
            _ => continue,
        };
        for track in resolver::resolve_tracks(path, &sheet) {
            if let Some(track_path) = track.path {
                claims
                    .entry(identity(&track_path))
                    .or_insert_with(|| path.clone());
            }
        }
    }

    claims
}

/// 为单个候选文件生成作业
fn plan_one(path: &Path, kind: Result<FormatKind, UnitError>) -> PlannedJob {
    let kind = match kind {
        Ok(kind) => kind,
        Err(e) => return PlannedJob::Resolved(JobResult::failed(path, &e)),
    };

    match kind {
        FormatKind::Unknown => {
            PlannedJob::Resolved(JobResult::skipped(path, SkipReason::UnknownFormat))
        }
        FormatKind::Chd => {
            PlannedJob::Resolved(JobResult::skipped(path, SkipReason::AlreadyCompressed))
        }
        _ => match resolver::resolve_unit(path, kind) {
            Ok(unit) => PlannedJob::Convert(unit),
            Err(e) => PlannedJob::Resolved(JobResult::failed(path, &e)),
        },
    }
}

/// 依赖文件与前面单元重叠时改为跳过
fn dedup_shared_dependents(jobs: Vec<PlannedJob>) -> Vec<PlannedJob> {
    let mut owners: HashMap<PathBuf, PathBuf> = HashMap::new();

    jobs.into_iter()
        .map(|job| match job {
            PlannedJob::Convert(unit) => {
                let ids: Vec<PathBuf> = unit.files().map(identity).collect();
                if let Some(owner) = ids.iter().find_map(|id| owners.get(id)) {
                    return PlannedJob::Resolved(JobResult::skipped(
                        unit.descriptor(),
                        SkipReason::SharedDependents(owner.clone()),
                    ));
                }
                for id in ids {
                    owners.insert(id, unit.descriptor().to_path_buf());
                }
                PlannedJob::Convert(unit)
            }
            resolved => resolved,
        })
        .collect()
}

/// 生成作业列表，顺序与候选文件顺序一致
pub fn plan(candidates: &[PathBuf]) -> Vec<PlannedJob> {
    let sniffed: Vec<Sniffed> = candidates
        .par_iter()
        .map(|path| (path.clone(), parsers::sniff_file(path)))
        .collect();

    let claims = claimed_by_cues(&sniffed);

    let jobs: Vec<PlannedJob> = sniffed
        .into_iter()
        .filter(|(path, _)| match claims.get(&identity(path)) {
            Some(cue) if cue != path => {
                tracing::debug!("{} belongs to {}", path.display(), cue.display());
                false
            }
            _ => true,
        })
        .map(|(path, kind)| plan_one(&path, kind))
        .collect();

    dedup_shared_dependents(jobs)
}
