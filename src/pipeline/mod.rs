//! # 转换流水线
//!
//! 对单个 `ConversionUnit` 依次执行：查找后端 → 暂存输入 → 运行后端 →
//! 打包 → 校验 → 提交。
//!
//! ## 功能
//! - 每个单元在其所在目录下有独立的临时工作目录（`.romcomp-*`），
//!   与最终位置在同一文件系统，提交不需要复制数据
//! - 工作目录由 `TempDir` 持有，成功、失败、超时都会被删除
//! - 任何单元错误都转换为 `JobResult`，不会向上传播
//! - 已是规范布局的单元（.z64）不运行工具，直接打包
//!
//! ## 依赖关系
//! - 被 `batch/runner.rs`（经由 `commands/compress.rs`）调用
//! - 子模块: resolver, registry, tools, supervisor, packager, finalizer

pub mod finalizer;
pub mod packager;
pub mod registry;
pub mod resolver;
pub mod supervisor;
pub mod tools;

use crate::error::UnitError;
use crate::models::{ConversionUnit, FormatKind, JobResult, SkipReason};
use crate::parsers::cue;
use finalizer::Finalizer;
use registry::{BackendRegistry, Packaging, Produces, Resolved, Route};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use supervisor::Supervisor;

/// 临时工作目录前缀，扫描时会跳过这些目录
pub const WORKDIR_PREFIX: &str = ".romcomp-";

/// 单元流水线，所有工作线程共享同一个实例
pub struct UnitPipeline<'a> {
    registry: &'a BackendRegistry,
    supervisor: &'a Supervisor,
    finalizer: &'a Finalizer,
    dry_run: bool,
}

impl<'a> UnitPipeline<'a> {
    pub fn new(
        registry: &'a BackendRegistry,
        supervisor: &'a Supervisor,
        finalizer: &'a Finalizer,
        dry_run: bool,
    ) -> Self {
        Self {
            registry,
            supervisor,
            finalizer,
            dry_run,
        }
    }

    /// 处理一个单元，总是返回结果
    pub fn process(&self, unit: &ConversionUnit) -> JobResult {
        let source = unit.descriptor();

        let route = match self.registry.route(unit) {
            Ok(route) => route,
            Err(e) => return JobResult::skipped(source, e.into()),
        };

        let target = Finalizer::target_path(unit, route.backend().artifact);
        if target.exists() {
            return JobResult::skipped(source, SkipReason::TargetExists(target));
        }

        if self.dry_run {
            return JobResult::skipped(
                source,
                SkipReason::DryRun {
                    command: self.planned_command(unit, &route, &target),
                },
            );
        }

        match self.convert(unit, &route, &target) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!("{} failed: {}", source.display(), e);
                JobResult::failed(source, &e)
            }
        }
    }

    /// dry-run 中显示的命令，工作目录用占位名
    fn planned_command(&self, unit: &ConversionUnit, route: &Route<'_>, target: &Path) -> String {
        match route {
            Route::Tool(resolved) => {
                let workdir = unit.directory().join(format!("{}XXXXXX", WORKDIR_PREFIX));
                let output = workdir.join(target.file_name().unwrap_or_default());
                let input = planned_input(unit, resolved, &workdir);
                self.registry
                    .invocation(resolved, &input, &output, &workdir)
                    .command_line()
            }
            Route::PackageOnly(_) => format!(
                "zip {} -> {}",
                unit.descriptor().display(),
                target.display()
            ),
        }
    }

    fn convert(
        &self,
        unit: &ConversionUnit,
        route: &Route<'_>,
        target: &Path,
    ) -> Result<JobResult, UnitError> {
        let bytes_read = unit.input_bytes();

        let workdir = tempfile::Builder::new()
            .prefix(WORKDIR_PREFIX)
            .tempdir_in(unit.directory())
            .map_err(|e| UnitError::workspace(unit.directory(), e))?;
        tracing::debug!("work directory {}", workdir.path().display());

        let artifact = workdir
            .path()
            .join(target.file_name().unwrap_or_default());

        match route {
            Route::Tool(resolved) => self.run_backend(unit, resolved, workdir.path(), &artifact)?,
            Route::PackageOnly(_) => {
                tracing::debug!("{} needs no backend, packaging only", unit.descriptor().display());
                packager::zip_single(unit.descriptor(), &artifact)?;
            }
        }

        Finalizer::verify(&artifact, route.backend().artifact)?;
        let committed = self.finalizer.commit(unit, &artifact, target)?;

        if let Err(e) = workdir.close() {
            tracing::warn!("could not remove work directory: {}", e);
        }
        let committed = self.finalizer.settle(committed);

        Ok(JobResult::Succeeded {
            source: unit.descriptor().to_path_buf(),
            output: committed.output,
            bytes_read,
            bytes_written: committed.bytes_written,
            warnings: committed.warnings,
        })
    }

    /// 暂存输入并运行后端，产物写到 `artifact`
    fn run_backend(
        &self,
        unit: &ConversionUnit,
        resolved: &Resolved<'_>,
        workdir: &Path,
        artifact: &Path,
    ) -> Result<(), UnitError> {
        let backend = resolved.backend;
        let input = stage_input(unit, resolved, workdir)?;

        let invocation = self.registry.invocation(resolved, &input, artifact, workdir);
        self.supervisor.execute(&invocation)?;

        if backend.packaging == Packaging::Zip {
            let produced = backend.produced_path(&input, workdir, artifact);
            packager::zip_single(&produced, artifact)?;
        }
        Ok(())
    }
}

fn has_cue_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("cue"))
        .unwrap_or(false)
}

fn cue_stage_path(unit: &ConversionUnit, workdir: &Path) -> PathBuf {
    let mut name = unit.stem();
    name.push(".cue");
    workdir.join(name)
}

fn in_place_stage_path(unit: &ConversionUnit, workdir: &Path) -> PathBuf {
    workdir
        .join("stage")
        .join(unit.descriptor().file_name().unwrap_or_default())
}

/// 后端实际接收的输入路径（不产生任何文件）
fn planned_input(unit: &ConversionUnit, resolved: &Resolved<'_>, workdir: &Path) -> PathBuf {
    if resolved.backend.produces == Produces::InPlace {
        in_place_stage_path(unit, workdir)
    } else if unit.kind() == FormatKind::CueBin && !has_cue_extension(unit.descriptor()) {
        cue_stage_path(unit, workdir)
    } else {
        unit.descriptor().to_path_buf()
    }
}

/// 准备后端输入
///
/// - 原地修改的工具拿到的是工作目录中的副本
/// - 非 `.cue` 命名的 cue sheet 被改写为 `<stem>.cue`，轨道使用绝对路径
fn stage_input(
    unit: &ConversionUnit,
    resolved: &Resolved<'_>,
    workdir: &Path,
) -> Result<PathBuf, UnitError> {
    let staged = planned_input(unit, resolved, workdir);
    if staged == unit.descriptor() {
        return Ok(staged);
    }

    if resolved.backend.produces == Produces::InPlace {
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent).map_err(|e| UnitError::workspace(parent, e))?;
        }
        fs::copy(unit.descriptor(), &staged).map_err(|e| UnitError::workspace(&staged, e))?;
    } else {
        let text = restage_cue(unit)?;
        fs::write(&staged, text).map_err(|e| UnitError::workspace(&staged, e))?;
    }

    tracing::debug!(
        "staged {} as {}",
        unit.descriptor().display(),
        staged.display()
    );
    Ok(staged)
}

/// cue 文本中的轨道名换成已解析的绝对路径
fn restage_cue(unit: &ConversionUnit) -> Result<String, UnitError> {
    let descriptor = unit.descriptor();
    let bytes = fs::read(descriptor).map_err(|source| UnitError::UnreadableInput {
        path: descriptor.to_path_buf(),
        source,
    })?;
    let content = String::from_utf8_lossy(&bytes);
    let sheet = cue::parse_cue_content(&content).ok_or_else(|| UnitError::UnreadableInput {
        path: descriptor.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidData, "not a valid cue sheet"),
    })?;
    let tracks = resolver::resolve_tracks(descriptor, &sheet);

    Ok(cue::rewrite_file_names(&content, |name| {
        tracks
            .iter()
            .find(|t| t.name == name)
            .and_then(|t| t.path.as_ref())
            .map(|p| fs::canonicalize(p).unwrap_or_else(|_| p.clone()))
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string())
    }))
}
