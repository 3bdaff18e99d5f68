//! # scan 命令实现
//!
//! 只做格式识别和单元解析，打印转换计划，不启动任何后端，不修改任何文件。
//!
//! ## 依赖关系
//! - 使用 `cli/scan.rs` 定义的参数
//! - 使用 `batch/collector.rs`, `batch/planner.rs`
//! - 使用 `pipeline/registry.rs` 推算产物名

use crate::batch::{planner, FileCollector, PlannedJob};
use crate::cli::scan::ScanArgs;
use crate::error::{Result, RomcompError};
use crate::models::{FormatKind, JobResult, SkipReason};
use crate::pipeline::finalizer::Finalizer;
use crate::pipeline::registry::BackendRegistry;
use crate::pipeline::tools::ToolLocator;
use crate::utils::{output, progress};

use std::path::Path;
use tabled::{Table, Tabled};

/// 计划表格行
#[derive(Debug, Tabled)]
struct PlanRow {
    #[tabled(rename = "Descriptor")]
    descriptor: String,
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "Dependents")]
    dependents: usize,
    #[tabled(rename = "Action")]
    action: String,
}

/// 执行 scan 命令
pub fn execute(args: ScanArgs, verbose: bool) -> Result<()> {
    output::print_header("Scanning");

    if !args.root.exists() {
        return Err(RomcompError::PathNotFound {
            path: args.root.display().to_string(),
        });
    }

    let spinner = progress::create_spinner(&format!("Scanning {}", args.root.display()));
    let files = FileCollector::new(args.root.clone())
        .with_excludes(&args.exclude)?
        .collect();
    let planned = planner::plan(&files);
    spinner.finish_and_clear();

    // 只用来推算产物名，不检查工具
    let registry = BackendRegistry::new(
        FormatKind::CONVERTIBLE.into_iter().collect(),
        args.iso_target,
        ToolLocator::default(),
    );

    let show_all = args.all || verbose;
    let rows: Vec<PlanRow> = planned
        .iter()
        .filter(|job| show_all || !is_unknown(job))
        .map(|job| plan_row(job, &registry, &args.root))
        .collect();

    let convertible = planned
        .iter()
        .filter(|job| matches!(job, PlannedJob::Convert(_)))
        .count();

    if rows.is_empty() {
        output::print_warning("Nothing to compress");
    } else {
        println!("{}", Table::new(&rows));
    }

    output::print_done(&format!(
        "{} files scanned, {} units to compress",
        files.len(),
        convertible
    ));

    Ok(())
}

fn is_unknown(job: &PlannedJob) -> bool {
    matches!(
        job,
        PlannedJob::Resolved(JobResult::Skipped {
            reason: SkipReason::UnknownFormat,
            ..
        })
    )
}

/// 相对扫描根目录的显示路径
fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .ok()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(path)
        .display()
        .to_string()
}

fn plan_row(job: &PlannedJob, registry: &BackendRegistry, root: &Path) -> PlanRow {
    match job {
        PlannedJob::Convert(unit) => {
            let action = match registry.backend_of(unit.kind()) {
                Ok(backend) => {
                    let target = Finalizer::target_path(unit, backend.artifact);
                    let how = if backend.is_package_only(unit) {
                        "zip".to_string()
                    } else {
                        backend.tool.to_string()
                    };
                    format!("{} -> {}", how, relative(&target, root))
                }
                Err(e) => format!("skip: {}", e),
            };
            PlanRow {
                descriptor: relative(job.source(), root),
                format: unit.kind().to_string(),
                dependents: unit.dependents().len(),
                action,
            }
        }
        PlannedJob::Resolved(result) => {
            let (format, action) = match result {
                JobResult::Skipped { reason, .. } => {
                    let format = match reason {
                        SkipReason::AlreadyCompressed => FormatKind::Chd,
                        SkipReason::SharedDependents(_) => FormatKind::CueBin,
                        _ => FormatKind::Unknown,
                    };
                    (format, format!("skip: {}", reason))
                }
                JobResult::Failed { kind, message, .. } => (
                    FormatKind::CueBin,
                    format!("{}: {}", kind, output::headline(message)),
                ),
                JobResult::Succeeded { .. } => (FormatKind::Unknown, String::new()),
            };
            PlanRow {
                descriptor: relative(job.source(), root),
                format: format.to_string(),
                dependents: 0,
                action,
            }
        }
    }
}
