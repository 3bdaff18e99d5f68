//! # compress 命令实现
//!
//! 扫描目录，按格式选择后端并行压缩，最后输出汇总。
//!
//! ## 功能
//! - 启动时校验参数（任何问题都在派发前报错退出）
//! - 一次性解析后端工具路径，缺失的工具给出警告
//! - 第一次 Ctrl-C 后不再派发新单元，已运行的单元照常结束
//! - 第二次 Ctrl-C 杀死正在运行的后端，清理工作目录后输出部分汇总并以非零状态退出
//! - 汇总：成功/跳过/失败数量、未开始的单元、节省空间、失败表格
//! - 可选导出 CSV 报告
//!
//! ## 依赖关系
//! - 使用 `cli/compress.rs` 定义的参数
//! - 使用 `batch/` 收集、规划、执行，`pipeline/` 处理单个单元
//! - 使用 `utils/output.rs` 输出

use crate::batch::{planner, BatchRunner, FileCollector};
use crate::cli::compress::CompressArgs;
use crate::error::{Result, RomcompError};
use crate::models::{BatchReport, FormatKind, JobResult, SkipReason};
use crate::pipeline::finalizer::Finalizer;
use crate::pipeline::registry::{BackendRegistry, IsoTarget};
use crate::pipeline::supervisor::Supervisor;
use crate::pipeline::tools::{Tool, ToolLocator};
use crate::pipeline::UnitPipeline;
use crate::utils::output;

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};

/// Ctrl-C 状态：第一次置位 `cancel`，第二次置位 `abort`
#[derive(Debug, Clone, Default)]
struct Interrupt {
    cancel: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
}

impl Interrupt {
    fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}

/// 一次 compress 运行的配置，启动后不再修改
#[derive(Debug, Clone)]
struct CompressConfig {
    root: PathBuf,
    jobs: usize,
    enabled: HashSet<FormatKind>,
    iso_target: IsoTarget,
    timeout: Duration,
    remove: bool,
    flatten: bool,
    dry_run: bool,
    excludes: Vec<String>,
    report: Option<PathBuf>,
    tool_overrides: HashMap<Tool, PathBuf>,
    verbose: bool,
}

impl CompressConfig {
    /// 校验参数并组装配置
    fn from_args(args: CompressArgs, verbose: bool) -> Result<Self> {
        if !args.root.exists() {
            return Err(RomcompError::PathNotFound {
                path: args.root.display().to_string(),
            });
        }

        if args.timeout == 0 {
            return Err(RomcompError::InvalidArgument(
                "--timeout must be greater than 0".to_string(),
            ));
        }

        if args.flatten && !args.remove {
            return Err(RomcompError::InvalidArgument(
                "--flatten only makes sense together with --remove".to_string(),
            ));
        }

        if args.flatten && !args.root.is_dir() {
            return Err(RomcompError::InvalidArgument(
                "--flatten needs a directory to scan".to_string(),
            ));
        }

        let enabled: HashSet<FormatKind> = args.enabled_formats().into_iter().collect();
        if enabled.is_empty() {
            return Err(RomcompError::InvalidArgument(
                "every format is disabled, nothing to do".to_string(),
            ));
        }

        Ok(Self {
            tool_overrides: args.tools.overrides(),
            root: args.root,
            jobs: args.jobs,
            enabled,
            iso_target: args.iso_target,
            timeout: Duration::from_secs(args.timeout),
            remove: args.remove,
            flatten: args.flatten,
            dry_run: args.dry_run,
            excludes: args.exclude,
            report: args.report,
            verbose,
        })
    }

    fn finalizer(&self) -> Finalizer {
        let flatten_root = self.flatten.then(|| self.root.clone());
        Finalizer::new(self.remove, flatten_root)
    }
}

/// 执行 compress 命令
pub fn execute(args: CompressArgs, verbose: bool) -> Result<()> {
    let config = CompressConfig::from_args(args, verbose)?;

    if config.dry_run {
        output::print_header("Compressing (dry run)");
    } else {
        output::print_header("Compressing");
    }

    let registry = BackendRegistry::new(
        config.enabled.clone(),
        config.iso_target,
        ToolLocator::discover(&config.tool_overrides),
    );
    for (kind, tool) in registry.missing_tools() {
        output::print_warning(&format!(
            "'{}' not found, {} files will be skipped",
            tool, kind
        ));
    }

    let interrupt = Interrupt::default();
    install_interrupt_handler(interrupt.clone())?;

    let report = run_batch(&config, &registry, &interrupt)?;

    print_summary(&report, config.dry_run);

    if let Some(path) = &config.report {
        write_report(&report, path)?;
        output::print_success(&format!("Report saved to '{}'", path.display()));
    }

    if interrupt.aborted() {
        return Err(RomcompError::Aborted);
    }

    Ok(())
}

/// 第一次 Ctrl-C 停止派发，第二次中止正在运行的后端
///
/// 处理函数只置位标志，进程退出由主线程在清理完成后进行。
fn install_interrupt_handler(interrupt: Interrupt) -> Result<()> {
    ctrlc::set_handler(move || {
        if interrupt.cancel.swap(true, Ordering::SeqCst) {
            if !interrupt.abort.swap(true, Ordering::SeqCst) {
                output::print_warning("Aborting: killing running conversions");
            }
            return;
        }
        output::print_warning(
            "Interrupted: waiting for running conversions to finish (Ctrl-C again to abort)",
        );
    })?;
    Ok(())
}

/// 收集、规划并执行整个批次
fn run_batch(
    config: &CompressConfig,
    registry: &BackendRegistry,
    interrupt: &Interrupt,
) -> Result<BatchReport> {
    let collector = FileCollector::new(config.root.clone()).with_excludes(&config.excludes)?;
    let files = collector.collect();

    if files.is_empty() {
        output::print_warning(&format!("No files found under {}", config.root.display()));
        return Ok(BatchReport::default());
    }
    if collector.is_single_file() {
        output::print_info(&format!("Single file: {}", config.root.display()));
    } else {
        output::print_info(&format!("Found {} files", files.len()));
    }

    let planned = planner::plan(&files);

    let supervisor = Supervisor::new(config.timeout).with_abort(Arc::clone(&interrupt.abort));
    let finalizer = config.finalizer();
    let pipeline = UnitPipeline::new(registry, &supervisor, &finalizer, config.dry_run);

    let runner = BatchRunner::new(config.jobs)
        .with_cancel(Arc::clone(&interrupt.cancel))
        .verbose(config.verbose);
    tracing::debug!("running with {} workers", runner.jobs());

    runner.run(planned, |unit| pipeline.process(unit))
}

/// 失败表格行
#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// 打印批次汇总
fn print_summary(report: &BatchReport, dry_run: bool) {
    output::print_separator();

    if dry_run {
        let planned = report
            .results()
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    JobResult::Skipped {
                        reason: SkipReason::DryRun { .. },
                        ..
                    }
                )
            })
            .count();
        output::print_done(&format!(
            "{} units would be converted, {} skipped, {} failed",
            planned,
            report.skipped() - planned,
            report.failed()
        ));
    } else {
        output::print_done(&format!(
            "{} converted, {} skipped, {} failed",
            report.succeeded(),
            report.skipped(),
            report.failed()
        ));
    }

    if report.is_partial() {
        output::print_warning(&format!(
            "Interrupted: {} of {} units were never started",
            report.not_started(),
            report.total()
        ));
    }

    if report.succeeded() > 0 {
        let (read, written) = report.byte_totals();
        output::print_info(&format!(
            "Space saved: {}",
            output::format_saved(read, written)
        ));
    }

    let rows: Vec<FailureRow> = report
        .failures()
        .filter_map(|r| match r {
            JobResult::Failed {
                source,
                kind,
                message,
            } => Some(FailureRow {
                source: source.display().to_string(),
                kind: kind.to_string(),
                message: output::headline(message),
            }),
            _ => None,
        })
        .collect();

    if !rows.is_empty() {
        output::print_header(&format!("{} Failed Units", rows.len()));
        println!("{}", Table::new(&rows));
    }
}

/// CSV 报告中的一行
#[derive(Debug, Serialize)]
struct ReportRecord {
    source: String,
    status: String,
    output: String,
    detail: String,
    bytes_read: Option<u64>,
    bytes_written: Option<u64>,
}

impl From<&JobResult> for ReportRecord {
    fn from(result: &JobResult) -> Self {
        let source = result.source().display().to_string();
        match result {
            JobResult::Succeeded {
                output,
                bytes_read,
                bytes_written,
                warnings,
                ..
            } => ReportRecord {
                source,
                status: "succeeded".to_string(),
                output: output.display().to_string(),
                detail: warnings.join("; "),
                bytes_read: Some(*bytes_read),
                bytes_written: Some(*bytes_written),
            },
            JobResult::Skipped { reason, .. } => ReportRecord {
                source,
                status: "skipped".to_string(),
                output: String::new(),
                detail: reason.to_string(),
                bytes_read: None,
                bytes_written: None,
            },
            JobResult::Failed { kind, message, .. } => ReportRecord {
                source,
                status: format!("failed ({})", kind),
                output: String::new(),
                detail: message.replace('\n', " "),
                bytes_read: None,
                bytes_written: None,
            },
        }
    }
}

/// 导出批次报告到 CSV
fn write_report(report: &BatchReport, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    for result in report.results() {
        wtr.serialize(ReportRecord::from(result))?;
    }

    wtr.flush().map_err(|e| RomcompError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}
