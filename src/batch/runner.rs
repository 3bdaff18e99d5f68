//! # 批量执行器
//!
//! 在有界线程池中并行执行计划好的作业。
//!
//! ## 功能
//! - 基于 rayon 的并行迭代，线程数即同时运行的后端进程上限
//! - 结果顺序与计划顺序一致
//! - 中断标志置位后不再派发新单元，已运行的单元照常结束
//! - 进度条显示，逐条输出结果
//!
//! ## 依赖关系
//! - 被 `commands/compress.rs` 调用
//! - 使用 `utils/progress.rs` 创建进度条，`utils/output.rs` 打印结果
//! - 使用 `rayon` 进行并行处理

use super::planner::PlannedJob;
use crate::error::Result;
use crate::models::{BatchReport, ConversionUnit, JobResult};
use crate::utils::{output, progress};

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 批量执行器
pub struct BatchRunner {
    /// 并行作业数
    jobs: usize,
    /// 中断标志
    cancel: Arc<AtomicBool>,
    /// 是否逐条打印跳过的文件
    verbose: bool,
}

impl BatchRunner {
    /// 创建新的批量执行器，`jobs == 0` 时使用 CPU 核数
    pub fn new(jobs: usize) -> Self {
        let jobs = if jobs == 0 { num_cpus::get() } else { jobs };
        Self {
            jobs,
            cancel: Arc::new(AtomicBool::new(false)),
            verbose: false,
        }
    }

    /// 使用外部的中断标志
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// 并行处理作业列表
    pub fn run<F>(&self, planned: Vec<PlannedJob>, processor: F) -> Result<BatchReport>
    where
        F: Fn(&ConversionUnit) -> JobResult + Sync + Send,
    {
        let pb = progress::create_progress_bar(planned.len() as u64, "Compressing");

        // 配置 rayon 线程池
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()?;

        let outcomes: Vec<Option<JobResult>> = pool.install(|| {
            planned
                .into_par_iter()
                .map(|job| {
                    let result = match job {
                        PlannedJob::Resolved(result) => result,
                        PlannedJob::Convert(unit) => {
                            if self.cancel.load(Ordering::SeqCst) {
                                pb.inc(1);
                                return None;
                            }
                            pb.set_message(
                                unit.descriptor()
                                    .file_name()
                                    .map(|n| n.to_string_lossy().into_owned())
                                    .unwrap_or_default(),
                            );
                            processor(&unit)
                        }
                    };

                    pb.suspend(|| output::print_job_result(&result, self.verbose));
                    pb.inc(1);
                    Some(result)
                })
                .collect()
        });

        pb.finish_and_clear();

        // 汇总结果
        let not_started = outcomes.iter().filter(|o| o.is_none()).count();
        let results = outcomes.into_iter().flatten().collect();

        Ok(BatchReport::new(results, not_started))
    }
}
