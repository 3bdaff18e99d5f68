//! # 数据模型模块
//!
//! 定义格式分类、转换单元以及作业结果的数据模型。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `batch/`, `pipeline/` 和 `commands/` 使用
//! - 子模块: unit, job

pub mod job;
pub mod unit;

pub use job::{BatchReport, ErrorKind, JobResult, SkipReason};
pub use unit::{ConversionUnit, FormatKind};
