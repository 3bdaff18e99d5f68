//! # 批量处理模块
//!
//! 扫描根目录、生成转换计划并并行执行。
//!
//! ## 功能
//! - 自动检测输入类型（文件/目录）
//! - 收集候选文件列表
//! - 嗅探、认领与去重，得到有序作业列表
//! - 并行处理，进度反馈与汇总
//!
//! ## 依赖关系
//! - 被 `commands/compress.rs` 和 `commands/scan.rs` 使用
//! - 使用 `rayon` 进行并行处理
//! - 使用 `indicatif` 显示进度

pub mod collector;
pub mod planner;
pub mod runner;

pub use collector::FileCollector;
pub use planner::PlannedJob;
pub use runner::BatchRunner;
