//! # 日志初始化
//!
//! 诊断日志使用 `tracing`，输出到 stderr，与 stdout 上的结果报告分开。
//! 默认级别 `warn`，`--verbose` 为 `debug`，`RUST_LOG` 优先。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `tracing-subscriber`（env-filter）

use tracing_subscriber::EnvFilter;

/// 安装全局 subscriber，重复调用无效果
pub fn init(verbose: bool) {
    let default_level = if verbose { "warn,romcomp=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}
