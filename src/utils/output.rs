//! # 美化输出工具
//!
//! 提供统一的终端输出样式。
//!
//! ## 依赖关系
//! - 被所有 `commands/` 模块和 `batch/runner.rs` 使用
//! - 使用 `colored` crate

use crate::models::{JobResult, SkipReason};
use colored::Colorize;
use indicatif::HumanBytes;
use std::path::Path;

/// 打印成功消息
pub fn print_success(msg: &str) {
    println!("{} {}", "[OK]".green().bold(), msg);
}

/// 打印错误消息
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERR]".red().bold(), msg);
}

/// 打印警告消息
pub fn print_warning(msg: &str) {
    println!("{} {}", "[WARN]".yellow().bold(), msg);
}

/// 打印信息消息
pub fn print_info(msg: &str) {
    println!("{} {}", "[*]".blue().bold(), msg);
}

/// 打印跳过消息
pub fn print_skip(msg: &str) {
    println!("{} {}", "[SKIP]".dimmed(), msg);
}

/// 打印完成消息
pub fn print_done(msg: &str) {
    println!("{} {}", "[DONE]".green().bold(), msg);
}

/// 打印转换成功消息
pub fn print_conversion(from: &str, to: &str) {
    println!(
        "{} {} {} {}",
        "[OK]".green().bold(),
        from.dimmed(),
        "->".cyan(),
        to
    );
}

/// 打印标题栏
pub fn print_header(title: &str) {
    let line = "─".repeat(60);
    println!("\n{}", line.dimmed());
    println!("  {}", title.bold());
    println!("{}\n", line.dimmed());
}

/// 打印分隔线
pub fn print_separator() {
    println!("{}", "─".repeat(60).dimmed());
}

/// 节省空间的描述，例如 `1.2 GiB (58.3%)`
pub fn format_saved(read: u64, written: u64) -> String {
    let saved = read.saturating_sub(written);
    if read == 0 {
        return HumanBytes(saved).to_string();
    }
    let percent = 100.0 - written as f64 * 100.0 / read as f64;
    format!("{} ({:.1}%)", HumanBytes(saved), percent)
}

/// 多行错误信息的单行摘要：首行加最后一条非空行
///
/// 后端失败时首行只有工具和退出状态，原因在诊断输出的末尾。
pub fn headline(message: &str) -> String {
    let mut lines = message.lines().map(str::trim).filter(|l| !l.is_empty());
    let first = lines.next().unwrap_or_default();
    match lines.last() {
        Some(last) => format!("{} {}", first, last),
        None => first.to_string(),
    }
}

fn display_name(path: &Path) -> String {
    path.display().to_string()
}

/// 打印单个作业结果
///
/// 无法识别的文件数量可能很多，只在 verbose 模式下逐条列出。
pub fn print_job_result(result: &JobResult, verbose: bool) {
    match result {
        JobResult::Succeeded {
            source,
            output,
            bytes_read,
            bytes_written,
            warnings,
        } => {
            print_conversion(
                &display_name(source),
                &format!(
                    "{} [saved {}]",
                    display_name(output),
                    format_saved(*bytes_read, *bytes_written)
                ),
            );
            for warning in warnings {
                print_warning(warning);
            }
        }
        JobResult::Skipped {
            source,
            reason: SkipReason::DryRun { command },
        } => {
            print_info(&format!("{}\n    {}", display_name(source), command));
        }
        JobResult::Skipped {
            source,
            reason: SkipReason::UnknownFormat,
        } => {
            if verbose {
                print_skip(&format!("{}: unknown format", display_name(source)));
            }
        }
        JobResult::Skipped { source, reason } => {
            print_skip(&format!("{}: {}", display_name(source), reason));
        }
        JobResult::Failed {
            source,
            kind,
            message,
        } => {
            print_error(&format!(
                "{} [{}]: {}",
                display_name(source),
                kind,
                headline(message)
            ));
            if verbose && message.lines().count() > 1 {
                for line in message.lines().skip(1) {
                    eprintln!("    {}", line.dimmed());
                }
            }
        }
    }
}
