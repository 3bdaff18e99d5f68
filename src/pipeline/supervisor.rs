//! # 后端进程监督
//!
//! 启动外部后端进程，收集输出，执行超时并判定退出状态。
//!
//! ## 功能
//! - 参数以 `OsString` 列表直接传给进程，不经过 shell，文件名中的空格和特殊字符无需转义
//! - stdout/stderr 各保留最后 `capture_limit` 字节，不会转发到终端
//! - 超时后强制结束子进程所在的整个进程组，返回 `Timeout`
//! - 中止标志被置位时同样结束进程组，返回 `Interrupted`
//! - Unix 上子进程放在独立进程组，终端的 Ctrl-C 不会直接打断正在运行的后端，
//!   经由包装脚本启动的真正工作进程也会随进程组一起被杀死
//! - 子进程句柄在任何退出路径上都会被回收
//!
//! ## 依赖关系
//! - 被 `pipeline/mod.rs` 和 `pipeline/tools.rs` 使用
//! - 使用 `pipeline/registry.rs` 的 `Invocation` 和 `ExitPolicy`

use super::registry::{ExitClass, Invocation};
use crate::error::UnitError;
use std::ffi::OsString;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

/// 每个输出流保留的字节数
pub const DEFAULT_CAPTURE_LIMIT: usize = 16 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 子进程退出后等待输出读取线程的最长时间
///
/// 孙进程可能继承管道并继续持有，不能无限等待。
const READER_GRACE: Duration = Duration::from_secs(2);

/// 进程结束后捕获到的输出
#[derive(Debug, Clone)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    /// 失败时报告给用户的诊断文本
    pub fn diagnostics(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        "(no output)".to_string()
    }
}

/// 底层运行失败
#[derive(Debug)]
pub enum RunError {
    Spawn(io::Error),
    Wait(io::Error),
    Timeout,
    Aborted,
}

/// 退出后仍在运行的子进程会被杀死并回收
struct ChildGuard(Child);

impl ChildGuard {
    /// 杀死子进程所在的进程组并回收子进程
    ///
    /// 子进程以 `process_group(0)` 启动，进程组号等于它的 pid。
    fn terminate(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            let pgid = Pid::from_raw(self.0.id() as i32);
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                tracing::debug!("killpg {} failed: {}", pgid, e);
            }
        }
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            self.terminate();
        }
    }
}

/// 只保留最后 `limit` 字节
fn read_tail<R: Read>(mut reader: R, limit: usize) -> (Vec<u8>, bool) {
    let mut tail = Vec::with_capacity(limit.min(8192));
    let mut truncated = false;
    let mut chunk = [0u8; 8192];

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > limit {
                    let excess = tail.len() - limit;
                    tail.drain(..excess);
                    truncated = true;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    (tail, truncated)
}

fn spawn_reader<R>(reader: Option<R>, limit: usize, tx: mpsc::Sender<(usize, String)>, slot: usize)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let (bytes, truncated) = match reader {
            Some(r) => read_tail(r, limit),
            None => (Vec::new(), false),
        };
        let mut text = String::from_utf8_lossy(&bytes).into_owned();
        if truncated {
            text.insert_str(0, "...\n");
        }
        let _ = tx.send((slot, text));
    });
}

/// 运行一个进程并等待结束
///
/// 不判断退出码，只负责启动、超时、中止与输出收集。
pub fn run(
    program: &Path,
    args: &[OsString],
    timeout: Duration,
    capture_limit: usize,
    abort: Option<&AtomicBool>,
) -> Result<Captured, RunError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut guard = ChildGuard(cmd.spawn().map_err(RunError::Spawn)?);

    let (tx, rx) = mpsc::channel();
    spawn_reader(guard.0.stdout.take(), capture_limit, tx.clone(), 0);
    spawn_reader(guard.0.stderr.take(), capture_limit, tx, 1);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match guard.0.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                tracing::warn!(
                    "{} exceeded {:?}, killing process group {}",
                    program.display(),
                    timeout,
                    guard.0.id()
                );
                guard.terminate();
                return Err(RunError::Timeout);
            }
            Ok(None) if abort.is_some_and(|flag| flag.load(Ordering::SeqCst)) => {
                tracing::warn!(
                    "aborting {}, killing process group {}",
                    program.display(),
                    guard.0.id()
                );
                guard.terminate();
                return Err(RunError::Aborted);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(RunError::Wait(e)),
        }
    };

    let mut streams = [String::new(), String::new()];
    let grace = Instant::now() + READER_GRACE;
    for _ in 0..2 {
        let remaining = grace.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((slot, text)) => streams[slot] = text,
            Err(_) => {
                tracing::debug!("output of {} still held open, not waiting", program.display());
                break;
            }
        }
    }
    let [stdout, stderr] = streams;

    Ok(Captured {
        status,
        stdout,
        stderr,
    })
}

/// 退出状态的可读描述
pub fn describe_status(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {}", code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("killed by signal {}", signal);
        }
    }

    status.to_string()
}

/// 后端进程监督器，所有工作线程共享
#[derive(Debug, Clone)]
pub struct Supervisor {
    timeout: Duration,
    capture_limit: usize,
    abort: Arc<AtomicBool>,
}

impl Supervisor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 共享中止标志，置位后正在运行的后端会被立即杀死
    pub fn with_abort(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    /// 执行一次后端调用并按退出码策略分类
    pub fn execute(&self, invocation: &Invocation) -> Result<Captured, UnitError> {
        let tool = invocation.tool.to_string();
        tracing::debug!("spawning {}", invocation.command_line());

        let started = Instant::now();
        let captured = run(
            &invocation.program,
            &invocation.args,
            self.timeout,
            self.capture_limit,
            Some(&*self.abort),
        )
        .map_err(|e| match e {
            RunError::Timeout => UnitError::Timeout {
                tool: tool.clone(),
                after: self.timeout,
            },
            RunError::Aborted => UnitError::Interrupted { tool: tool.clone() },
            RunError::Spawn(source) => UnitError::BackendError {
                tool: tool.clone(),
                status: "failed to start".to_string(),
                diagnostics: source.to_string(),
            },
            RunError::Wait(source) => UnitError::BackendError {
                tool: tool.clone(),
                status: "lost track of process".to_string(),
                diagnostics: source.to_string(),
            },
        })?;

        tracing::debug!(
            "{} finished with {} after {:.1?}",
            tool,
            describe_status(&captured.status),
            started.elapsed()
        );

        match invocation.exit_policy.classify(&captured.status) {
            ExitClass::Success => Ok(captured),
            ExitClass::KnownFailure(meaning) => Err(UnitError::BackendError {
                tool,
                status: format!("{}: {}", describe_status(&captured.status), meaning),
                diagnostics: captured.diagnostics(),
            }),
            ExitClass::Unknown => Err(UnitError::BackendError {
                tool,
                status: format!("{}: unexpected", describe_status(&captured.status)),
                diagnostics: captured.diagnostics(),
            }),
        }
    }
}
