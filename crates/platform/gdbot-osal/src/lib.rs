//! gdbot-osal: 操作系统抽象层
//!
//! 提供调试器子进程的跨平台抽象：进程创建、标准输入写通道、
//! 合并后的 stdout/stderr 读通道、中断信号投递以及终止回收。
//!
//! 平台相关部分在编译期通过 `cfg` 选择（见 [`sys`] 模块），
//! 共享逻辑中不做运行时平台分支。

use std::ffi::OsString;
use std::io::{self, PipeReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

mod sys;

// ============================================================================
// 平台检测
// ============================================================================

pub fn host_os() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        return "linux";
    }
    #[cfg(target_os = "macos")]
    {
        return "macos";
    }
    #[cfg(target_os = "windows")]
    {
        return "windows";
    }
    #[allow(unreachable_code)]
    "unknown"
}

/// 空设备路径，用于丢弃被调试程序的输出
pub fn null_device() -> &'static str {
    sys::NULL_DEVICE
}

// ============================================================================
// 错误类型
// ============================================================================

/// 进程操作结果
pub type ProcessResult<T> = Result<T, ProcessError>;

/// 进程错误类型
#[derive(Debug)]
pub enum ProcessError {
    /// 匿名管道创建失败
    PipeCreation(io::Error),
    /// 子进程创建失败
    Spawn { program: String, source: io::Error },
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::PipeCreation(e) => write!(f, "Pipe creation failed: {}", e),
            ProcessError::Spawn { program, source } => {
                write!(f, "Failed to spawn '{}': {}", program, source)
            }
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcessError::PipeCreation(e) => Some(e),
            ProcessError::Spawn { source, .. } => Some(source),
        }
    }
}

// ============================================================================
// 传输抽象
// ============================================================================

/// 单次轮询的读取结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// 读取到 n 个字节
    Data(usize),
    /// 等待期间没有数据
    Idle,
    /// 对端已关闭（进程退出或管道断开）
    Closed,
}

/// 调试器传输能力接口
///
/// 一个实现对应一个子进程及其两条字节通道。所有方法都在调用线程上
/// 同步执行，不支持并发访问。
pub trait Transport {
    /// 向子进程输入流写入全部字节
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// 最多等待 `wait`，读取当前可用的输出
    fn poll_read(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<ReadStatus>;

    /// 投递异步中断（Unix 上为 SIGINT，Windows 上为 CTRL_C 控制台事件）
    fn interrupt(&mut self) -> io::Result<()>;

    /// 关闭两条通道，终止并回收子进程，返回退出码
    ///
    /// 重复调用返回第一次回收时的结果。
    fn terminate(&mut self) -> io::Result<Option<i32>>;

    /// 子进程 ID（已回收后为 `None`）
    fn process_id(&self) -> Option<u32>;
}

// ============================================================================
// 子进程
// ============================================================================

/// 子进程启动参数
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
}

impl SpawnSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// SIGTERM 之后等待子进程自行退出的时间
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// 回收等待的轮询间隔
const REAP_TICK: Duration = Duration::from_millis(10);

/// 调试器子进程
///
/// stdout 与 stderr 指向同一条匿名管道的写端，父进程持有读端，
/// 因此两路输出按写入顺序合并到一个读通道中。
pub struct ChildProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    output: Option<PipeReader>,
    exit_code: Option<i32>,
    reaped: bool,
}

impl ChildProcess {
    /// 创建子进程并建立通道
    pub fn spawn(spec: &SpawnSpec) -> ProcessResult<Self> {
        let (output, writer) = io::pipe().map_err(ProcessError::PipeCreation)?;
        let err_writer = writer.try_clone().map_err(ProcessError::PipeCreation)?;

        // Command 在此作用域结束时释放，父进程中的写端副本随之关闭，
        // 子进程退出后读端才能观察到 EOF。
        let mut child = {
            let mut command = Command::new(&spec.program);
            command
                .args(&spec.args)
                .stdin(Stdio::piped())
                .stdout(Stdio::from(writer))
                .stderr(Stdio::from(err_writer));
            if let Some(dir) = &spec.working_dir {
                command.current_dir(dir);
            }
            command.spawn().map_err(|source| ProcessError::Spawn {
                program: spec.program.clone(),
                source,
            })?
        };

        let stdin = child.stdin.take();
        Ok(Self {
            child,
            stdin,
            output: Some(output),
            exit_code: None,
            reaped: false,
        })
    }

    /// 子进程是否已回收
    pub fn is_reaped(&self) -> bool {
        self.reaped
    }

    fn wait_with_deadline(&mut self, grace: Duration) -> io::Result<Option<ExitStatus>> {
        let deadline = Instant::now() + grace;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(REAP_TICK);
        }
    }
}

impl Transport for ChildProcess {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "write channel closed"))?;
        stdin.write_all(data)?;
        stdin.flush()
    }

    fn poll_read(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<ReadStatus> {
        match self.output.as_mut() {
            Some(output) => sys::poll_read(output, buf, wait),
            None => Ok(ReadStatus::Closed),
        }
    }

    fn interrupt(&mut self) -> io::Result<()> {
        if self.reaped {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "process already reaped",
            ));
        }
        sys::interrupt(&self.child)
    }

    fn terminate(&mut self) -> io::Result<Option<i32>> {
        if self.reaped {
            return Ok(self.exit_code);
        }

        self.output.take();
        self.stdin.take();

        let status = match self.child.try_wait()? {
            Some(status) => status,
            None => {
                // 进程可能恰好在此期间退出，请求失败不影响后续回收
                let _ = sys::request_stop(&mut self.child);
                match self.wait_with_deadline(TERMINATE_GRACE)? {
                    Some(status) => status,
                    None => {
                        self.child.kill()?;
                        self.child.wait()?
                    }
                }
            }
        };

        self.exit_code = status.code();
        self.reaped = true;
        Ok(self.exit_code)
    }

    fn process_id(&self) -> Option<u32> {
        if self.reaped {
            None
        } else {
            Some(self.child.id())
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if !self.is_reaped() {
            let _ = self.terminate();
        }
    }
}

// ============================================================================
// 测试
// ============================================================================
