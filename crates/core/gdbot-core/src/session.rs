//! 调试器会话
//!
//! [`GdbSession`] 持有调试器子进程（或任意 [`Transport`]）并把
//! 基于提示符的异步协议封装为同步调用。协议本身不会直接告诉我们
//! 被调试程序是否在运行，只能通过探测命令能否立即得到应答来推断。

use std::ops::ControlFlow;
use std::path::Path;
use std::time::{Duration, Instant};

use gdbot_osal::{ChildProcess, SpawnSpec, Transport, host_os, null_device};
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{GdbotError, Result};
use crate::mi::{self, BreakpointLocation, LineCarry};
use crate::reader::{ECHO_TARGET, Response, TimedReader, WindowEnd};

/// `run_command` 的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// 累积的输出文本
    pub text: String,
    /// 是否在超时前看到了空闲提示符
    pub completed: bool,
    /// 是否因超过累积上限丢弃了部分输出
    pub truncated: bool,
}

/// 调试器会话
pub struct GdbSession<T: Transport = ChildProcess> {
    transport: T,
    config: SessionConfig,
    debug_echo: bool,
}

impl GdbSession<ChildProcess> {
    /// 以默认配置（叠加环境变量覆盖）启动调试器并加载 `executable`
    pub fn start(executable: impl AsRef<Path>) -> Result<Self> {
        Self::start_with_config(executable, SessionConfig::default().with_env_overrides())
    }

    /// 以指定配置启动调试器
    ///
    /// 命令行为 `<gdb_path> --interpreter=mi <extra_args...> <executable>`，
    /// 相对路径的 `executable` 按 `working_dir` 解析。
    pub fn start_with_config(executable: impl AsRef<Path>, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let executable = executable.as_ref();

        let mut spec = SpawnSpec::new(config.gdb_path.as_str())
            .arg("--interpreter=mi")
            .args(config.extra_args.iter())
            .arg(executable.as_os_str());
        if let Some(dir) = &config.working_dir {
            spec = spec.working_dir(dir);
        }
        let transport = ChildProcess::spawn(&spec)?;

        info!(
            "Started debugger '{}' (pid {:?}, {}) for {}",
            config.gdb_path,
            transport.process_id(),
            host_os(),
            executable.display()
        );
        Ok(Self::with_transport(transport, config))
    }
}

impl<T: Transport> GdbSession<T> {
    /// 在已建立的传输上创建会话
    pub fn with_transport(transport: T, config: SessionConfig) -> Self {
        let debug_echo = config.debug_echo;
        Self {
            transport,
            config,
            debug_echo,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn debug_echo(&self) -> bool {
        self.debug_echo
    }

    /// 打开或关闭协议回显
    pub fn set_debug_echo(&mut self, enabled: bool) {
        self.debug_echo = enabled;
    }

    pub fn process_id(&self) -> Option<u32> {
        self.transport.process_id()
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    #[cfg(test)]
    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// 结束会话：关闭通道、终止并回收调试器进程
    ///
    /// 返回调试器的退出码（被信号终止时为 `None`）。
    pub fn finish(mut self) -> Result<Option<i32>> {
        let code = self.transport.terminate()?;
        debug!("Debugger exited with code {:?}", code);
        Ok(code)
    }

    // ========================================================================
    // 收发原语
    // ========================================================================

    /// 原样写入一段文本，调用方负责换行
    ///
    /// 写入失败只记录日志，不向上传播。
    pub fn send_line(&mut self, text: &str) {
        if self.debug_echo {
            info!(target: ECHO_TARGET, "->[GDB] {}", text.trim_end());
        }
        if let Err(e) = self.transport.write_all(text.as_bytes()) {
            error!("Failed to write to debugger: {}", e);
        }
    }

    fn reader(&self) -> TimedReader {
        TimedReader::new(self.config.response_capacity, self.config.poll_tick())
            .with_echo(self.debug_echo)
    }

    pub(crate) fn read_for(&mut self, timeout: Duration) -> Response {
        let reader = self.reader();
        reader.read_for(&mut self.transport, timeout)
    }

    /// 读掉默认等待窗口内的全部输出
    fn drain(&mut self) -> Response {
        self.read_for(self.config.default_wait())
    }

    /// 发送一行命令并读取默认等待窗口
    fn exchange(&mut self, command: &str) -> Response {
        self.send_line(&format!("{}\n", command));
        self.drain()
    }

    /// 发送探测命令，只有调试器空闲时才会立即应答
    fn probe(&mut self) -> Response {
        let probe = self.config.probe_command.clone();
        self.exchange(&probe)
    }

    // ========================================================================
    // 执行控制
    // ========================================================================

    /// 中断被调试程序，然后等待状态稳定
    pub fn interrupt(&mut self) {
        if let Err(e) = self.transport.interrupt() {
            warn!("Failed to interrupt debuggee: {}", e);
        }
        std::thread::sleep(self.config.interrupt_settle());
    }

    /// 确保被调试程序处于暂停状态
    ///
    /// 每轮发送探测命令，有应答即表示已暂停；否则中断后重试。
    pub fn pause(&mut self) -> Result<()> {
        let attempts = self.config.pause_attempts;
        for attempt in 1..=attempts {
            let response = self.probe();
            if response.closed {
                return Err(GdbotError::ChannelClosed);
            }
            if !response.is_empty() {
                debug!("Debuggee halted after {} probe(s)", attempt);
                return Ok(());
            }
            debug!("No reply to probe {}/{}, interrupting", attempt, attempts);
            self.interrupt();
        }
        let budget = (self.config.default_wait() + self.config.interrupt_settle()) * attempts;
        Err(GdbotError::timeout("pause", budget))
    }

    /// 设置断点
    pub fn set_breakpoint(&mut self, location: &str) {
        self.exchange(&format!("break {}", location));
    }

    /// 设置断点，恢复执行，并等待程序停在该断点
    ///
    /// 在非目标位置停下时会重新发送 `continue`。跨窗口的不完整记录
    /// 留到下一窗口拼接后再判断。
    pub fn set_and_wait_break(&mut self, location: &str, timeout: Duration) -> Result<()> {
        if let Err(e) = self.pause() {
            debug!("Pause before waiting for {} failed: {}", location, e);
        }
        let target = BreakpointLocation::parse(location);
        self.set_breakpoint(location);
        self.send_line("continue\n");

        let start = Instant::now();
        let slice = timeout / 10;
        let mut carry = LineCarry::default();
        while start.elapsed() < timeout {
            let response = self.probe();
            let text = carry.complete(&response.text());
            if mi::breakpoint_hit_at(&text, &target) {
                debug!("Reached breakpoint {} after {:?}", target, start.elapsed());
                return Ok(());
            }
            if response.closed {
                return Err(GdbotError::ChannelClosed);
            }
            if !text.is_empty() && mi::ends_halted(&text) {
                debug!("Halted away from {}, continuing", target);
                self.send_line("continue\n");
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            std::thread::sleep(slice.min(remaining));
        }

        info!("Timed out after {:?} waiting for breakpoint {}", timeout, target);
        self.drain();
        Err(GdbotError::timeout("set_and_wait_break", timeout))
    }

    /// 删除全部断点
    pub fn delete_breakpoints(&mut self) {
        self.exchange("delete");
    }

    /// 启动被调试程序，程序输出重定向到空设备
    pub fn run(&mut self) {
        self.exchange(&format!("run > {}", null_device()));
    }

    /// 恢复执行
    pub fn resume(&mut self) {
        self.exchange("continue");
    }

    /// 发送原始命令并收集输出，直到出现提示符或超时
    ///
    /// 超时不算错误，通过 [`CommandOutput::completed`] 区分。
    pub fn run_command(&mut self, raw: &str, timeout: Duration) -> Result<CommandOutput> {
        let mut line = raw.trim_end_matches(['\r', '\n']).to_string();
        line.push('\n');
        self.send_line(&line);

        let reader = self.reader().with_echo(false);
        let limit = self.config.run_command_limit;
        let slice = self.config.command_slice();
        let prompt = mi::PROMPT.as_bytes();

        let mut collected: Vec<u8> = Vec::new();
        let mut tail: Vec<u8> = Vec::with_capacity(prompt.len() * 2);
        let mut completed = false;
        let mut truncated = false;
        let mut closed = false;

        let start = Instant::now();
        while !completed && !closed {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                break;
            }
            let window_start = collected.len();
            let end = reader.pump(&mut self.transport, slice.min(timeout - elapsed), |chunk| {
                let kept = chunk.len().min(limit - collected.len());
                collected.extend_from_slice(&chunk[..kept]);
                truncated |= kept < chunk.len();

                // 提示符可能跨两个数据块
                tail.extend_from_slice(chunk);
                let found = tail.windows(prompt.len()).any(|w| w == prompt);
                let keep_from = tail.len().saturating_sub(prompt.len() - 1);
                tail.drain(..keep_from);

                if found {
                    completed = true;
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            });
            closed = end == WindowEnd::Closed;

            if self.debug_echo && collected.len() > window_start {
                info!(
                    target: ECHO_TARGET,
                    "[GDB]-> {}",
                    String::from_utf8_lossy(&collected[window_start..])
                );
            }
        }

        if truncated {
            warn!(
                "Output of '{}' exceeded {} bytes and was truncated",
                line.trim_end(),
                limit
            );
        }
        if closed && collected.is_empty() {
            return Err(GdbotError::ChannelClosed);
        }
        Ok(CommandOutput {
            text: String::from_utf8_lossy(&collected).into_owned(),
            completed,
            truncated,
        })
    }
}
