//! 测试用传输实现
//!
//! - [`ChunkedTransport`]：按预设分块吐出字节，用于读取器测试
//! - [`ScriptedGdb`]：模拟 MI 解释器的暂停/运行行为和变量存储，
//!   用于会话状态机测试，无需真实调试器

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gdbot_osal::{ReadStatus, Transport};

use crate::mi;

fn copy_out(pending: &mut VecDeque<u8>, buf: &mut [u8]) -> usize {
    let n = pending.len().min(buf.len());
    for (slot, byte) in buf.iter_mut().zip(pending.drain(..n)) {
        *slot = byte;
    }
    n
}

/// 按块返回数据的传输
pub(crate) struct ChunkedTransport {
    chunks: VecDeque<Vec<u8>>,
    gated: VecDeque<Vec<u8>>,
    close_when_drained: bool,
    pub(crate) sent: Vec<String>,
}

impl ChunkedTransport {
    pub(crate) fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            gated: VecDeque::new(),
            close_when_drained: false,
            sent: Vec::new(),
        }
    }

    /// 每收到一次写入才放出下一块，用于控制数据落在哪个读取窗口
    pub(crate) fn gated(chunks: Vec<&str>) -> Self {
        Self {
            gated: chunks.into_iter().map(|c| c.as_bytes().to_vec()).collect(),
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn closing(mut self) -> Self {
        self.close_when_drained = true;
        self
    }

    pub(crate) fn is_drained(&self) -> bool {
        self.chunks.is_empty()
    }

    pub(crate) fn count_sent(&self, command: &str) -> usize {
        self.sent.iter().filter(|line| line.as_str() == command).count()
    }
}

impl Transport for ChunkedTransport {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.sent
            .push(String::from_utf8_lossy(data).trim_end().to_string());
        if let Some(chunk) = self.gated.pop_front() {
            self.chunks.push_back(chunk);
        }
        Ok(())
    }

    fn poll_read(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<ReadStatus> {
        match self.chunks.pop_front() {
            Some(mut chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.chunks.push_front(chunk.split_off(n));
                }
                Ok(ReadStatus::Data(n))
            }
            None if self.close_when_drained => Ok(ReadStatus::Closed),
            None => {
                std::thread::sleep(wait);
                Ok(ReadStatus::Idle)
            }
        }
    }

    fn interrupt(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn terminate(&mut self) -> io::Result<Option<i32>> {
        Ok(Some(0))
    }

    fn process_id(&self) -> Option<u32> {
        None
    }
}

/// 收集 `f` 执行期间当前线程上产生的 INFO 及以上日志
pub(crate) fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buffer = SharedBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    (result, buffer.contents())
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        let bytes = self.0.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if let Ok(mut bytes) = self.0.lock() {
            bytes.extend_from_slice(data);
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 恢复执行后被调试程序的下一次停止
#[derive(Debug, Clone)]
pub(crate) enum Stop {
    /// 在若干次轮询后命中断点
    Breakpoint {
        func: &'static str,
        file: &'static str,
        line: u32,
        after_polls: usize,
    },
    /// 因信号等其他原因停止
    Signal { after_polls: usize },
}

/// 模拟的 MI 解释器
///
/// 运行期间调试器不读取输入，收到的命令排队，停止后依次应答。
pub(crate) struct ScriptedGdb {
    halted: bool,
    started: bool,
    interruptible: bool,
    vars: HashMap<String, String>,
    breakpoints: Vec<String>,
    stops: VecDeque<Stop>,
    current_stop: Option<(Stop, usize)>,
    input: Vec<u8>,
    queued: VecDeque<String>,
    output: VecDeque<u8>,
    closed: bool,
    terminated: bool,
    pub(crate) sent: Vec<String>,
    pub(crate) interrupts: usize,
}

impl ScriptedGdb {
    /// 已在断点处暂停的会话
    pub(crate) fn halted() -> Self {
        Self {
            halted: true,
            started: true,
            interruptible: true,
            vars: HashMap::new(),
            breakpoints: Vec::new(),
            stops: VecDeque::new(),
            current_stop: None,
            input: Vec::new(),
            queued: VecDeque::new(),
            output: VecDeque::new(),
            closed: false,
            terminated: false,
            sent: Vec::new(),
            interrupts: 0,
        }
    }

    /// 正在运行、尚未停止的会话
    pub(crate) fn running() -> Self {
        Self {
            halted: false,
            ..Self::halted()
        }
    }

    pub(crate) fn not_started() -> Self {
        Self {
            started: false,
            ..Self::halted()
        }
    }

    pub(crate) fn uninterruptible(mut self) -> Self {
        self.interruptible = false;
        self
    }

    pub(crate) fn with_var(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }

    pub(crate) fn with_stops(mut self, stops: Vec<Stop>) -> Self {
        self.stops = stops.into();
        self
    }

    /// 调试器退出：剩余输出读完后通道关闭
    pub(crate) fn exit_now(&mut self) {
        self.closed = true;
    }

    pub(crate) fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub(crate) fn breakpoints(&self) -> &[String] {
        &self.breakpoints
    }

    pub(crate) fn is_halted(&self) -> bool {
        self.halted
    }

    pub(crate) fn count_sent(&self, command: &str) -> usize {
        self.sent.iter().filter(|line| line.as_str() == command).count()
    }

    fn emit(&mut self, text: &str) {
        self.output.extend(text.as_bytes());
    }

    fn handle_line(&mut self, line: String) {
        if !self.halted {
            self.queued.push_back(line);
            return;
        }
        self.execute(&line);
    }

    fn execute(&mut self, line: &str) {
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "break" => {
                self.breakpoints.push(rest.to_string());
                let reply = format!(
                    "&\"{}\\n\"\n~\"Breakpoint {} at 0x1149: file hello.c, line 30.\\n\"\n\
=breakpoint-created,bkpt={{number=\"{}\",type=\"breakpoint\"}}\n^done\n(gdb) \n",
                    mi::escape(line),
                    self.breakpoints.len(),
                    self.breakpoints.len()
                );
                self.emit(&reply);
            }
            "delete" => {
                self.breakpoints.clear();
                self.emit("&\"delete\\n\"\n^done\n(gdb) \n");
            }
            "run" | "continue" => {
                if command == "continue" && !self.started {
                    self.emit("&\"continue\\n\"\n&\"The program is not being run.\\n\"\n\
^error,msg=\"The program is not being run.\"\n(gdb) \n");
                    return;
                }
                self.started = true;
                self.halted = false;
                self.emit("^running\n*running,thread-id=\"all\"\n(gdb) \n");
                if let Some(stop) = self.stops.pop_front() {
                    self.current_stop = Some((stop, 0));
                }
            }
            "-data-evaluate-expression" => self.evaluate(rest),
            "ping" => self.emit(
                "&\"ping\\n\"\n^error,msg=\"Undefined command: \\\"ping\\\".  Try \\\"help\\\".\"\n(gdb) \n",
            ),
            _ => self.emit("^done\n(gdb) \n"),
        }
    }

    fn evaluate(&mut self, quoted: &str) {
        let quoted = quoted.trim();
        let inner = quoted
            .strip_prefix('"')
            .and_then(|q| q.strip_suffix('"'))
            .unwrap_or(quoted);
        let expression = mi::unescape(inner);
        if let Some((name, value)) = expression.split_once(" = ") {
            let name = name.trim().to_string();
            let value = value.trim().to_string();
            if !self.vars.contains_key(&name) {
                self.emit(&format!(
                    "^error,msg=\"No symbol \\\"{}\\\" in current context.\"\n(gdb) \n",
                    name
                ));
                return;
            }
            self.emit(&format!("^done,value=\"{}\"\n(gdb) \n", mi::escape(&value)));
            self.vars.insert(name, value);
            return;
        }
        match self.vars.get(expression.trim()).cloned() {
            Some(value) => self.emit(&format!("^done,value=\"{}\"\n(gdb) \n", mi::escape(&value))),
            None => self.emit(&format!(
                "^error,msg=\"No symbol \\\"{}\\\" in current context.\"\n(gdb) \n",
                expression.trim()
            )),
        }
    }

    fn halt(&mut self, record: String) {
        self.halted = true;
        self.current_stop = None;
        self.emit(&record);
        while self.halted {
            match self.queued.pop_front() {
                Some(line) => self.execute(&line),
                None => break,
            }
        }
    }

    fn advance(&mut self) {
        let Some((stop, polls)) = self.current_stop.take() else {
            return;
        };
        let due = match &stop {
            Stop::Breakpoint { after_polls, .. } | Stop::Signal { after_polls } => *after_polls,
        };
        if polls < due {
            self.current_stop = Some((stop, polls + 1));
            return;
        }
        let record = match stop {
            Stop::Breakpoint { func, file, line, .. } => format!(
                "~\"\\nBreakpoint 1, {func} () at {file}:{line}\\n\"\n\
*stopped,reason=\"breakpoint-hit\",disp=\"keep\",bkptno=\"1\",frame={{addr=\"0x1149\",\
func=\"{func}\",args=[],file=\"{file}\",fullname=\"/tmp/{file}\",line=\"{line}\"}},\
thread-id=\"1\",stopped-threads=\"all\"\n(gdb) \n"
            ),
            Stop::Signal { .. } => "*stopped,reason=\"signal-received\",signal-name=\"SIGUSR1\",\
frame={addr=\"0x7ffff7e5\",func=\"nanosleep\"},thread-id=\"1\"\n(gdb) \n"
                .to_string(),
        };
        self.halt(record);
    }
}

impl Transport for ScriptedGdb {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if self.closed || self.terminated {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "debugger exited"));
        }
        self.input.extend_from_slice(data);
        while let Some(pos) = self.input.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.input.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).trim_end().to_string();
            self.sent.push(line.clone());
            self.handle_line(line);
        }
        Ok(())
    }

    fn poll_read(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<ReadStatus> {
        self.advance();
        if !self.output.is_empty() {
            return Ok(ReadStatus::Data(copy_out(&mut self.output, buf)));
        }
        if self.closed || self.terminated {
            return Ok(ReadStatus::Closed);
        }
        std::thread::sleep(wait);
        Ok(ReadStatus::Idle)
    }

    fn interrupt(&mut self) -> io::Result<()> {
        self.interrupts += 1;
        if !self.halted && self.interruptible {
            self.halt(
                "*stopped,reason=\"signal-received\",signal-name=\"SIGINT\",\
frame={func=\"nanosleep\"},thread-id=\"1\"\n(gdb) \n"
                    .to_string(),
            );
        }
        Ok(())
    }

    fn terminate(&mut self) -> io::Result<Option<i32>> {
        self.terminated = true;
        Ok(Some(0))
    }

    fn process_id(&self) -> Option<u32> {
        if self.terminated { None } else { Some(4242) }
    }
}
