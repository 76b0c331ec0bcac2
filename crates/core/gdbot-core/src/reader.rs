//! 定时读取器
//!
//! 把调试器的异步字节流切分成有界的"响应窗口"：在超时到达或
//! 通道关闭之前反复短时轮询读通道，并把数据累积到固定容量的缓冲区。
//! 超时只是上限，并不保证窗口内包含一条完整的逻辑响应。

use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use gdbot_osal::{ReadStatus, Transport};
use tracing::{info, warn};

use crate::mi;

/// 回显使用的 tracing target
pub const ECHO_TARGET: &str = "gdbot::echo";

/// 一次读取得到的响应窗口
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    bytes: Vec<u8>,
    /// 因超出容量而丢弃的字节数
    pub truncated: usize,
    /// 读取期间通道是否已关闭
    pub closed: bool,
}

impl Response {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 以文本形式查看（非法 UTF-8 以替换字符呈现）
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn has_prompt(&self) -> bool {
        mi::has_prompt(&self.text())
    }

    pub fn value(&self) -> Option<String> {
        mi::extract_value(&self.text())
    }

    pub fn error_message(&self) -> Option<String> {
        mi::error_message(&self.text())
    }
}

/// 一个读取窗口的结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEnd {
    /// 超时到达
    Elapsed,
    /// 通道关闭
    Closed,
    /// 数据接收方要求提前结束
    Stopped,
    /// 读取出错
    Failed,
}

/// 定时读取器
///
/// 每个实例只服务于一次读取调用，缓冲区在调用结束后随 [`Response`] 返回。
#[derive(Debug, Clone, Copy)]
pub struct TimedReader {
    capacity: usize,
    tick: Duration,
    echo: bool,
}

impl TimedReader {
    pub fn new(capacity: usize, tick: Duration) -> Self {
        Self {
            capacity,
            tick,
            echo: false,
        }
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// 在 `timeout` 内把读到的每个数据块交给 `sink`
    ///
    /// 每次轮询最多等待一个 tick，因此返回时间不会晚于超时加一个 tick。
    pub fn pump<T, F>(&self, transport: &mut T, timeout: Duration, mut sink: F) -> WindowEnd
    where
        T: Transport + ?Sized,
        F: FnMut(&[u8]) -> ControlFlow<()>,
    {
        let start = Instant::now();
        let mut chunk = vec![0u8; self.capacity.max(1)];

        loop {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return WindowEnd::Elapsed;
            }
            let wait = self.tick.min(timeout - elapsed);

            match transport.poll_read(&mut chunk, wait) {
                Ok(ReadStatus::Data(n)) => {
                    if sink(&chunk[..n]).is_break() {
                        return WindowEnd::Stopped;
                    }
                }
                Ok(ReadStatus::Idle) => {}
                Ok(ReadStatus::Closed) => {
                    warn!("Debugger process has exited or pipe closed");
                    return WindowEnd::Closed;
                }
                Err(e) => {
                    warn!("Read from debugger failed: {}", e);
                    return WindowEnd::Failed;
                }
            }
        }
    }

    /// 读取最多 `timeout` 时长
    ///
    /// 容量之外的字节仍会从管道中读出，但直接丢弃。
    pub fn read_for<T: Transport + ?Sized>(&self, transport: &mut T, timeout: Duration) -> Response {
        let capacity = self.capacity;
        let mut bytes = Vec::with_capacity(capacity);
        let mut truncated = 0;

        let end = self.pump(transport, timeout, |chunk| {
            let kept = chunk.len().min(capacity - bytes.len());
            bytes.extend_from_slice(&chunk[..kept]);
            truncated += chunk.len() - kept;
            ControlFlow::Continue(())
        });

        let response = Response {
            bytes,
            truncated,
            closed: end == WindowEnd::Closed,
        };
        if response.truncated > 0 {
            warn!(
                "Response window full ({} bytes), dropped {} bytes",
                capacity, response.truncated
            );
        }
        if self.echo {
            info!(target: ECHO_TARGET, "[GDB]-> {}", response.text());
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ChunkedTransport;

    #[test]
    fn test_collects_all_chunks_within_window() {
        let mut transport = ChunkedTransport::new(vec![b"^done\n".to_vec(), b"(gdb) \n".to_vec()]);
        let reader = TimedReader::new(4096, Duration::from_millis(1));

        let response = reader.read_for(&mut transport, Duration::from_millis(30));
        assert_eq!(response.text(), "^done\n(gdb) \n");
        assert!(response.has_prompt());
        assert!(!response.closed);
        assert_eq!(response.truncated, 0);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let chunks = (0..8).map(|_| vec![b'x'; 1000]).collect();
        let mut transport = ChunkedTransport::new(chunks);
        let reader = TimedReader::new(4096, Duration::from_millis(1));

        let response = reader.read_for(&mut transport, Duration::from_millis(50));
        assert_eq!(response.len(), 4096);
        assert_eq!(response.truncated, 8000 - 4096);
        assert!(transport.is_drained());
    }

    #[test]
    fn test_stops_early_on_close() {
        let mut transport = ChunkedTransport::new(vec![b"bye".to_vec()]).closing();
        let reader = TimedReader::new(4096, Duration::from_millis(5));

        let start = Instant::now();
        let response = reader.read_for(&mut transport, Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(response.closed);
        assert_eq!(response.as_bytes(), b"bye");
    }

    #[test]
    fn test_respects_timeout_when_silent() {
        let mut transport = ChunkedTransport::new(Vec::new());
        let reader = TimedReader::new(4096, Duration::from_millis(10));

        let start = Instant::now();
        let response = reader.read_for(&mut transport, Duration::from_millis(60));
        let elapsed = start.elapsed();
        assert!(response.is_empty());
        assert!(elapsed >= Duration::from_millis(60));
        assert!(elapsed < Duration::from_millis(60 + 200));
    }

    #[test]
    fn test_pump_stops_when_sink_breaks() {
        let mut transport =
            ChunkedTransport::new(vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]);
        let reader = TimedReader::new(4096, Duration::from_millis(1));

        let mut seen = Vec::new();
        let end = reader.pump(&mut transport, Duration::from_secs(5), |chunk| {
            seen.push(chunk.to_vec());
            if chunk == b"second" {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(end, WindowEnd::Stopped);
        assert_eq!(seen.len(), 2);
        assert!(!transport.is_drained());
    }

    #[test]
    fn test_zero_timeout_reads_nothing() {
        let mut transport = ChunkedTransport::new(vec![b"pending".to_vec()]);
        let reader = TimedReader::new(4096, Duration::from_millis(10)).with_echo(true);

        let response = reader.read_for(&mut transport, Duration::ZERO);
        assert!(response.is_empty());
        assert!(!transport.is_drained());
    }
}
