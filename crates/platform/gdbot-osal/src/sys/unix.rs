//! Unix 实现：基于文件描述符的 `poll(2)` 与信号

use std::io::{self, PipeReader, Read};
use std::os::fd::AsRawFd;
use std::process::Child;
use std::time::Duration;

use crate::ReadStatus;

pub(crate) const NULL_DEVICE: &str = "/dev/null";

/// 在读端上等待最多 `wait`，有数据时读取一次
pub(crate) fn poll_read(
    reader: &mut PipeReader,
    buf: &mut [u8],
    wait: Duration,
) -> io::Result<ReadStatus> {
    let mut pfd = libc::pollfd {
        fd: reader.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = wait.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if ready < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(ReadStatus::Idle);
        }
        return Err(err);
    }
    if ready == 0 {
        return Ok(ReadStatus::Idle);
    }

    // POLLHUP 时管道中可能仍有残留数据，read 会先返回数据，最后返回 0
    match reader.read(buf) {
        Ok(0) => Ok(ReadStatus::Closed),
        Ok(n) => Ok(ReadStatus::Data(n)),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(ReadStatus::Idle),
        Err(e) => Err(e),
    }
}

fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    if unsafe { libc::kill(pid, signal) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// 向调试器发送 SIGINT，使被调试程序回到暂停状态
pub(crate) fn interrupt(child: &Child) -> io::Result<()> {
    send_signal(child.id(), libc::SIGINT)
}

/// 请求子进程退出（SIGTERM）
pub(crate) fn request_stop(child: &mut Child) -> io::Result<()> {
    send_signal(child.id(), libc::SIGTERM)
}
