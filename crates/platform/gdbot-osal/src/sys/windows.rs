//! Windows 实现：基于句柄的 `PeekNamedPipe` 与控制台事件

use std::io::{self, PipeReader, Read};
use std::os::windows::io::AsRawHandle;
use std::process::Child;
use std::ptr;
use std::time::Duration;

use windows_sys::Win32::Foundation::{ERROR_BROKEN_PIPE, HANDLE};
use windows_sys::Win32::System::Console::{
    CTRL_C_EVENT, GenerateConsoleCtrlEvent, SetConsoleCtrlHandler,
};
use windows_sys::Win32::System::Pipes::PeekNamedPipe;

use crate::ReadStatus;

pub(crate) const NULL_DEVICE: &str = "nul";

/// 查看管道中可读字节数，有数据时读取，否则休眠 `wait`
pub(crate) fn poll_read(
    reader: &mut PipeReader,
    buf: &mut [u8],
    wait: Duration,
) -> io::Result<ReadStatus> {
    let handle = reader.as_raw_handle() as HANDLE;
    let mut available: u32 = 0;

    let ok = unsafe {
        PeekNamedPipe(
            handle,
            ptr::null_mut(),
            0,
            ptr::null_mut(),
            &mut available,
            ptr::null_mut(),
        )
    };
    if ok == 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(ERROR_BROKEN_PIPE as i32) {
            return Ok(ReadStatus::Closed);
        }
        return Err(err);
    }

    if available == 0 {
        std::thread::sleep(wait);
        return Ok(ReadStatus::Idle);
    }

    let len = buf.len().min(available as usize);
    match reader.read(&mut buf[..len]) {
        Ok(0) => Ok(ReadStatus::Closed),
        Ok(n) => Ok(ReadStatus::Data(n)),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(ReadStatus::Closed),
        Err(e) => Err(e),
    }
}

/// 向共享控制台广播 CTRL_C，期间屏蔽本进程自身的处理
pub(crate) fn interrupt(_child: &Child) -> io::Result<()> {
    unsafe {
        SetConsoleCtrlHandler(None, 1);
        if GenerateConsoleCtrlEvent(CTRL_C_EVENT, 0) == 0 {
            let err = io::Error::last_os_error();
            SetConsoleCtrlHandler(None, 0);
            return Err(err);
        }
        SetConsoleCtrlHandler(None, 0);
    }
    Ok(())
}

/// TerminateProcess
pub(crate) fn request_stop(child: &mut Child) -> io::Result<()> {
    child.kill()
}
