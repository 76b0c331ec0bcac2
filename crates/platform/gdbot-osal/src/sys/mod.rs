//! 平台相关实现
//!
//! 每个平台提供相同的一组函数：`poll_read`、`interrupt`、`request_stop`
//! 以及 `NULL_DEVICE` 常量。

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use unix::*;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use windows::*;
