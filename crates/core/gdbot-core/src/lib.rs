//! gdbot-core: 通过 GDB 机器接口驱动调试会话
//!
//! 把调试器基于提示符的异步文本协议转换为同步、带类型的控制 API：
//! 启动/结束会话、设置并等待断点、求值与赋值表达式、读写类型化变量。
//!
//! ```no_run
//! use std::time::Duration;
//! use gdbot_core::GdbSession;
//!
//! # fn main() -> gdbot_core::Result<()> {
//! let mut session = GdbSession::start("./hello")?;
//! session.set_breakpoint("main");
//! session.run();
//! session.set_and_wait_break("hello.c:30", Duration::from_secs(20))?;
//! let counter = session.read_var_int("counter")?;
//! session.write_var_int("counter", counter + 1)?;
//! session.resume();
//! session.finish()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod mi;
pub mod reader;
pub mod session;
pub mod vars;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, SessionConfig};
pub use error::{GdbotError, Result};
pub use mi::BreakpointLocation;
pub use reader::{ECHO_TARGET, Response, TimedReader};
pub use session::{CommandOutput, GdbSession};
pub use vars::Evaluation;

pub use gdbot_osal::{ChildProcess, ReadStatus, Transport};
