//! 会话配置
//!
//! 控制调试器路径、各类等待窗口和缓冲区上限。默认值与协议引擎的
//! 典型时序一致：命令默认等待 1000 ms，轮询间隔 10 ms，中断后稳定 500 ms。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 响应缓冲区的最小容量
pub const MIN_RESPONSE_CAPACITY: usize = 4 * 1024;

/// 调试器会话配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 调试器可执行文件（在 PATH 中查找）
    pub gdb_path: String,
    /// 追加到 `--interpreter=mi` 之后的参数
    pub extra_args: Vec<String>,
    /// 调试器的工作目录，缺省时继承当前目录
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// 普通命令的响应等待窗口（毫秒）
    pub default_wait_ms: u64,
    /// 读通道轮询间隔（毫秒）
    pub poll_tick_ms: u64,
    /// 中断后的稳定等待（毫秒）
    pub interrupt_settle_ms: u64,
    /// 暂停探测的最大尝试次数
    pub pause_attempts: u32,
    /// `run_command` 每次读取的时间片（毫秒）
    pub command_slice_ms: u64,
    /// 单个响应窗口的容量（字节）
    pub response_capacity: usize,
    /// `run_command` 累积输出上限（字节）
    pub run_command_limit: usize,
    /// 探测命令，仅在调试器空闲时得到应答
    pub probe_command: String,
    /// 启动时是否打开回显
    pub debug_echo: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gdb_path: "gdb".to_string(),
            extra_args: Vec::new(),
            working_dir: None,
            default_wait_ms: 1000,
            poll_tick_ms: 10,
            interrupt_settle_ms: 500,
            pause_attempts: 3,
            command_slice_ms: 100,
            response_capacity: MIN_RESPONSE_CAPACITY,
            run_command_limit: 1024 * 1024,
            probe_command: "ping".to_string(),
            debug_echo: false,
        }
    }
}

impl SessionConfig {
    /// 验证配置的有效性
    ///
    /// # 错误
    ///
    /// 如果任一字段超出允许范围，返回 `ConfigError::Invalid`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gdb_path.trim().is_empty() {
            return Err(ConfigError::Invalid("gdb_path must not be empty".to_string()));
        }
        if self.probe_command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "probe_command must not be empty".to_string(),
            ));
        }
        if self.response_capacity < MIN_RESPONSE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "response_capacity must be >= {}, got {}",
                MIN_RESPONSE_CAPACITY, self.response_capacity
            )));
        }
        if self.run_command_limit < self.response_capacity {
            return Err(ConfigError::Invalid(format!(
                "run_command_limit ({}) must be >= response_capacity ({})",
                self.run_command_limit, self.response_capacity
            )));
        }
        if self.poll_tick_ms == 0 || self.default_wait_ms == 0 || self.command_slice_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_tick_ms, default_wait_ms and command_slice_ms must be non-zero".to_string(),
            ));
        }
        if self.poll_tick_ms > self.default_wait_ms {
            return Err(ConfigError::Invalid(format!(
                "poll_tick_ms ({}) must not exceed default_wait_ms ({})",
                self.poll_tick_ms, self.default_wait_ms
            )));
        }
        if self.pause_attempts == 0 {
            return Err(ConfigError::Invalid(
                "pause_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// 从 TOML 字符串加载配置
    ///
    /// 缺失的字段使用默认值。
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml)
            .map_err(|e| ConfigError::Parse(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载配置
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// 将配置序列化为 TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(format!("TOML serialize error: {}", e)))
    }

    /// 应用环境变量覆盖
    ///
    /// - `GDBOT_GDB_PATH`: 调试器路径
    /// - `GDBOT_DEBUG_ECHO`: `1`/`true` 打开回显，`0`/`false` 关闭
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup("GDBOT_GDB_PATH").filter(|p| !p.trim().is_empty()) {
            self.gdb_path = path;
        }
        if let Some(echo) = lookup("GDBOT_DEBUG_ECHO") {
            match echo.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.debug_echo = true,
                "0" | "false" | "no" | "off" => self.debug_echo = false,
                _ => {}
            }
        }
        self
    }

    pub fn default_wait(&self) -> Duration {
        Duration::from_millis(self.default_wait_ms)
    }

    pub fn poll_tick(&self) -> Duration {
        Duration::from_millis(self.poll_tick_ms)
    }

    pub fn interrupt_settle(&self) -> Duration {
        Duration::from_millis(self.interrupt_settle_ms)
    }

    pub fn command_slice(&self) -> Duration {
        Duration::from_millis(self.command_slice_ms)
    }
}

/// 配置错误类型
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// 无效的配置
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// 解析错误
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// 序列化错误
    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(String),
}
