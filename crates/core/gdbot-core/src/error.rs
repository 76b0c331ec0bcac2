//! Error taxonomy for debugger sessions
//!
//! Every fallible session operation returns [`GdbotError`]. Timeouts are
//! ordinary outcomes that callers are expected to check, not panics.

use gdbot_osal::ProcessError;
use thiserror::Error;

use crate::config::ConfigError;

/// Unified error type for GDBot sessions
#[derive(Error, Debug)]
pub enum GdbotError {
    #[error("Failed to start debugger '{program}': {message}")]
    SpawnFailed {
        program: String,
        message: String,
        #[source]
        source: ProcessError,
    },

    #[error("Debugger process has exited or its pipe is closed")]
    ChannelClosed,

    #[error("Timeout occurred in {operation} after {timeout_ms} ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("No value in debugger reply for expression: {expression}")]
    ParseMiss { expression: String },

    #[error("Debugger rejected '{expression}': {message}")]
    Rejected { expression: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(String),
}

impl GdbotError {
    pub(crate) fn timeout(operation: &'static str, timeout: std::time::Duration) -> Self {
        GdbotError::Timeout {
            operation,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Whether the error is an expected timeout rather than a failure
    pub fn is_timeout(&self) -> bool {
        matches!(self, GdbotError::Timeout { .. })
    }
}

impl From<ProcessError> for GdbotError {
    fn from(source: ProcessError) -> Self {
        let program = match &source {
            ProcessError::Spawn { program, .. } => program.clone(),
            ProcessError::PipeCreation(_) => String::from("<pipe>"),
        };
        GdbotError::SpawnFailed {
            program,
            message: source.to_string(),
            source,
        }
    }
}

impl From<std::io::Error> for GdbotError {
    fn from(e: std::io::Error) -> Self {
        GdbotError::Io(e.to_string())
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, GdbotError>;
