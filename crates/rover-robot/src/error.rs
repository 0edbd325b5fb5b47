//! 容器层错误类型定义

use rover_driver::DriverError;
use rover_log::{LogError, Mismatch};
use rover_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RobotError {
    /// 总线已关闭（`finish` 之后，或回放到达日志末尾）
    #[error("Bus shutdown")]
    Shutdown,

    /// 配置中没有 `stream_id_out`，不能调用 `execute`
    #[error("No output stream configured (stream_id_out)")]
    NoOutputStream,

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// 回放时控制逻辑产生的命令与录制的不一致
    #[error("{0}")]
    ReplayMismatch(Box<Mismatch>),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Log error: {0}")]
    Log(#[from] LogError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RobotError {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, RobotError::Shutdown)
    }
}
