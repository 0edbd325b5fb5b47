//! 驱动层错误类型定义

use crate::bus::BusShutdown;
use rover_log::LogError;
use rover_protocol::ProtocolError;
use thiserror::Error;

/// 传输层错误
#[derive(Error, Debug)]
pub enum TransportError {
    /// 在超时时间内没有数据（正常情况）
    #[error("Read timeout")]
    Timeout,

    /// 对端关闭连接
    #[error("Transport closed")]
    Closed,

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 写日志失败（输出门）
    #[error("Log error: {0}")]
    Log(#[from] LogError),

    #[error("{0}")]
    BusShutdown(#[from] BusShutdown),

    #[error("Driver {0} already started")]
    AlreadyStarted(String),

    #[error("Unknown driver kind: {0}")]
    UnknownDriver(String),

    /// 重复的驱动名称或注册表键（配置错误）
    #[error("Duplicate driver: {0}")]
    DuplicateDriver(String),

    #[error("Invalid config for driver {driver}: {message}")]
    Config { driver: String, message: String },

    #[error("Driver {driver} does not accept {kind} commands")]
    UnsupportedCommand { driver: String, kind: &'static str },

    #[error("Failed to spawn driver thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("Driver thread {0} panicked")]
    ThreadPanicked(String),

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,
}
