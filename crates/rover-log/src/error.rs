//! 日志存储错误类型

use crate::asserter::Mismatch;
use crate::format::StreamId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid log file: {0}")]
    InvalidFormat(String),

    #[error("Unsupported log format version: {0}")]
    UnsupportedVersion(u8),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// 同一日志中重复注册 stream 名称（配置或编程错误）
    #[error("Stream name already registered: {0}")]
    DuplicateStream(String),

    #[error("No free stream id left")]
    TooManyStreams,

    #[error("Log file is locked by another writer: {}", .0.display())]
    Locked(PathBuf),

    /// 之前的写入失败，日志尾部可能残缺
    #[error("Log writer failed after an earlier write error")]
    WriterFailed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// 对非校验 stream 调用了 `LogAsserter::write`
    #[error("Unexpected output on stream {stream_id} (assert stream: {assert_stream_id:?})")]
    UnexpectedStream {
        stream_id: StreamId,
        assert_stream_id: Option<StreamId>,
    },

    #[error("{0}")]
    Mismatch(Box<Mismatch>),
}
