//! # 日志文件格式
//!
//! ```text
//! [MAGIC: 8 bytes "ROVERLG\0"]
//! [Version: 1 byte]
//! [Start time: 8 bytes LE, 微秒 since UNIX epoch]
//! [Records...]
//! ```
//!
//! 每条记录自带长度前缀（payload 为任意二进制，不能用分隔符）：
//!
//! ```text
//! [Elapsed: 8 bytes LE, 微秒 since start]
//! [Stream ID: 2 bytes LE]
//! [Payload length: 4 bytes LE]
//! [Payload]
//! ```
//!
//! Stream 0 保留给内务记录（[`InfoRecord`]，JSON 编码）。

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 魔数
pub const MAGIC: &[u8; 8] = b"ROVERLG\0";

/// 当前格式版本
pub const FORMAT_VERSION: u8 = 1;

/// 文件头长度
pub const FILE_HEADER_LEN: usize = MAGIC.len() + 1 + 8;

/// 记录头长度
pub const RECORD_HEADER_LEN: usize = 8 + 2 + 4;

/// 单条记录 payload 上限（64 MiB）
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

pub type StreamId = u16;

/// 内务 stream
pub const INFO_STREAM_ID: StreamId = 0;

/// Stream 0 上的内务记录
///
/// 序列化为 `{"note": ...}`、`{"config": ...}`、`{"names": [...]}`。
/// `names` 为截至当前的完整注册表，下标 + 1 即 stream id。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfoRecord {
    Note(String),
    Config(serde_json::Value),
    Names(Vec<String>),
}

impl InfoRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// 解析内务记录；非 JSON 或未知类型返回 `None`
    pub fn from_bytes(payload: &[u8]) -> Option<Self> {
        serde_json::from_slice(payload).ok()
    }
}

/// 一条日志记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// 相对日志起始时间
    pub elapsed: Duration,
    pub stream_id: StreamId,
    pub payload: Vec<u8>,
}

/// 读取时的 stream 过滤条件
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamFilter {
    #[default]
    All,
    Only(StreamId),
    AnyOf(Vec<StreamId>),
}

impl StreamFilter {
    pub fn matches(&self, stream_id: StreamId) -> bool {
        match self {
            StreamFilter::All => true,
            StreamFilter::Only(id) => *id == stream_id,
            StreamFilter::AnyOf(ids) => ids.contains(&stream_id),
        }
    }
}

impl From<StreamId> for StreamFilter {
    fn from(id: StreamId) -> Self {
        StreamFilter::Only(id)
    }
}

impl From<Vec<StreamId>> for StreamFilter {
    fn from(ids: Vec<StreamId>) -> Self {
        if ids.is_empty() {
            StreamFilter::All
        } else {
            StreamFilter::AnyOf(ids)
        }
    }
}

impl From<&[StreamId]> for StreamFilter {
    fn from(ids: &[StreamId]) -> Self {
        StreamFilter::from(ids.to_vec())
    }
}

/// 时间截断到微秒（文件中的精度）
pub fn as_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

pub fn encode_record_header(elapsed: Duration, stream_id: StreamId, len: u32) -> [u8; RECORD_HEADER_LEN] {
    let mut header = [0u8; RECORD_HEADER_LEN];
    header[0..8].copy_from_slice(&as_micros(elapsed).to_le_bytes());
    header[8..10].copy_from_slice(&stream_id.to_le_bytes());
    header[10..14].copy_from_slice(&len.to_le_bytes());
    header
}

/// 解析记录头，返回 `(elapsed, stream_id, payload_len)`
pub fn decode_record_header(header: &[u8; RECORD_HEADER_LEN]) -> (Duration, StreamId, usize) {
    let mut elapsed = [0u8; 8];
    elapsed.copy_from_slice(&header[0..8]);
    let stream_id = StreamId::from_le_bytes([header[8], header[9]]);
    let len = u32::from_le_bytes([header[10], header[11], header[12], header[13]]);
    (
        Duration::from_micros(u64::from_le_bytes(elapsed)),
        stream_id,
        len as usize,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_header_layout() {
        let header = encode_record_header(Duration::from_micros(0x0102), 3, 5);
        assert_eq!(
            header,
            [0x02, 0x01, 0, 0, 0, 0, 0, 0, 0x03, 0x00, 0x05, 0, 0, 0]
        );
        assert_eq!(
            decode_record_header(&header),
            (Duration::from_micros(0x0102), 3, 5)
        );
    }

    #[test]
    fn test_header_truncates_to_micros() {
        let header = encode_record_header(Duration::from_nanos(1_999), 1, 0);
        assert_eq!(decode_record_header(&header).0, Duration::from_micros(1));
    }

    #[test]
    fn test_info_record_json() {
        let names = InfoRecord::Names(vec!["raw".into()]);
        assert_eq!(names.to_bytes().unwrap(), br#"{"names":["raw"]}"#);

        let note = InfoRecord::Note("1st test".into());
        assert_eq!(note.to_bytes().unwrap(), br#"{"note":"1st test"}"#);

        assert_eq!(
            InfoRecord::from_bytes(br#"{"names":["raw","gps.position"]}"#),
            Some(InfoRecord::Names(vec!["raw".into(), "gps.position".into()]))
        );
        assert_eq!(InfoRecord::from_bytes(b"\x00\x01"), None);
    }

    #[test]
    fn test_stream_filter() {
        assert!(StreamFilter::All.matches(7));
        assert!(StreamFilter::from(10u16).matches(10));
        assert!(!StreamFilter::from(10u16).matches(1));

        let filter = StreamFilter::from(vec![1u16, 2]);
        assert!(filter.matches(1));
        assert!(filter.matches(2));
        assert!(!filter.matches(3));

        assert_eq!(StreamFilter::from(Vec::<StreamId>::new()), StreamFilter::All);
    }
}
