//! 总线消息负载
//!
//! 驱动解码后的语义消息统一使用 [`Payload`] 表示。
//! 它是一个固定 schema 的 tagged 枚举，日志中通过 [`codec`](crate::codec) 编码，
//! 回放时按同一 schema 解码，不存在任何“执行录制文本”的反序列化路径。

use crate::can::CanFrame;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 总线消息负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// 无数据（例如纯触发消息）
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// 原始字节（未解析的报文、透传数据）
    Bytes(Vec<u8>),
    /// CAN 帧
    Can(CanFrame),
    List(Vec<Payload>),
}

impl Payload {
    /// 获取字节内容（仅 `Bytes` 变体）
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// 获取文本内容（仅 `Text` 变体）
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// 变体名称，用于错误信息
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Empty => "empty",
            Payload::Bool(_) => "bool",
            Payload::Int(_) => "int",
            Payload::Float(_) => "float",
            Payload::Text(_) => "text",
            Payload::Bytes(_) => "bytes",
            Payload::Can(_) => "can",
            Payload::List(_) => "list",
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<i64> for Payload {
    fn from(value: i64) -> Self {
        Payload::Int(value)
    }
}

impl From<CanFrame> for Payload {
    fn from(frame: CanFrame) -> Self {
        Payload::Can(frame)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => write!(f, "()"),
            Payload::Bool(value) => write!(f, "{}", value),
            Payload::Int(value) => write!(f, "{}", value),
            Payload::Float(value) => write!(f, "{}", value),
            Payload::Text(text) => write!(f, "{:?}", text),
            Payload::Bytes(bytes) => {
                write!(f, "b\"")?;
                for byte in bytes {
                    write!(f, "\\x{:02x}", byte)?;
                }
                write!(f, "\"")
            },
            Payload::Can(frame) => write!(f, "{}", frame),
            Payload::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            },
        }
    }
}

/// 总线消息：`(名称, 负载)`
///
/// 名称由驱动名和通道名组成，例如 `lidar.scan`、`spider.can`。
/// 同一结构也用于 `execute` 写入输出流的命令记录（名称即 message id）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub name: String,
    pub payload: Payload,
}

impl BusMessage {
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

impl fmt::Display for BusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.name, self.payload)
    }
}
