//! # Rover Protocol
//!
//! 总线消息与字节流协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `payload`: 总线消息负载（固定 schema 的 tagged 枚举）
//! - `codec`: 日志记录的版本化编码
//! - `framing`: 字节流分帧算法（终止符分帧 / CAN 桥接分帧）
//! - `can`: CAN 桥接帧编码/解码
//!
//! ## 分帧约定
//!
//! 所有 `Framer` 返回的 `tail` 必须是输入缓冲区的后缀，
//! `StreamBuffer` 依赖这一点在原地裁剪接收缓冲区。

pub mod can;
pub mod codec;
pub mod framing;
pub mod payload;

// 重新导出常用类型
pub use can::{CanFrame, can_packet, parse_can_packet};
pub use codec::{CODEC_VERSION, decode, encode};
pub use framing::{
    CanBridgeFramer, Framer, PassThroughFramer, Split, StreamBuffer, TerminatorFramer,
};
pub use payload::{BusMessage, Payload};

use thiserror::Error;

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid CAN ID: 0x{id:X}")]
    InvalidCanId { id: u32 },

    #[error("Unsupported record version: {0}")]
    UnsupportedVersion(u8),

    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),
}
