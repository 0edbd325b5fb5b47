//! 日志记录编码
//!
//! 总线消息与命令记录写入日志时的二进制格式：
//!
//! ```text
//! [Version: 1 byte]
//! [Data: bincode serialized BusMessage]
//! ```
//!
//! 版本号不匹配时拒绝解码，而不是尝试“尽力解析”。

use crate::ProtocolError;
use crate::payload::BusMessage;

/// 当前编码版本
pub const CODEC_VERSION: u8 = 1;

/// 编码总线消息
pub fn encode(message: &BusMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut out = vec![CODEC_VERSION];
    bincode::serialize_into(&mut out, message)?;
    Ok(out)
}

/// 解码总线消息
pub fn decode(bytes: &[u8]) -> Result<BusMessage, ProtocolError> {
    let (&version, body) = bytes.split_first().ok_or(ProtocolError::InvalidLength {
        expected: 1,
        actual: 0,
    })?;

    if version != CODEC_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    Ok(bincode::deserialize(body)?)
}
