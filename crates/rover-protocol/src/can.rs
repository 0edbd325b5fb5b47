//! CAN 桥接帧编码/解码
//!
//! 串口 CAN 桥接器的线上格式：
//!
//! ```text
//! byte 0: id >> 3
//! byte 1: ((id & 0x7) << 5) | len
//! byte 2..: data[..len]
//! ```
//!
//! 桥接器本身在帧之间插入 `0xFF` 填充字节和 `0xFE xx` 状态字节对，
//! 分帧见 [`CanBridgeFramer`](crate::framing::CanBridgeFramer)。

use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 标准帧最大 ID（11-bit）
pub const MAX_STANDARD_ID: u16 = 0x7FF;

/// 填充字节
pub const FILLER: u8 = 0xFF;

/// 桥接器状态字节前缀
pub const BRIDGE_STATUS: u8 = 0xFE;

/// 桥接器上电就绪
pub const BRIDGE_READY: [u8; 2] = [0xFE, 0x10];

/// 同步序列
pub const SYNC: [u8; 10] = [0xFF; 10];

/// 设置 1 Mbit/s 总线速率
pub const SPEED_1MB: [u8; 2] = [0xFE, 0x57];

/// 启动转发
pub const START: [u8; 2] = [0xFE, 0x31];

/// 就绪后发送给桥接器的初始化序列：`SYNC + SPEED_1MB + SYNC + START`
pub fn bridge_init_sequence() -> Vec<u8> {
    let mut out = Vec::with_capacity(SYNC.len() * 2 + SPEED_1MB.len() + START.len());
    out.extend_from_slice(&SYNC);
    out.extend_from_slice(&SPEED_1MB);
    out.extend_from_slice(&SYNC);
    out.extend_from_slice(&START);
    out
}

/// CAN 帧（标准帧，最多 8 字节数据）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanFrame {
    /// CAN ID（11-bit）
    pub id: u16,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,
}

impl CanFrame {
    /// 创建标准帧
    ///
    /// ID 超过 11 位或数据超过 8 字节时返回错误，而不是截断。
    pub fn new(id: u16, data: &[u8]) -> Result<Self, ProtocolError> {
        if id > MAX_STANDARD_ID {
            return Err(ProtocolError::InvalidCanId { id: id as u32 });
        }
        if data.len() > 8 {
            return Err(ProtocolError::InvalidLength {
                expected: 8,
                actual: data.len(),
            });
        }

        let mut fixed_data = [0u8; 8];
        fixed_data[..data.len()].copy_from_slice(data);

        Ok(Self {
            id,
            data: fixed_data,
            len: data.len() as u8,
        })
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 编码为桥接器线上格式
    pub fn to_packet(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.len as usize);
        out.push((self.id >> 3) as u8);
        out.push((((self.id & 0x7) as u8) << 5) | self.len);
        out.extend_from_slice(self.data_slice());
        out
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03X}#", self.id)?;
        for byte in self.data_slice() {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// 编码 CAN 帧：`can_packet(0x400, [0, 0]) == 80 02 00 00`
pub fn can_packet(id: u16, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    Ok(CanFrame::new(id, data)?.to_packet())
}

/// 解码桥接器线上格式的 CAN 帧
///
/// 长度字段与实际字节数必须严格一致。
pub fn parse_can_packet(packet: &[u8]) -> Result<CanFrame, ProtocolError> {
    if packet.len() < 2 {
        return Err(ProtocolError::InvalidLength {
            expected: 2,
            actual: packet.len(),
        });
    }

    let id = ((packet[0] as u16) << 3) | ((packet[1] >> 5) as u16);
    let len = (packet[1] & 0x0F) as usize;
    if packet.len() != 2 + len {
        return Err(ProtocolError::InvalidLength {
            expected: 2 + len,
            actual: packet.len(),
        });
    }

    CanFrame::new(id, &packet[2..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_packet_reference_vector() {
        assert_eq!(can_packet(0x400, &[0, 0]).unwrap(), vec![0x80, 0x02, 0x00, 0x00]);
    }

    #[test]
    fn test_can_packet_low_id_bits() {
        // 0x123 = 0b001_0010_0011 -> byte0 = 0x24, byte1 = (0b011 << 5) | 3
        assert_eq!(
            can_packet(0x123, &[1, 2, 3]).unwrap(),
            vec![0x24, 0x63, 0x01, 0x02, 0x03]
        );
    }

    #[test]
    fn test_can_packet_rejects_invalid_input() {
        assert!(matches!(
            can_packet(0x800, &[]),
            Err(ProtocolError::InvalidCanId { id: 0x800 })
        ));
        assert!(matches!(
            can_packet(0x100, &[0; 9]),
            Err(ProtocolError::InvalidLength {
                expected: 8,
                actual: 9
            })
        ));
    }

    #[test]
    fn test_parse_can_packet() {
        let frame = parse_can_packet(&[0x30, 0x40]).unwrap();
        assert_eq!(frame.id, 0x182);
        assert_eq!(frame.len, 0);

        let frame = parse_can_packet(&[0x24, 0x63, 0x01, 0x02, 0x03]).unwrap();
        assert_eq!(frame.id, 0x123);
        assert_eq!(frame.data_slice(), &[1, 2, 3]);
        assert_eq!(frame.to_packet(), vec![0x24, 0x63, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_parse_can_packet_length_mismatch() {
        assert!(parse_can_packet(&[0x24]).is_err());
        assert!(matches!(
            parse_can_packet(&[0x24, 0x63, 0x01]),
            Err(ProtocolError::InvalidLength {
                expected: 5,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_bridge_init_sequence() {
        let seq = bridge_init_sequence();
        assert_eq!(seq.len(), 24);
        assert_eq!(&seq[10..12], &SPEED_1MB);
        assert_eq!(&seq[22..], &START);
    }

    #[test]
    fn test_display() {
        let frame = CanFrame::new(0x400, &[0xAB, 0x01]).unwrap();
        assert_eq!(frame.to_string(), "0x400#AB01");
    }
}
