//! 激光雷达（SICK TiM 系列，CoLa-A 文本协议）
//!
//! 报文以 STX 开始、ETX 结束；启动时和每收到一帧扫描数据后
//! 发送一次 `sRN LMDscandata` 轮询请求。

use super::unsupported;
use crate::error::DriverError;
use crate::protocol::{Decoded, Protocol};
use rover_protocol::framing::{ETX, STX};
use rover_protocol::{Payload, TerminatorFramer};

/// 扫描数据轮询命令
pub const SCAN_REQUEST: &[u8] = b"sRN LMDscandata";

/// 用 STX/ETX 包裹
pub fn wrap(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 2);
    out.push(STX);
    out.extend_from_slice(body);
    out.push(ETX);
    out
}

#[derive(Debug, Default)]
pub struct Lidar;

impl Lidar {
    pub fn new() -> Self {
        Self
    }
}

impl Protocol for Lidar {
    type Framer = TerminatorFramer;

    fn name(&self) -> &'static str {
        "lidar"
    }

    fn framer(&self) -> TerminatorFramer {
        TerminatorFramer::etx()
    }

    fn on_start(&mut self) -> Option<Vec<u8>> {
        Some(wrap(SCAN_REQUEST))
    }

    fn decode(&mut self, packet: &[u8]) -> Decoded {
        match packet {
            [STX, body @ .., ETX] => Decoded::message("scan", body.to_vec()),
            _ => Decoded::Noise,
        }
    }

    fn poll_request(&self) -> Option<Vec<u8>> {
        Some(wrap(SCAN_REQUEST))
    }

    fn encode_command(&mut self, command: &Payload) -> Result<Vec<u8>, DriverError> {
        match command {
            Payload::Bytes(body) => Ok(wrap(body)),
            Payload::Text(text) => Ok(wrap(text.as_bytes())),
            other => Err(unsupported(self.name(), other)),
        }
    }
}
