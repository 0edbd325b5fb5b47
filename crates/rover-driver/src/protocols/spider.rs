//! Spider 底盘（串口 CAN 桥接器）
//!
//! 桥接器上电后发送 `FE 10`，收到后回写初始化序列
//! `SYNC + SPEED_1MB + SYNC + START`，此后才转发 CAN 命令。
//! 初始化完成前收到的命令被跳过（见 [`Protocol::is_ready`]）。

use super::unsupported;
use crate::error::DriverError;
use crate::protocol::{Decoded, Protocol};
use rover_protocol::can::{BRIDGE_READY, BRIDGE_STATUS, bridge_init_sequence};
use rover_protocol::{CanBridgeFramer, Payload, parse_can_packet};
use tracing::{info, trace};

#[derive(Debug, Default)]
pub struct Spider {
    bridge_ready: bool,
}

impl Spider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Protocol for Spider {
    type Framer = CanBridgeFramer;

    fn name(&self) -> &'static str {
        "spider"
    }

    fn framer(&self) -> CanBridgeFramer {
        CanBridgeFramer
    }

    fn decode(&mut self, packet: &[u8]) -> Decoded {
        if packet == BRIDGE_READY {
            info!("CAN bridge ready, sending init sequence");
            self.bridge_ready = true;
            return Decoded::Reply(bridge_init_sequence());
        }
        if packet.first() == Some(&BRIDGE_STATUS) {
            return Decoded::message("bridge", packet.to_vec());
        }
        match parse_can_packet(packet) {
            Ok(frame) => Decoded::message("can", frame),
            Err(e) => {
                trace!("Dropping bridge packet {:02X?}: {}", packet, e);
                Decoded::Noise
            },
        }
    }

    fn is_ready(&self) -> bool {
        self.bridge_ready
    }

    fn encode_command(&mut self, command: &Payload) -> Result<Vec<u8>, DriverError> {
        match command {
            Payload::Can(frame) => Ok(frame.to_packet()),
            other => Err(unsupported(self.name(), other)),
        }
    }
}
