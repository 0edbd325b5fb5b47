//! 不分帧的原始字节流

use crate::error::DriverError;
use crate::protocol::{Decoded, Protocol};
use rover_protocol::{PassThroughFramer, Payload};

#[derive(Debug, Default)]
pub struct Raw;

impl Protocol for Raw {
    type Framer = PassThroughFramer;

    fn name(&self) -> &'static str {
        "raw"
    }

    fn framer(&self) -> PassThroughFramer {
        PassThroughFramer
    }

    fn decode(&mut self, packet: &[u8]) -> Decoded {
        Decoded::message("data", packet.to_vec())
    }

    fn encode_command(&mut self, command: &Payload) -> Result<Vec<u8>, DriverError> {
        match command {
            Payload::Bytes(bytes) => Ok(bytes.clone()),
            Payload::Text(text) => Ok(text.as_bytes().to_vec()),
            other => Err(super::unsupported(self.name(), other)),
        }
    }
}
