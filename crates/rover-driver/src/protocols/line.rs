//! 按行的文本协议（NMEA GPS 等）

use crate::error::DriverError;
use crate::protocol::{Decoded, Protocol};
use rover_protocol::{Payload, TerminatorFramer};

#[derive(Debug, Default)]
pub struct Line;

impl Line {
    pub fn new() -> Self {
        Self
    }
}

impl Protocol for Line {
    type Framer = TerminatorFramer;

    fn name(&self) -> &'static str {
        "line"
    }

    fn framer(&self) -> TerminatorFramer {
        TerminatorFramer::line()
    }

    fn decode(&mut self, packet: &[u8]) -> Decoded {
        let line = packet.strip_suffix(b"\n").unwrap_or(packet);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            return Decoded::Noise;
        }
        match std::str::from_utf8(line) {
            Ok(text) => Decoded::message("line", text),
            Err(_) => Decoded::Noise,
        }
    }

    fn encode_command(&mut self, command: &Payload) -> Result<Vec<u8>, DriverError> {
        match command {
            Payload::Text(text) => Ok(format!("{}\r\n", text).into_bytes()),
            Payload::Bytes(bytes) => Ok(bytes.clone()),
            other => Err(super::unsupported(self.name(), other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_lines() {
        let mut line = Line::new();
        assert_eq!(
            line.decode(b"$GPGGA,123519,4807.038,N\r\n"),
            Decoded::message("line", "$GPGGA,123519,4807.038,N")
        );
        assert_eq!(line.decode(b"plain\n"), Decoded::message("line", "plain"));
        assert_eq!(line.decode(b"\r\n"), Decoded::Noise);
        assert_eq!(line.decode(b"\xff\xfe\n"), Decoded::Noise);
    }

    #[test]
    fn test_encode() {
        let mut line = Line::new();
        assert_eq!(line.encode_command(&Payload::from("$PMTK220,100")).unwrap(), b"$PMTK220,100\r\n");
        assert!(line.encode_command(&Payload::Bool(true)).is_err());
    }
}
