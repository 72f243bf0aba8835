//! The packet header inside every frame payload.

use glyph_dml::ParseError;

/// `[u8 control][u8 opcode][u8 0][u8 0]`. A non-zero first byte selects
/// the control plane; otherwise the body is a DML message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub control: bool,
    pub opcode: u8,
}

pub const PACKET_HEADER_SIZE: usize = 4;

impl PacketHeader {
    pub fn new(control: bool, opcode: u8) -> Self {
        Self { control, opcode }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.control as u8);
        out.push(self.opcode);
        out.push(0);
        out.push(0);
    }

    /// Splits a frame payload into its header and body.
    pub fn parse(payload: &[u8]) -> Result<(Self, &[u8]), ParseError> {
        if payload.len() < PACKET_HEADER_SIZE {
            return Err(ParseError::InvalidHeaderData(format!(
                "packet header needs {PACKET_HEADER_SIZE} bytes, got {}",
                payload.len()
            )));
        }
        let header = Self {
            control: payload[0] >= 1,
            opcode: payload[1],
        };
        Ok((header, &payload[PACKET_HEADER_SIZE..]))
    }
}
