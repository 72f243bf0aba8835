//! Streaming parser and emitter for the transport frame.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;
use tracing::trace;

/// Magic leading every frame.
pub const START_SIGNAL: u16 = 0xF00D;

/// Default cap on a single frame's payload length.
pub const DEFAULT_MAX_PACKET_SIZE: u16 = 0x2000;

const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FramerError {
    #[error("bad start signal 0x{0:04X}; peer is out of sync or not framing packets")]
    BadStartSignal(u16),

    #[error("declared payload length {0} exceeds the maximum packet size {1}")]
    OversizedPacket(u16, u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReceiveState {
    WaitingForStartSignal,
    WaitingForLength,
    WaitingForPacket,
    /// A framing error is terminal; every byte after it is dropped.
    Failed,
}

/// Accumulates transport bytes into complete frame payloads.
///
/// Bytes arrive in arbitrary chunks; the framer is a byte-at-a-time
/// state machine over the two header fields and then a bulk copy of the
/// payload. Strictly single-threaded per session.
#[derive(Debug)]
pub struct PacketFramer {
    state: ReceiveState,
    shift: u8,
    start_signal: u16,
    incoming_size: u16,
    max_packet_size: u16,
    scratch: Vec<u8>,
}

impl Default for PacketFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketFramer {
    pub fn new() -> Self {
        Self::with_max_packet_size(DEFAULT_MAX_PACKET_SIZE)
    }

    pub fn with_max_packet_size(max_packet_size: u16) -> Self {
        Self {
            state: ReceiveState::WaitingForStartSignal,
            shift: 0,
            start_signal: 0,
            incoming_size: 0,
            max_packet_size,
            scratch: Vec::new(),
        }
    }

    pub fn max_packet_size(&self) -> u16 {
        self.max_packet_size
    }

    pub fn set_max_packet_size(&mut self, max_packet_size: u16) {
        self.max_packet_size = max_packet_size;
    }

    /// Wraps a payload in a frame header.
    pub fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; FRAME_HEADER_LEN + payload.len()];
        LittleEndian::write_u16(&mut out[0..2], START_SIGNAL);
        LittleEndian::write_u16(&mut out[2..4], payload.len() as u16);
        out[FRAME_HEADER_LEN..].copy_from_slice(payload);
        out
    }

    /// Feeds a chunk of transport bytes, returning the payloads that
    /// completed, in arrival order.
    ///
    /// An error poisons the framer: the current frame is abandoned and
    /// any later input is discarded without further errors.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Vec<u8>>, FramerError> {
        let mut completed = Vec::new();
        let mut position = 0;

        while position < data.len() {
            match self.state {
                ReceiveState::Failed => return Ok(completed),

                ReceiveState::WaitingForStartSignal => {
                    self.start_signal |= (data[position] as u16) << self.shift;
                    position += 1;
                    if self.shift == 0 {
                        self.shift = 8;
                    } else {
                        if self.start_signal != START_SIGNAL {
                            let signal = self.start_signal;
                            self.state = ReceiveState::Failed;
                            return Err(FramerError::BadStartSignal(signal));
                        }
                        self.shift = 0;
                        self.incoming_size = 0;
                        self.state = ReceiveState::WaitingForLength;
                    }
                }

                ReceiveState::WaitingForLength => {
                    self.incoming_size |= (data[position] as u16) << self.shift;
                    position += 1;
                    if self.shift == 0 {
                        self.shift = 8;
                    } else {
                        if self.incoming_size > self.max_packet_size {
                            let size = self.incoming_size;
                            self.state = ReceiveState::Failed;
                            return Err(FramerError::OversizedPacket(size, self.max_packet_size));
                        }
                        self.shift = 0;
                        self.scratch.clear();
                        if self.incoming_size == 0 {
                            // Zero-length payloads complete right here, so
                            // a frame ending a chunk is not held hostage.
                            trace!("packet available");
                            completed.push(Vec::new());
                            self.start_signal = 0;
                            self.state = ReceiveState::WaitingForStartSignal;
                        } else {
                            self.state = ReceiveState::WaitingForPacket;
                        }
                    }
                }

                ReceiveState::WaitingForPacket => {
                    let needed = self.incoming_size as usize - self.scratch.len();
                    let available = data.len() - position;
                    let take = needed.min(available);
                    self.scratch.extend_from_slice(&data[position..position + take]);
                    position += take;

                    if self.scratch.len() == self.incoming_size as usize {
                        trace!(len = self.scratch.len(), "packet available");
                        completed.push(std::mem::take(&mut self.scratch));
                        self.start_signal = 0;
                        self.state = ReceiveState::WaitingForStartSignal;
                    }
                }
            }
        }

        Ok(completed)
    }
}
