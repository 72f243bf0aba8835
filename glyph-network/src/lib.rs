//! The framed session transport.
//!
//! Peers exchange `[0xF00D][len][payload]` frames over an ordered
//! reliable byte stream. Each payload is a packet: a four-byte header
//! picking the control plane or the application plane, then either a
//! control body or a DML message. The [`Session`] state machine drives
//! the handshake and the keep-alive traffic for both the client and the
//! server half; the [`bearer`] module runs a session over a real socket.

pub mod bearer;
pub mod control;
pub mod framer;
pub mod packet;
pub mod session;

pub use control::Opcode;
pub use framer::{FramerError, PacketFramer, DEFAULT_MAX_PACKET_SIZE, START_SIGNAL};
pub use packet::PacketHeader;
pub use session::{CloseReason, InvalidMessageReason, Role, Session, SessionEvent};
