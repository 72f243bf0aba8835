//! Bit-addressed buffers and streams.
//!
//! Everything in the object-property wire format is measured in bits: a
//! property may occupy four bits, a nested object may begin in the middle
//! of a byte, and length prefixes are patched back into positions that are
//! only known after the fact. This crate provides the storage for that
//! kind of traffic: a growable [`BitBuffer`] addressed by [`BufferPos`],
//! borrowed read-only [`BitBufferSegment`] windows used to bound nested
//! records, and a seekable [`BitStream`] cursor over either.

mod buffer;
mod stream;

pub use buffer::{BitBuf, BitBuffer, BitBufferSegment, BufferError, BufferPos, DEFAULT_BUFFER_SIZE};
pub use stream::{BitInteger, BitIo, BitIoExt, BitStream};
