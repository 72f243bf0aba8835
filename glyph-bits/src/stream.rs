use crate::buffer::{BitBuf, BitBuffer, BufferError, BufferPos};

/// An integer that can travel through a [`BitStream`].
///
/// `BITS` is the width used when no explicit width is given. Signed types
/// sign-extend from whatever width they were read at.
pub trait BitInteger: Copy {
    const BITS: u8;

    fn from_raw(raw: u64, bits: u8) -> Self;
    fn into_raw(self) -> u64;
}

macro_rules! unsigned_bit_integer {
    ($($ty:ty),*) => {
        $(
            impl BitInteger for $ty {
                const BITS: u8 = <$ty>::BITS as u8;

                fn from_raw(raw: u64, _bits: u8) -> Self {
                    raw as $ty
                }

                fn into_raw(self) -> u64 {
                    self as u64
                }
            }
        )*
    };
}

macro_rules! signed_bit_integer {
    ($($ty:ty),*) => {
        $(
            impl BitInteger for $ty {
                const BITS: u8 = <$ty>::BITS as u8;

                fn from_raw(raw: u64, bits: u8) -> Self {
                    sign_extend(raw, bits) as $ty
                }

                fn into_raw(self) -> u64 {
                    self as i64 as u64
                }
            }
        )*
    };
}

unsigned_bit_integer!(u8, u16, u32, u64);
signed_bit_integer!(i8, i16, i32, i64);

impl BitInteger for bool {
    // Matches the in-memory size, as with the other integers; the codecs
    // that want a single-bit bool ask for it explicitly.
    const BITS: u8 = 8;

    fn from_raw(raw: u64, _bits: u8) -> Self {
        raw != 0
    }

    fn into_raw(self) -> u64 {
        self as u64
    }
}

/// Sign-extends the low `bits` of `raw` to 64 bits.
fn sign_extend(raw: u64, bits: u8) -> i64 {
    if bits >= 64 {
        return raw as i64;
    }
    let shift = 64 - bits as u32;
    ((raw << shift) as i64) >> shift
}

/// A read/write cursor over a [`BitBuf`].
///
/// Writes grow the underlying buffer on demand; reads never do. The
/// cursor is free to move backwards, which is how length prefixes get
/// patched after the data they describe has been written.
#[derive(Debug)]
pub struct BitStream<B = BitBuffer> {
    buffer: B,
    position: BufferPos,
}

impl Default for BitStream<BitBuffer> {
    fn default() -> Self {
        Self::new(BitBuffer::new())
    }
}

impl<B: BitBuf> BitStream<B> {
    pub fn new(buffer: B) -> Self {
        Self {
            buffer,
            position: BufferPos::default(),
        }
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut B {
        &mut self.buffer
    }

    pub fn into_buffer(self) -> B {
        self.buffer
    }

    /// Grows the buffer so that `pos` stays a valid cursor position.
    ///
    /// The growth schedule is `((byte + 1) << 1) + 2`, saturating at
    /// `usize::MAX`; a 1-byte buffer that takes one full byte write lands
    /// on exactly 6 bytes.
    fn expand_to(&mut self, pos: BufferPos) -> Result<(), BufferError> {
        if pos.byte() < self.buffer.len() {
            return Ok(());
        }
        let new_size = pos
            .byte()
            .saturating_add(1)
            .saturating_mul(2)
            .saturating_add(2);
        if new_size <= self.buffer.len() {
            return Err(BufferError::MaxSize);
        }
        self.buffer.resize(new_size)
    }
}

/// The object-safe surface of a [`BitStream`].
///
/// Codecs take `&mut dyn BitIo` so that custom primitive codecs can be
/// trait objects; the typed helpers live on [`BitIoExt`].
pub trait BitIo {
    fn tell(&self) -> BufferPos;

    /// Moves the cursor. With `expand` set, a position beyond the end
    /// grows the buffer; without it the position is taken as-is and later
    /// reads fail if it was out of range.
    fn seek(&mut self, pos: BufferPos, expand: bool) -> Result<(), BufferError>;

    /// Advances to the next byte boundary if the cursor is mid-byte.
    fn realign(&mut self) -> Result<(), BufferError>;

    /// Current size of the underlying buffer in bytes.
    fn capacity(&self) -> usize;

    fn read_raw(&mut self, bits: u8) -> Result<u64, BufferError>;

    fn write_raw(&mut self, value: u64, bits: u8) -> Result<(), BufferError>;

    /// Copies `bitsize` bits from the cursor into the front of `dst`.
    fn read_copy(&mut self, dst: &mut [u8], bitsize: usize) -> Result<(), BufferError>;

    /// Copies the first `bitsize` bits of `src` to the cursor.
    fn write_copy(&mut self, src: &[u8], bitsize: usize) -> Result<(), BufferError>;
}

impl<B: BitBuf> BitIo for BitStream<B> {
    fn tell(&self) -> BufferPos {
        self.position
    }

    fn seek(&mut self, pos: BufferPos, expand: bool) -> Result<(), BufferError> {
        if expand {
            self.expand_to(pos)?;
        }
        self.position = pos;
        Ok(())
    }

    fn realign(&mut self) -> Result<(), BufferError> {
        let aligned = self.position.aligned();
        self.seek(aligned, true)
    }

    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn read_raw(&mut self, bits: u8) -> Result<u64, BufferError> {
        let value = self.buffer.read_bits(self.position, bits)?;
        self.position = self.position.advance(bits as usize);
        Ok(value)
    }

    fn write_raw(&mut self, value: u64, bits: u8) -> Result<(), BufferError> {
        self.expand_to(self.position.advance(bits as usize))?;
        self.buffer.write_bits(value, self.position, bits)?;
        self.position = self.position.advance(bits as usize);
        Ok(())
    }

    fn read_copy(&mut self, dst: &mut [u8], bitsize: usize) -> Result<(), BufferError> {
        let mut remaining = bitsize;
        let mut index = 0;
        while remaining >= 8 {
            dst[index] = self.read_raw(8)? as u8;
            index += 1;
            remaining -= 8;
        }
        if remaining > 0 {
            let tail = self.read_raw(remaining as u8)? as u8;
            dst[index] = tail;
        }
        Ok(())
    }

    fn write_copy(&mut self, src: &[u8], bitsize: usize) -> Result<(), BufferError> {
        let mut remaining = bitsize;
        let mut index = 0;
        while remaining >= 8 {
            self.write_raw(src[index] as u64, 8)?;
            index += 1;
            remaining -= 8;
        }
        if remaining > 0 {
            self.write_raw(src[index] as u64, remaining as u8)?;
        }
        Ok(())
    }
}

/// Typed reads and writes on top of [`BitIo`].
pub trait BitIoExt: BitIo {
    /// Reads a `T` at its natural width.
    fn read<T: BitInteger>(&mut self) -> Result<T, BufferError> {
        self.read_bits(T::BITS)
    }

    /// Reads a `T` from `bits` bits, sign-extending signed types.
    fn read_bits<T: BitInteger>(&mut self, bits: u8) -> Result<T, BufferError> {
        Ok(T::from_raw(self.read_raw(bits)?, bits))
    }

    /// Writes a `T` at its natural width.
    fn write<T: BitInteger>(&mut self, value: T) -> Result<(), BufferError> {
        self.write_bits(value, T::BITS)
    }

    /// Writes the `bits` least significant bits of `value`.
    fn write_bits<T: BitInteger>(&mut self, value: T, bits: u8) -> Result<(), BufferError> {
        let mask = if bits >= 64 {
            u64::MAX
        } else {
            (1u64 << bits) - 1
        };
        self.write_raw(value.into_raw() & mask, bits)
    }

    fn read_f32(&mut self) -> Result<f32, BufferError> {
        Ok(f32::from_bits(self.read_raw(32)? as u32))
    }

    fn write_f32(&mut self, value: f32) -> Result<(), BufferError> {
        self.write_raw(value.to_bits() as u64, 32)
    }

    fn read_f64(&mut self) -> Result<f64, BufferError> {
        Ok(f64::from_bits(self.read_raw(64)?))
    }

    fn write_f64(&mut self, value: f64) -> Result<(), BufferError> {
        self.write_raw(value.to_bits(), 64)
    }
}

impl<S: BitIo + ?Sized> BitIoExt for S {}
