//! The bit-packed binary serializer.
//!
//! Two wire modes share one code path. Network mode is positional: a
//! u32 type hash and then every property in declaration order, no
//! per-property framing. File mode is self-describing: objects and
//! property records carry u32 bit sizes and property records carry the
//! full hash, so a reader with a different declaration order (or extra
//! properties) can still recover the object by hash and skip what it
//! does not know.

use std::io::Read;

use bitflags::bitflags;
use glyph_bits::{BitBuffer, BitIo, BitIoExt, BitStream, BufferPos};
use tracing::{debug, trace};

use crate::property::{Element, Property};
use crate::property_class::PropertyClass;
use crate::types::{TypeId, TypeSystem};
use crate::Error;

bitflags! {
    /// Serializer behavior switches. The set in effect is itself written
    /// to the stream when `WRITE_SERIALIZER_FLAGS` is present.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SerializerFlags: u32 {
        /// A u32 flags header precedes the data.
        const WRITE_SERIALIZER_FLAGS = 0x01;
        /// Properties without the PUBLIC flag are skipped.
        const WRITE_PUBLIC_ONLY = 0x04;
        /// The data after the flags header is wrapped in a compression
        /// envelope.
        const COMPRESSED = 0x08;
    }
}

/// Saves and loads object graphs against a read-only [`TypeSystem`].
pub struct BinarySerializer<'a> {
    types: &'a TypeSystem,
    is_file: bool,
    flags: SerializerFlags,
}

impl<'a> BinarySerializer<'a> {
    pub fn new(types: &'a TypeSystem, is_file: bool, flags: SerializerFlags) -> Self {
        Self {
            types,
            is_file,
            flags,
        }
    }

    /// The flags currently in effect. After a load this reflects the
    /// flags read from the stream.
    pub fn flags(&self) -> SerializerFlags {
        self.flags
    }

    pub fn save(&self, object: &PropertyClass, stream: &mut dyn BitIo) -> Result<(), Error> {
        if self.flags.contains(SerializerFlags::WRITE_SERIALIZER_FLAGS) {
            stream.write(self.flags.bits())?;
        }

        // Reserve room for the compression header; it is patched once the
        // object has been written and measured.
        let compression_header_pos = stream.tell();
        if self.flags.contains(SerializerFlags::COMPRESSED) {
            if self.is_file {
                stream.write(false)?;
            }
            stream.write(0u32)?;
        }

        let start = stream.tell();
        self.save_object(Some(object), stream)?;

        if self.flags.contains(SerializerFlags::COMPRESSED) {
            let end = stream.tell();
            let size_bits = end.bits_since(start);
            let size_bytes = size_bits.div_ceil(8);

            let mut uncompressed = vec![0u8; size_bytes];
            stream.seek(start, false)?;
            stream.read_copy(&mut uncompressed, size_bits)?;

            let compressed = zlib_compress(&uncompressed)?;
            let use_compression = compressed.len() < size_bytes;
            debug!(
                uncompressed = size_bytes,
                compressed = compressed.len(),
                use_compression,
                "compression envelope"
            );

            stream.seek(compression_header_pos, false)?;
            if self.is_file {
                stream.write(use_compression)?;
            }
            stream.write(size_bytes as u32)?;

            if use_compression {
                if tracing::event_enabled!(tracing::Level::TRACE) {
                    trace!(data = hex::encode(&compressed), "compressed block");
                }
                stream.write_copy(&compressed, compressed.len() * 8)?;
            } else {
                stream.seek(end, false)?;
            }
        }

        Ok(())
    }

    /// Loads the root object from a region of `size` bytes starting at
    /// the current position. The stream is left positioned after the
    /// region.
    pub fn load(
        &mut self,
        stream: &mut dyn BitIo,
        size: usize,
    ) -> Result<Option<PropertyClass>, Error> {
        let entry = stream.tell();

        if self.flags.contains(SerializerFlags::WRITE_SERIALIZER_FLAGS) {
            self.flags = SerializerFlags::from_bits_retain(stream.read::<u32>()?);
        }

        let object = if self.flags.contains(SerializerFlags::COMPRESSED) {
            let use_compression = if self.is_file {
                stream.read::<bool>()?
            } else {
                true
            };
            let uncompressed_size = stream.read::<u32>()? as usize;

            let consumed = stream.tell().bits_since(entry) / 8;
            let available = size.checked_sub(consumed).ok_or_else(|| {
                Error::parse("compression header is larger than the data region".to_string())
            })?;

            if use_compression {
                let mut compressed = vec![0u8; available];
                stream.read_copy(&mut compressed, available * 8)?;
                let data = zlib_decompress(&compressed, uncompressed_size)?;
                let mut inner = BitStream::new(BitBuffer::from_vec(data));
                self.load_object(&mut inner)?
            } else {
                self.load_object(stream)?
            }
        } else {
            self.load_object(stream)?
        };

        stream.seek(entry.advance(size * 8), false)?;
        Ok(object)
    }

    fn save_object(
        &self,
        object: Option<&PropertyClass>,
        stream: &mut dyn BitIo,
    ) -> Result<(), Error> {
        let object = match object {
            Some(object) => object,
            None => {
                // A null pointer is just a zero type hash.
                stream.write(0u32)?;
                return Ok(());
            }
        };

        stream.write(object.type_hash())?;

        let start = stream.tell();
        if self.is_file {
            stream.write(0u32)?;
        }

        for property in object.properties().iter() {
            self.save_property(property, stream)?;
        }

        if self.is_file {
            let end = stream.tell();
            let size_bits = end.bits_since(start) as u32;
            stream.seek(start, false)?;
            stream.write(size_bits)?;
            stream.seek(end, false)?;
        }

        Ok(())
    }

    fn save_property(&self, property: &Property, stream: &mut dyn BitIo) -> Result<(), Error> {
        if self.skips(property) {
            return Ok(());
        }

        // Prefixed records (dynamic counts, file-mode headers) start on a
        // byte boundary.
        if property.is_dynamic() || self.is_file {
            stream.realign()?;
        }

        let start = stream.tell();
        if self.is_file {
            stream.write(0u32)?;
            stream.write(property.full_hash())?;
        }

        if property.is_dynamic() {
            if self.is_file {
                stream.write((property.element_count() as u8).wrapping_mul(2))?;
            } else {
                stream.write(property.element_count() as u32)?;
            }
        }

        let ty = self.types.get(property.type_id());
        for index in 0..property.element_count() {
            if ty.is_byte_aligned() || property.flags().contains(crate::PropertyFlags::BYTE_ALIGNED)
            {
                stream.realign()?;
            }

            if ty.is_class() {
                match property.element(index)? {
                    Element::Object(object) if property.is_pointer() => {
                        self.save_object(Some(object), stream)?;
                    }
                    Element::Null => self.save_object(None, stream)?,
                    Element::Object(object) => self.save_flat_object(object, stream)?,
                    Element::Value(_) => {
                        return Err(Error::runtime(format!(
                            "class property '{}' holds a primitive payload",
                            property.name()
                        )))
                    }
                }
            } else {
                property.write_value_to(self.types, stream, self.is_file, index)?;
            }
        }

        if self.is_file {
            let end = stream.tell();
            let size_bits = end.bits_since(start) as u32;
            stream.seek(start, false)?;
            stream.write(size_bits)?;
            stream.seek(end, false)?;
        }

        Ok(())
    }

    /// A class held by value serializes flat: just its property values in
    /// declaration order, with no object header in either mode.
    fn save_flat_object(&self, object: &PropertyClass, stream: &mut dyn BitIo) -> Result<(), Error> {
        for property in object.properties().iter() {
            if property.is_dynamic() {
                return Err(Error::runtime(format!(
                    "dynamic property '{}' cannot live inside a by-value object",
                    property.name()
                )));
            }
            for index in 0..property.element_count() {
                match property.element(index)? {
                    Element::Value(_) => {
                        property.write_value_to(self.types, stream, self.is_file, index)?
                    }
                    Element::Object(nested) => self.save_flat_object(nested, stream)?,
                    Element::Null => {
                        return Err(Error::runtime(format!(
                            "null pointer in by-value object property '{}'",
                            property.name()
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    fn load_object(&self, stream: &mut dyn BitIo) -> Result<Option<PropertyClass>, Error> {
        let type_hash: u32 = stream.read()?;
        trace!(type_hash = format_args!("{type_hash:08X}"), "object header");
        if type_hash == 0 {
            return Ok(None);
        }

        // Unlike unknown properties, an unknown object hash is fatal.
        let ty = self.types.get_type_by_hash(type_hash)?;
        let type_id = ty.id();
        debug!(name = ty.name(), "loading object");
        let mut object = self.types.instantiate_id(type_id)?;

        if self.is_file {
            let declared: u32 = stream.read()?;
            let object_size = declared
                .checked_sub(u32::BITS)
                .ok_or_else(|| Error::parse("object size smaller than its own header".to_string()))?
                as usize;
            let data_start = stream.tell();

            while stream.tell().bits_since(data_start) < object_size {
                stream.realign()?;
                let record_start = stream.tell();
                let record_size: u32 = stream.read()?;
                if record_size < 2 * u32::BITS {
                    return Err(Error::parse(
                        "property record size smaller than its own header".to_string(),
                    ));
                }
                let next_byte = record_start.byte() + (record_size as usize).div_ceil(8);
                let full_hash: u32 = stream.read()?;

                if object.properties().get_by_full_hash(full_hash).is_some() {
                    self.load_property_by_hash(&mut object, full_hash, stream)?;
                } else {
                    // Self-describing records can be skipped wholesale.
                    debug!(
                        full_hash = format_args!("{full_hash:08X}"),
                        bits = record_size,
                        "skipping unknown property record"
                    );
                }

                stream.seek(BufferPos::new(next_byte, 0), false)?;
            }

            let end_byte = data_start.byte() + object_size.div_ceil(8);
            stream.seek(BufferPos::new(end_byte, 0), false)?;
        } else {
            for index in 0..object.properties().len() {
                self.load_property_at(&mut object, index, stream)?;
            }
        }

        Ok(Some(object))
    }

    fn load_property_by_hash(
        &self,
        object: &mut PropertyClass,
        full_hash: u32,
        stream: &mut dyn BitIo,
    ) -> Result<(), Error> {
        match object.properties_mut().get_mut_by_full_hash(full_hash) {
            Some(property) => self.load_property(property, stream),
            None => Ok(()),
        }
    }

    fn load_property_at(
        &self,
        object: &mut PropertyClass,
        index: usize,
        stream: &mut dyn BitIo,
    ) -> Result<(), Error> {
        self.load_property(object.properties_mut().at_mut(index)?, stream)
    }

    fn load_property(&self, property: &mut Property, stream: &mut dyn BitIo) -> Result<(), Error> {
        if self.skips(property) {
            return Ok(());
        }

        if property.is_dynamic() {
            stream.realign()?;
            let count = if self.is_file {
                // The file format stores twice the element count in a
                // single byte.
                (stream.read::<u8>()? / 2) as usize
            } else {
                stream.read::<u32>()? as usize
            };
            property.set_element_count(count, self.types)?;
            trace!(name = property.name(), count, "dynamic property");
        }

        let ty = self.types.get(property.type_id());
        let byte_aligned = ty.is_byte_aligned()
            || property.flags().contains(crate::PropertyFlags::BYTE_ALIGNED);
        let is_class = ty.is_class();
        let pointer = property.is_pointer();
        let type_id = property.type_id();

        for index in 0..property.element_count() {
            if byte_aligned {
                stream.realign()?;
            }

            if is_class {
                if pointer {
                    let nested = self.load_object(stream)?;
                    property.set_object(nested, index, self.types)?;
                } else {
                    let nested = self.load_flat_object(type_id, stream)?;
                    property.set_object(Some(nested), index, self.types)?;
                }
            } else {
                property.read_value_from(self.types, stream, self.is_file, index)?;
            }
        }

        Ok(())
    }

    /// Counterpart of [`Self::save_flat_object`]: reads a by-value class
    /// as a bare property walk.
    fn load_flat_object(
        &self,
        type_id: TypeId,
        stream: &mut dyn BitIo,
    ) -> Result<PropertyClass, Error> {
        let mut object = self.types.instantiate_id(type_id)?;

        for index in 0..object.properties().len() {
            let (property_type, count, dynamic) = {
                let property = object.properties().at(index)?;
                (
                    property.type_id(),
                    property.element_count(),
                    property.is_dynamic(),
                )
            };
            if dynamic {
                return Err(Error::runtime(
                    "dynamic property cannot live inside a by-value object".to_string(),
                ));
            }

            let is_class = self.types.get(property_type).is_class();
            for element in 0..count {
                if is_class {
                    let nested = self.load_flat_object(property_type, stream)?;
                    object.properties_mut().at_mut(index)?.set_object(
                        Some(nested),
                        element,
                        self.types,
                    )?;
                } else {
                    object.properties_mut().at_mut(index)?.read_value_from(
                        self.types,
                        stream,
                        self.is_file,
                        element,
                    )?;
                }
            }
        }

        Ok(object)
    }

    fn skips(&self, property: &Property) -> bool {
        self.flags.contains(SerializerFlags::WRITE_PUBLIC_ONLY)
            && !property.flags().contains(crate::PropertyFlags::PUBLIC)
    }
}

fn zlib_compress(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut encoder = flate2::read::ZlibEncoder::new(data, flate2::Compression::default());
    let mut out = Vec::new();
    encoder.read_to_end(&mut out)?;
    Ok(out)
}

fn zlib_decompress(data: &[u8], expected: usize) -> Result<Vec<u8>, Error> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(expected);
    decoder.read_to_end(&mut out)?;
    if out.len() != expected {
        return Err(Error::parse(format!(
            "decompressed to {} bytes, header promised {expected}",
            out.len()
        )));
    }
    Ok(out)
}
