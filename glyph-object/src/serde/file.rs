//! Self-describing file containers.
//!
//! The first four bytes pick the serializer: `BINd` for the bit-packed
//! file-mode encoding, `JSON` for the JSON rendition, and anything else
//! is taken to be XML.

use std::path::Path;

use glyph_bits::{BitBuf, BitBuffer, BitIo, BitStream};

use crate::property_class::PropertyClass;
use crate::serde::binary::{BinarySerializer, SerializerFlags};
use crate::serde::json::JsonSerializer;
use crate::serde::xml::XmlSerializer;
use crate::types::TypeSystem;
use crate::Error;

pub const BINARY_MAGIC: &[u8; 4] = b"BINd";
pub const JSON_MAGIC: &[u8; 4] = b"JSON";
const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

pub struct FileSerializer<'a> {
    types: &'a TypeSystem,
}

impl<'a> FileSerializer<'a> {
    pub fn new(types: &'a TypeSystem) -> Self {
        Self { types }
    }

    /// Renders `object` in the binary file encoding. The flags header is
    /// forced on so that `load` can recover the flags that were used.
    pub fn save_binary(
        &self,
        object: &PropertyClass,
        flags: SerializerFlags,
    ) -> Result<Vec<u8>, Error> {
        let serializer = BinarySerializer::new(
            self.types,
            true,
            flags | SerializerFlags::WRITE_SERIALIZER_FLAGS,
        );
        let mut stream = BitStream::new(BitBuffer::new());
        serializer.save(object, &mut stream)?;

        let size = stream.tell().as_bytes();
        let mut out = Vec::with_capacity(4 + size);
        out.extend_from_slice(BINARY_MAGIC);
        out.extend_from_slice(&stream.buffer().data()[..size]);
        Ok(out)
    }

    pub fn save_json(&self, object: &PropertyClass) -> Result<Vec<u8>, Error> {
        let text = JsonSerializer::new(self.types, true).save(object)?;
        let mut out = Vec::with_capacity(4 + text.len());
        out.extend_from_slice(JSON_MAGIC);
        out.extend_from_slice(text.as_bytes());
        Ok(out)
    }

    pub fn save_xml(&self, object: &PropertyClass) -> Result<Vec<u8>, Error> {
        let text = XmlSerializer::new(self.types).save(object)?;
        let mut out = Vec::with_capacity(XML_DECLARATION.len() + text.len());
        out.extend_from_slice(XML_DECLARATION.as_bytes());
        out.extend_from_slice(text.as_bytes());
        Ok(out)
    }

    /// Loads from any of the three container encodings.
    pub fn load(&self, data: &[u8]) -> Result<Option<PropertyClass>, Error> {
        if data.len() < 4 {
            return Err(Error::parse(
                "not enough data to determine the serializer used".to_string(),
            ));
        }

        if &data[..4] == BINARY_MAGIC {
            let mut stream = BitStream::new(BitBuffer::from_vec(data[4..].to_vec()));
            let mut serializer =
                BinarySerializer::new(self.types, true, SerializerFlags::WRITE_SERIALIZER_FLAGS);
            serializer.load(&mut stream, data.len() - 4)
        } else if &data[..4] == JSON_MAGIC {
            let text = std::str::from_utf8(&data[4..])
                .map_err(|_| Error::parse("JSON container is not valid UTF-8".to_string()))?;
            JsonSerializer::new(self.types, true).load(text)
        } else {
            let text = std::str::from_utf8(data)
                .map_err(|_| Error::parse("XML container is not valid UTF-8".to_string()))?;
            XmlSerializer::new(self.types).load(text)
        }
    }

    pub fn save_binary_to(
        &self,
        object: &PropertyClass,
        flags: SerializerFlags,
        path: impl AsRef<Path>,
    ) -> Result<(), Error> {
        Ok(std::fs::write(path, self.save_binary(object, flags)?)?)
    }

    pub fn save_json_to(&self, object: &PropertyClass, path: impl AsRef<Path>) -> Result<(), Error> {
        Ok(std::fs::write(path, self.save_json(object)?)?)
    }

    pub fn save_xml_to(&self, object: &PropertyClass, path: impl AsRef<Path>) -> Result<(), Error> {
        Ok(std::fs::write(path, self.save_xml(object)?)?)
    }

    pub fn load_from(&self, path: impl AsRef<Path>) -> Result<Option<PropertyClass>, Error> {
        let data = std::fs::read(path)?;
        self.load(&data)
    }
}
