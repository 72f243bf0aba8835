//! Wire-framed DML messages.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::ParseError;
use crate::module::MessageTemplate;
use crate::record::Record;

/// `[u8 service][u8 type][u16 length]`, where the length includes the
/// header itself.
pub const MESSAGE_HEADER_SIZE: usize = 4;

/// A message either freshly built from a template (payload parsed into a
/// [`Record`]) or as-received with a raw payload awaiting its template.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    service_id: u8,
    message_type: u8,
    name: Option<String>,
    access_level: u8,
    record: Option<Record>,
    raw: Vec<u8>,
}

impl Message {
    pub(crate) fn from_template(template: &MessageTemplate) -> Self {
        Self {
            service_id: template.service_id(),
            message_type: template.message_type(),
            name: Some(template.name().to_string()),
            access_level: template.access_level(),
            record: Some(template.record().clone()),
            raw: Vec::new(),
        }
    }

    pub fn service_id(&self) -> u8 {
        self.service_id
    }

    pub fn message_type(&self) -> u8 {
        self.message_type
    }

    /// The template name, when the message has been matched to one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Access requirement inherited from the template (0 when untyped).
    pub fn access_level(&self) -> u8 {
        self.access_level
    }

    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    pub fn record_mut(&mut self) -> Option<&mut Record> {
        self.record.as_mut()
    }

    /// Payload size plus the message header.
    pub fn size(&self) -> usize {
        let payload = match &self.record {
            Some(record) => record.size(),
            None => self.raw.len(),
        };
        MESSAGE_HEADER_SIZE + payload
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u8(self.service_id)?;
        writer.write_u8(self.message_type)?;
        writer.write_u16::<LittleEndian>(self.size() as u16)?;
        match &self.record {
            Some(record) => record.write_to(writer),
            None => writer.write_all(&self.raw),
        }
    }

    /// Reads the header and raw payload; the record stays unparsed until
    /// a template is applied.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, ParseError> {
        let header = |field: &str| {
            let field = field.to_string();
            move |_| ParseError::InvalidHeaderData(format!("message header ({field})"))
        };

        let service_id = reader.read_u8().map_err(header("service id"))?;
        let message_type = reader.read_u8().map_err(header("message type"))?;
        let length = reader
            .read_u16::<LittleEndian>()
            .map_err(header("length"))? as usize;
        let payload = length.checked_sub(MESSAGE_HEADER_SIZE).ok_or_else(|| {
            ParseError::InvalidHeaderData(format!(
                "message length {length} is smaller than its header"
            ))
        })?;

        let mut raw = vec![0u8; payload];
        reader.read_exact(&mut raw).map_err(|_| {
            ParseError::InsufficientMessageData("message payload".to_string())
        })?;

        Ok(Self {
            service_id,
            message_type,
            name: None,
            access_level: 0,
            record: None,
            raw,
        })
    }

    /// Parses the raw payload against a template's record layout.
    pub(crate) fn apply_template(&mut self, template: &MessageTemplate) -> Result<(), ParseError> {
        let mut record = template.record().clone();
        record
            .read_from(&mut self.raw.as_slice())
            .map_err(|e| ParseError::InvalidMessageData(e.to_string()))?;

        self.name = Some(template.name().to_string());
        self.access_level = template.access_level();
        self.record = Some(record);
        self.raw.clear();
        Ok(())
    }
}
