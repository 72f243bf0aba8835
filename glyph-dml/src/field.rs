//! Record fields: one name, one typed value, one transferability flag.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{ParseError, ValueError};

/// The DML field types and their XML `TYPE` spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Byt,
    UByt,
    Shrt,
    UShrt,
    Int,
    UInt,
    Flt,
    Dbl,
    Str,
    WStr,
    Gid,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Byt => "BYT",
            FieldType::UByt => "UBYT",
            FieldType::Shrt => "SHRT",
            FieldType::UShrt => "USHRT",
            FieldType::Int => "INT",
            FieldType::UInt => "UINT",
            FieldType::Flt => "FLT",
            FieldType::Dbl => "DBL",
            FieldType::Str => "STR",
            FieldType::WStr => "WSTR",
            FieldType::Gid => "GID",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "BYT" => FieldType::Byt,
            "UBYT" => FieldType::UByt,
            "SHRT" => FieldType::Shrt,
            "USHRT" => FieldType::UShrt,
            "INT" => FieldType::Int,
            "UINT" => FieldType::UInt,
            "FLT" => FieldType::Flt,
            "DBL" => FieldType::Dbl,
            "STR" => FieldType::Str,
            "WSTR" => FieldType::WStr,
            "GID" => FieldType::Gid,
            _ => return None,
        })
    }

    pub fn default_value(&self) -> FieldValue {
        match self {
            FieldType::Byt => FieldValue::Byt(0),
            FieldType::UByt => FieldValue::UByt(0),
            FieldType::Shrt => FieldValue::Shrt(0),
            FieldType::UShrt => FieldValue::UShrt(0),
            FieldType::Int => FieldValue::Int(0),
            FieldType::UInt => FieldValue::UInt(0),
            FieldType::Flt => FieldValue::Flt(0.0),
            FieldType::Dbl => FieldValue::Dbl(0.0),
            FieldType::Str => FieldValue::Str(String::new()),
            FieldType::WStr => FieldValue::WStr(String::new()),
            FieldType::Gid => FieldValue::Gid(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Byt(i8),
    UByt(u8),
    Shrt(i16),
    UShrt(u16),
    Int(i32),
    UInt(u32),
    Flt(f32),
    Dbl(f64),
    Str(String),
    WStr(String),
    Gid(u64),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Byt(_) => FieldType::Byt,
            FieldValue::UByt(_) => FieldType::UByt,
            FieldValue::Shrt(_) => FieldType::Shrt,
            FieldValue::UShrt(_) => FieldType::UShrt,
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::UInt(_) => FieldType::UInt,
            FieldValue::Flt(_) => FieldType::Flt,
            FieldValue::Dbl(_) => FieldType::Dbl,
            FieldValue::Str(_) => FieldType::Str,
            FieldValue::WStr(_) => FieldType::WStr,
            FieldValue::Gid(_) => FieldType::Gid,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    value: FieldValue,
    transferable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            value: field_type.default_value(),
            transferable: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.value.field_type()
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    /// Replaces the value; the incoming type must match the field type.
    pub fn set_value(&mut self, value: FieldValue) -> Result<(), ValueError> {
        if value.field_type() != self.field_type() {
            return Err(ValueError::BadField(format!(
                "tried to store a {} value in {} field '{}'",
                value.field_type().name(),
                self.field_type().name(),
                self.name
            )));
        }
        self.value = value;
        Ok(())
    }

    /// Non-transferable fields are invisible to the binary codec but
    /// still round-trip through XML.
    pub fn is_transferable(&self) -> bool {
        self.transferable
    }

    pub fn set_transferable(&mut self, transferable: bool) {
        self.transferable = transferable;
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        match &self.value {
            FieldValue::Byt(_) | FieldValue::UByt(_) => 1,
            FieldValue::Shrt(_) | FieldValue::UShrt(_) => 2,
            FieldValue::Int(_) | FieldValue::UInt(_) | FieldValue::Flt(_) => 4,
            FieldValue::Dbl(_) | FieldValue::Gid(_) => 8,
            FieldValue::Str(v) => 2 + v.len(),
            FieldValue::WStr(v) => 2 + v.encode_utf16().count() * 2,
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        match &self.value {
            FieldValue::Byt(v) => writer.write_i8(*v),
            FieldValue::UByt(v) => writer.write_u8(*v),
            FieldValue::Shrt(v) => writer.write_i16::<LittleEndian>(*v),
            FieldValue::UShrt(v) => writer.write_u16::<LittleEndian>(*v),
            FieldValue::Int(v) => writer.write_i32::<LittleEndian>(*v),
            FieldValue::UInt(v) => writer.write_u32::<LittleEndian>(*v),
            FieldValue::Flt(v) => writer.write_f32::<LittleEndian>(*v),
            FieldValue::Dbl(v) => writer.write_f64::<LittleEndian>(*v),
            FieldValue::Gid(v) => writer.write_u64::<LittleEndian>(*v),
            FieldValue::Str(v) => {
                writer.write_u16::<LittleEndian>(v.len() as u16)?;
                writer.write_all(v.as_bytes())
            }
            FieldValue::WStr(v) => {
                let units: Vec<u16> = v.encode_utf16().collect();
                writer.write_u16::<LittleEndian>(units.len() as u16)?;
                for unit in units {
                    writer.write_u16::<LittleEndian>(unit)?;
                }
                Ok(())
            }
        }
    }

    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<(), ParseError> {
        let short = |_| {
            ParseError::InsufficientMessageData(format!(
                "field '{}' ({})",
                self.name,
                self.field_type().name()
            ))
        };

        self.value = match self.field_type() {
            FieldType::Byt => FieldValue::Byt(reader.read_i8().map_err(short)?),
            FieldType::UByt => FieldValue::UByt(reader.read_u8().map_err(short)?),
            FieldType::Shrt => FieldValue::Shrt(reader.read_i16::<LittleEndian>().map_err(short)?),
            FieldType::UShrt => {
                FieldValue::UShrt(reader.read_u16::<LittleEndian>().map_err(short)?)
            }
            FieldType::Int => FieldValue::Int(reader.read_i32::<LittleEndian>().map_err(short)?),
            FieldType::UInt => FieldValue::UInt(reader.read_u32::<LittleEndian>().map_err(short)?),
            FieldType::Flt => FieldValue::Flt(reader.read_f32::<LittleEndian>().map_err(short)?),
            FieldType::Dbl => FieldValue::Dbl(reader.read_f64::<LittleEndian>().map_err(short)?),
            FieldType::Gid => FieldValue::Gid(reader.read_u64::<LittleEndian>().map_err(short)?),
            FieldType::Str => {
                let length = reader.read_u16::<LittleEndian>().map_err(short)? as usize;
                let mut bytes = vec![0u8; length];
                reader.read_exact(&mut bytes).map_err(short)?;
                let text = String::from_utf8(bytes).map_err(|_| {
                    ParseError::InvalidMessageData(format!(
                        "field '{}' is not valid UTF-8",
                        self.name
                    ))
                })?;
                FieldValue::Str(text)
            }
            FieldType::WStr => {
                let length = reader.read_u16::<LittleEndian>().map_err(short)? as usize;
                let mut units = Vec::with_capacity(length);
                for _ in 0..length {
                    units.push(reader.read_u16::<LittleEndian>().map_err(short)?);
                }
                let text = String::from_utf16(&units).map_err(|_| {
                    ParseError::InvalidMessageData(format!(
                        "field '{}' is not valid UTF-16",
                        self.name
                    ))
                })?;
                FieldValue::WStr(text)
            }
        };
        Ok(())
    }

    /// Renders the value the way the XML form spells it.
    pub fn value_string(&self) -> String {
        match &self.value {
            FieldValue::Byt(v) => v.to_string(),
            FieldValue::UByt(v) => v.to_string(),
            FieldValue::Shrt(v) => v.to_string(),
            FieldValue::UShrt(v) => v.to_string(),
            FieldValue::Int(v) => v.to_string(),
            FieldValue::UInt(v) => v.to_string(),
            FieldValue::Flt(v) => v.to_string(),
            FieldValue::Dbl(v) => v.to_string(),
            FieldValue::Gid(v) => v.to_string(),
            FieldValue::Str(v) | FieldValue::WStr(v) => v.clone(),
        }
    }

    pub fn set_value_from_string(&mut self, text: &str) -> Result<(), ValueError> {
        let bad = || {
            ValueError::BadField(format!(
                "'{text}' is not a valid {} value for field '{}'",
                self.field_type().name(),
                self.name
            ))
        };

        self.value = match self.field_type() {
            FieldType::Byt => FieldValue::Byt(text.parse().map_err(|_| bad())?),
            FieldType::UByt => FieldValue::UByt(text.parse().map_err(|_| bad())?),
            FieldType::Shrt => FieldValue::Shrt(text.parse().map_err(|_| bad())?),
            FieldType::UShrt => FieldValue::UShrt(text.parse().map_err(|_| bad())?),
            FieldType::Int => FieldValue::Int(text.parse().map_err(|_| bad())?),
            FieldType::UInt => FieldValue::UInt(text.parse().map_err(|_| bad())?),
            FieldType::Flt => FieldValue::Flt(text.parse().map_err(|_| bad())?),
            FieldType::Dbl => FieldValue::Dbl(text.parse().map_err(|_| bad())?),
            FieldType::Gid => FieldValue::Gid(text.parse().map_err(|_| bad())?),
            FieldType::Str => FieldValue::Str(text.to_string()),
            FieldType::WStr => FieldValue::WStr(text.to_string()),
        };
        Ok(())
    }

    /// Loads a field from an XML element such as
    /// `<Name TYPE="STR" NOXFER="TRUE">value</Name>`.
    pub fn from_xml(node: roxmltree::Node) -> Result<Self, ParseError> {
        let element = node.tag_name().name();
        let mut field_type = None;
        let mut transferable = true;

        for attribute in node.attributes() {
            match attribute.name() {
                "TYPE" => {
                    field_type = Some(FieldType::from_name(attribute.value()).ok_or_else(|| {
                        ParseError::InvalidXml(format!(
                            "unknown DML type \"{}\" in field node '{element}'",
                            attribute.value()
                        ))
                    })?);
                }
                "NOXFER" => transferable = attribute.value() != "TRUE",
                other => {
                    return Err(ParseError::InvalidXml(format!(
                        "field node '{element}' has unknown attribute \"{other}\""
                    )))
                }
            }
        }

        let field_type = field_type.ok_or_else(|| {
            ParseError::InvalidXml(format!(
                "field node '{element}' is missing required TYPE attribute"
            ))
        })?;

        let mut field = Field::new(element, field_type);
        field.transferable = transferable;
        if let Some(text) = node.text() {
            if !text.is_empty() {
                field
                    .set_value_from_string(text)
                    .map_err(|e| ParseError::InvalidXml(e.to_string()))?;
            }
        }
        Ok(field)
    }

    pub fn to_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        out.push_str(" TYPE=\"");
        out.push_str(self.field_type().name());
        out.push('"');
        if !self.transferable {
            out.push_str(" NOXFER=\"TRUE\"");
        }
        out.push('>');
        push_escaped(out, &self.value_string());
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn push_escaped(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: FieldValue) -> Vec<u8> {
        let mut field = Field::new("TestField", value.field_type());
        field.set_value(value).unwrap();
        let mut out = Vec::new();
        field.write_to(&mut out).unwrap();
        out
    }

    #[test]
    fn fields_encode_little_endian_at_natural_width() {
        assert_eq!(encoded(FieldValue::Byt(0x56)), [0x56]);
        assert_eq!(encoded(FieldValue::UByt(0xAA)), [0xAA]);
        assert_eq!(encoded(FieldValue::Shrt(-0x5545)), [0xBB, 0xAA]);
        assert_eq!(encoded(FieldValue::UShrt(0xAABB)), [0xBB, 0xAA]);
        assert_eq!(
            encoded(FieldValue::UInt(0xAABBCCDD)),
            [0xDD, 0xCC, 0xBB, 0xAA]
        );
        assert_eq!(encoded(FieldValue::Flt(152.4)), [0x66, 0x66, 0x18, 0x43]);
        assert_eq!(
            encoded(FieldValue::Dbl(152.4)),
            [0xCD, 0xCC, 0xCC, 0xCC, 0xCC, 0x0C, 0x63, 0x40]
        );
        assert_eq!(
            encoded(FieldValue::Gid(0x8899AABBCCDDEEFF)),
            [0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA, 0x99, 0x88]
        );
    }

    #[test]
    fn strings_carry_a_length_prefix() {
        assert_eq!(
            encoded(FieldValue::Str("TEST".to_string())),
            [0x04, 0x00, b'T', b'E', b'S', b'T']
        );
        assert_eq!(
            encoded(FieldValue::WStr("TEST".to_string())),
            [0x04, 0x00, b'T', 0, b'E', 0, b'S', 0, b'T', 0]
        );
    }

    #[test]
    fn reads_mirror_writes() {
        let values = [
            FieldValue::Byt(-5),
            FieldValue::UShrt(0xAABB),
            FieldValue::Int(-77),
            FieldValue::Dbl(152.4),
            FieldValue::Str("TEST".to_string()),
            FieldValue::WStr("TEST".to_string()),
            FieldValue::Gid(0x8899AABBCCDDEEFF),
        ];
        for value in values {
            let bytes = encoded(value.clone());
            let mut field = Field::new("TestField", value.field_type());
            field.read_from(&mut bytes.as_slice()).unwrap();
            assert_eq!(field.value(), &value);
        }
    }

    #[test]
    fn truncated_input_names_the_field() {
        let mut field = Field::new("TestStr", FieldType::Str);
        let err = field.read_from(&mut [0x04u8, 0x00, b'T'].as_slice()).unwrap_err();
        assert!(err.to_string().contains("TestStr"));
    }

    #[test]
    fn type_mismatches_are_rejected() {
        let mut field = Field::new("TestField", FieldType::Byt);
        assert!(field.set_value(FieldValue::Shrt(1)).is_err());
    }
}
