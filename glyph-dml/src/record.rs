//! Ordered field collections.

use std::collections::HashMap;
use std::io::{Read, Write};

use crate::error::{ParseError, ValueError};
use crate::field::{Field, FieldType, FieldValue};

/// An ordered list of named fields.
///
/// Binary encoding is simply each transferable field in declaration
/// order; there is no header, no padding, and no alignment.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Vec<Field>,
    by_name: HashMap<String, usize>,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Adds a field, or returns the existing one when the name is
    /// already taken by a field of the same type. A name clash with a
    /// different type is an error.
    pub fn add_field(
        &mut self,
        name: impl Into<String>,
        field_type: FieldType,
    ) -> Result<&mut Field, ValueError> {
        let name = name.into();
        if let Some(&index) = self.by_name.get(&name) {
            if self.fields[index].field_type() != field_type {
                return Err(ValueError::BadField(format!(
                    "field '{name}' already exists with type {}",
                    self.fields[index].field_type().name()
                )));
            }
            return Ok(&mut self.fields[index]);
        }

        let index = self.fields.len();
        self.by_name.insert(name.clone(), index);
        self.fields.push(Field::new(name, field_type));
        Ok(&mut self.fields[index])
    }

    /// Adds a field and sets its value in one go.
    pub fn add_value(
        &mut self,
        name: impl Into<String>,
        value: FieldValue,
    ) -> Result<(), ValueError> {
        self.add_field(name, value.field_type())?.set_value(value)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        let index = *self.by_name.get(name)?;
        Some(&mut self.fields[index])
    }

    /// Total encoded size of the transferable fields.
    pub fn size(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| f.is_transferable())
            .map(Field::size)
            .sum()
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for field in self.fields.iter().filter(|f| f.is_transferable()) {
            field.write_to(writer)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<(), ParseError> {
        for field in self.fields.iter_mut().filter(|f| f.is_transferable()) {
            field.read_from(reader)?;
        }
        Ok(())
    }

    /// Builds a record from a `<RECORD>` element whose children are
    /// field declarations.
    pub fn from_xml(node: roxmltree::Node) -> Result<Self, ParseError> {
        if node.tag_name().name() != "RECORD" {
            return Err(ParseError::InvalidXml(format!(
                "expected <RECORD> node but got <{}>",
                node.tag_name().name()
            )));
        }

        let mut record = Record::new();
        for child in node.children().filter(roxmltree::Node::is_element) {
            let field = Field::from_xml(child)?;
            if record.has_field(field.name()) {
                // A repeated name replaces the earlier declaration.
                let index = record.by_name[field.name()];
                record.fields[index] = field;
            } else {
                let index = record.fields.len();
                record.by_name.insert(field.name().to_string(), index);
                record.fields.push(field);
            }
        }
        Ok(record)
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from("<RECORD>");
        for field in &self.fields {
            field.to_xml(&mut out);
        }
        out.push_str("</RECORD>");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_field_returns_the_existing_field_on_matching_type() {
        let mut record = Record::new();
        record.add_field("TestField", FieldType::Byt).unwrap();
        assert!(record.add_field("TestField", FieldType::Byt).is_ok());
        assert!(record.add_field("TestField", FieldType::Shrt).is_err());
        assert_eq!(record.field_count(), 1);
    }

    #[test]
    fn records_encode_transferable_fields_in_order() {
        let mut record = Record::new();
        record.add_value("TestStr", FieldValue::Str("TEST".to_string())).unwrap();
        record
            .add_field("Hidden", FieldType::UInt)
            .unwrap()
            .set_transferable(false);
        record.add_value("Tail", FieldValue::UByt(0x7F)).unwrap();

        let mut out = Vec::new();
        record.write_to(&mut out).unwrap();
        assert_eq!(out, [0x04, 0x00, b'T', b'E', b'S', b'T', 0x7F]);
        assert_eq!(record.size(), 7);
    }

    #[test]
    fn records_round_trip_through_xml() {
        let mut record = Record::new();
        record.add_value("SessionId", FieldValue::UShrt(7)).unwrap();
        record
            .add_field("Secret", FieldType::Str)
            .unwrap()
            .set_transferable(false);
        record
            .field_mut("Secret")
            .unwrap()
            .set_value(FieldValue::Str("a < b".to_string()))
            .unwrap();

        let xml = record.to_xml();
        assert!(xml.contains("<SessionId TYPE=\"USHRT\">7</SessionId>"));
        assert!(xml.contains("NOXFER=\"TRUE\""));
        assert!(xml.contains("a &lt; b"));

        let document = roxmltree::Document::parse(&xml).unwrap();
        let reloaded = Record::from_xml(document.root_element()).unwrap();
        assert_eq!(reloaded, record);
    }

    #[test]
    fn unknown_field_types_fail_the_parse() {
        let document =
            roxmltree::Document::parse("<RECORD><X TYPE=\"NOPE\">1</X></RECORD>").unwrap();
        assert!(Record::from_xml(document.root_element()).is_err());
    }
}
