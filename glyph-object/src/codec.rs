//! Bit-level codecs for primitive and enum payloads.
//!
//! One function pair covers every registered type: the type table says
//! how wide an integer is or which enum table to consult, and the data
//! flows through [`ValueData`] untyped.

use glyph_bits::{BitIo, BitIoExt};

use crate::types::{Primitive, TypeId, TypeKind, TypeSystem};
use crate::value::ValueData;
use crate::Error;

/// Writes a u16-length-prefixed byte string.
pub fn write_str(stream: &mut dyn BitIo, value: &str) -> Result<(), Error> {
    let bytes = value.as_bytes();
    let length = u16::try_from(bytes.len())
        .map_err(|_| Error::runtime(format!("string of {} bytes exceeds u16 length", bytes.len())))?;
    stream.write(length)?;
    for &byte in bytes {
        stream.write(byte)?;
    }
    Ok(())
}

/// Reads a u16-length-prefixed byte string.
pub fn read_str(stream: &mut dyn BitIo) -> Result<String, Error> {
    let length: u16 = stream.read()?;
    let mut bytes = Vec::with_capacity(length as usize);
    for _ in 0..length {
        bytes.push(stream.read::<u8>()?);
    }
    String::from_utf8(bytes).map_err(|_| Error::parse("string is not valid UTF-8".to_string()))
}

/// Writes a u16-length-prefixed UTF-16LE string; the prefix counts code
/// units.
pub fn write_wstr(stream: &mut dyn BitIo, value: &str) -> Result<(), Error> {
    let units: Vec<u16> = value.encode_utf16().collect();
    let length = u16::try_from(units.len())
        .map_err(|_| Error::runtime(format!("string of {} units exceeds u16 length", units.len())))?;
    stream.write(length)?;
    for unit in units {
        stream.write(unit)?;
    }
    Ok(())
}

/// Reads a u16-length-prefixed UTF-16LE string.
pub fn read_wstr(stream: &mut dyn BitIo) -> Result<String, Error> {
    let length: u16 = stream.read()?;
    let mut units = Vec::with_capacity(length as usize);
    for _ in 0..length {
        units.push(stream.read::<u16>()?);
    }
    String::from_utf16(&units).map_err(|_| Error::parse("string is not valid UTF-16".to_string()))
}

/// Writes one payload of type `type_id` at the current position.
pub fn write_data(
    ts: &TypeSystem,
    stream: &mut dyn BitIo,
    type_id: TypeId,
    data: &ValueData,
    is_file: bool,
) -> Result<(), Error> {
    let ty = ts.get(type_id);
    let mismatch = || {
        Error::runtime(format!(
            "cannot encode a {} payload as type '{}'",
            data.kind_name(),
            ty.name()
        ))
    };

    match ty.kind() {
        TypeKind::Primitive(Primitive::Bool) => match data {
            ValueData::Bool(v) => Ok(stream.write_bits(*v as u8, 1)?),
            _ => Err(mismatch()),
        },
        TypeKind::Primitive(Primitive::Signed { bits }) => match data {
            ValueData::Signed(v) => Ok(stream.write_bits(*v, *bits)?),
            _ => Err(mismatch()),
        },
        TypeKind::Primitive(Primitive::Unsigned { bits }) => match data {
            ValueData::Unsigned(v) => Ok(stream.write_bits(*v, *bits)?),
            _ => Err(mismatch()),
        },
        TypeKind::Primitive(Primitive::Float { bits }) => match data {
            ValueData::Float(v) if *bits == 32 => Ok(stream.write_f32(*v as f32)?),
            ValueData::Float(v) => Ok(stream.write_f64(*v)?),
            _ => Err(mismatch()),
        },
        TypeKind::Primitive(Primitive::Str) => match data {
            ValueData::Str(v) => write_str(stream, v),
            _ => Err(mismatch()),
        },
        TypeKind::Primitive(Primitive::WStr) => match data {
            ValueData::WStr(v) => write_wstr(stream, v),
            _ => Err(mismatch()),
        },
        TypeKind::Primitive(Primitive::Json) => Err(Error::runtime(format!(
            "type '{}' is not serializable",
            ty.name()
        ))),
        TypeKind::Primitive(Primitive::Custom(custom)) => {
            custom.codec.write(stream, data, is_file)
        }
        TypeKind::Enum(def) => {
            let value = match data {
                ValueData::Enum(v) => *v,
                _ => return Err(mismatch()),
            };
            if is_file {
                // File mode spells enums by element name.
                let name = def.name_of(value).ok_or_else(|| {
                    Error::runtime(format!(
                        "enum '{}' has no element with value {value}",
                        ty.name()
                    ))
                })?;
                write_str(stream, name)
            } else {
                Ok(stream.write(value)?)
            }
        }
        TypeKind::Class(_) => Err(Error::runtime(format!(
            "type '{}' is a class; it is written as a nested object",
            ty.name()
        ))),
    }
}

/// Reads one payload of type `type_id` from the current position.
pub fn read_data(
    ts: &TypeSystem,
    stream: &mut dyn BitIo,
    type_id: TypeId,
    is_file: bool,
) -> Result<ValueData, Error> {
    let ty = ts.get(type_id);
    match ty.kind() {
        TypeKind::Primitive(Primitive::Bool) => {
            Ok(ValueData::Bool(stream.read_bits::<u8>(1)? != 0))
        }
        TypeKind::Primitive(Primitive::Signed { bits }) => {
            Ok(ValueData::Signed(stream.read_bits::<i64>(*bits)?))
        }
        TypeKind::Primitive(Primitive::Unsigned { bits }) => {
            Ok(ValueData::Unsigned(stream.read_bits::<u64>(*bits)?))
        }
        TypeKind::Primitive(Primitive::Float { bits }) => {
            if *bits == 32 {
                Ok(ValueData::Float(stream.read_f32()? as f64))
            } else {
                Ok(ValueData::Float(stream.read_f64()?))
            }
        }
        TypeKind::Primitive(Primitive::Str) => Ok(ValueData::Str(read_str(stream)?)),
        TypeKind::Primitive(Primitive::WStr) => Ok(ValueData::WStr(read_wstr(stream)?)),
        TypeKind::Primitive(Primitive::Json) => Err(Error::runtime(format!(
            "type '{}' is not serializable",
            ty.name()
        ))),
        TypeKind::Primitive(Primitive::Custom(custom)) => custom.codec.read(stream, is_file),
        TypeKind::Enum(def) => {
            if is_file {
                let name = read_str(stream)?;
                let value = def.value_of(&name).ok_or_else(|| {
                    Error::parse(format!(
                        "enum '{}' has no element called '{name}'",
                        ty.name()
                    ))
                })?;
                Ok(ValueData::Enum(value))
            } else {
                let value: u32 = stream.read()?;
                if value != 0 && !def.has_value(value) {
                    return Err(Error::parse(format!(
                        "enum '{}' has no element with value {value}",
                        ty.name()
                    )));
                }
                Ok(ValueData::Enum(value))
            }
        }
        TypeKind::Class(_) => Err(Error::runtime(format!(
            "type '{}' is a class; it is read as a nested object",
            ty.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyph_bits::{BitBuf, BitStream, BufferPos};

    fn roundtrip(ts: &TypeSystem, type_name: &str, data: ValueData, is_file: bool) -> ValueData {
        let id = ts.get_type(type_name).unwrap().id();
        let mut stream = BitStream::default();
        write_data(ts, &mut stream, id, &data, is_file).unwrap();
        stream.seek(BufferPos::default(), false).unwrap();
        read_data(ts, &mut stream, id, is_file).unwrap()
    }

    #[test]
    fn integers_round_trip_at_odd_widths() {
        let ts = TypeSystem::new();
        for (name, data) in [
            ("bi4", ValueData::Signed(-6)),
            ("bui4", ValueData::Unsigned(5)),
            ("s24", ValueData::Signed(0x040506)),
            ("u24", ValueData::Unsigned(0x040506)),
            ("long", ValueData::Signed(0x0B0C0D0E0F101112)),
        ] {
            assert_eq!(roundtrip(&ts, name, data.clone(), false), data);
        }
    }

    #[test]
    fn strings_carry_a_u16_code_unit_prefix() {
        let ts = TypeSystem::new();
        let id = ts.get_type("std::string").unwrap().id();
        let mut stream = BitStream::default();
        write_data(
            &ts,
            &mut stream,
            id,
            &ValueData::Str("TEST".to_string()),
            false,
        )
        .unwrap();
        assert_eq!(
            &stream.buffer().data()[..6],
            &[0x04, 0x00, b'T', b'E', b'S', b'T']
        );

        let wide = ts.get_type("std::wstring").unwrap().id();
        let mut stream = BitStream::default();
        write_data(
            &ts,
            &mut stream,
            wide,
            &ValueData::WStr("TEST".to_string()),
            false,
        )
        .unwrap();
        assert_eq!(
            &stream.buffer().data()[..10],
            &[0x04, 0x00, b'T', 0, b'E', 0, b'S', 0, b'T', 0]
        );
    }

    #[test]
    fn enums_write_values_on_the_network_and_names_in_files() {
        let mut ts = TypeSystem::new();
        ts.define_enum("enum NestedObjectKind", &[("NONE", 0), ("OBJECT", 1)])
            .unwrap();
        let id = ts.get_type("enum NestedObjectKind").unwrap().id();

        let mut stream = BitStream::default();
        write_data(&ts, &mut stream, id, &ValueData::Enum(1), false).unwrap();
        assert_eq!(&stream.buffer().data()[..4], &[1, 0, 0, 0]);

        let mut stream = BitStream::default();
        write_data(&ts, &mut stream, id, &ValueData::Enum(1), true).unwrap();
        assert_eq!(&stream.buffer().data()[..8], b"\x06\x00OBJECT");

        assert_eq!(
            roundtrip(&ts, "enum NestedObjectKind", ValueData::Enum(1), true),
            ValueData::Enum(1)
        );
    }

    #[test]
    fn unknown_enum_values_are_rejected_except_zero() {
        let mut ts = TypeSystem::new();
        ts.define_enum("enum NestedObjectKind", &[("OBJECT", 1)])
            .unwrap();
        let id = ts.get_type("enum NestedObjectKind").unwrap().id();

        let mut stream = BitStream::default();
        stream.write(7u32).unwrap();
        stream.seek(BufferPos::default(), false).unwrap();
        assert!(read_data(&ts, &mut stream, id, false).is_err());

        let mut stream = BitStream::default();
        stream.write(0u32).unwrap();
        stream.seek(BufferPos::default(), false).unwrap();
        assert_eq!(
            read_data(&ts, &mut stream, id, false).unwrap(),
            ValueData::Enum(0)
        );
    }
}
