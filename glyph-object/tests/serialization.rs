//! End-to-end serialization coverage over a class exercising every
//! property shape: odd-width integers, strings, floats, a custom
//! primitive, fixed arrays, dynamic vectors, nested objects, and
//! polymorphic pointers.

use std::sync::Arc;

use glyph_bits::{BitBuf, BitBuffer, BitIo, BitStream, BufferPos};
use glyph_object::{
    BinarySerializer, ClassBuilder, CustomCodec, CustomPrimitive, Error, FileSerializer,
    JsonSerializer, Primitive, PropertyClass, PropertyFlags, SerializerFlags, TypeSystem,
    ValueData, XmlSerializer,
};
use glyph_bits::BitIoExt;
use serde_json::json;

/// A 3-float vector stored as a JSON payload, written as three packed
/// f32 values starting on a byte boundary.
struct Vector3Codec;

impl CustomCodec for Vector3Codec {
    fn write(
        &self,
        stream: &mut dyn BitIo,
        data: &ValueData,
        _is_file: bool,
    ) -> Result<(), Error> {
        let value = match data {
            ValueData::Json(value) => value,
            other => {
                return Err(Error::Runtime(format!(
                    "vector payload must be json, got {}",
                    other.kind_name()
                )))
            }
        };
        for axis in ["x", "y", "z"] {
            let component = value
                .get(axis)
                .and_then(|v| v.as_f64())
                .ok_or_else(|| Error::Runtime(format!("vector payload missing '{axis}'")))?;
            stream.write_f32(component as f32)?;
        }
        Ok(())
    }

    fn read(&self, stream: &mut dyn BitIo, _is_file: bool) -> Result<ValueData, Error> {
        let x = stream.read_f32()?;
        let y = stream.read_f32()?;
        let z = stream.read_f32()?;
        Ok(ValueData::Json(json!({
            "x": x as f64,
            "y": y as f64,
            "z": z as f64,
        })))
    }
}

fn vector3(x: f64, y: f64, z: f64) -> ValueData {
    ValueData::Json(json!({ "x": x, "y": y, "z": z }))
}

const WSTRING_VALUE: &str = "\u{1d57}\u{2b0}\u{2071}\u{2e2}\u{20}\u{2071}\u{2e2}\u{20}\u{1d43}\u{20}\u{1d57}\u{1d49}\u{2e2}\u{1d57}\u{20}\u{1d5b}\u{1d43}\u{2e1}\u{1d58}\u{1d49}";

/// Declares the test types. `reversed` flips the property declaration
/// order of the top-level class, which must not matter in file mode.
fn build_type_system(reversed: bool) -> TypeSystem {
    let mut ts = TypeSystem::new();

    ts.define_primitive(
        "struct Vector3D",
        Primitive::Custom(CustomPrimitive {
            byte_aligned: true,
            default: vector3(0.0, 0.0, 0.0),
            codec: Arc::new(Vector3Codec),
        }),
    )
    .unwrap();

    let vector3d = ts.get_type("struct Vector3D").unwrap().id();
    let json_type = ts.get_type("json").unwrap().id();
    let string_type = ts.get_type("std::string").unwrap().id();

    // The custom primitive opts into the cast families by hand.
    ts.declare_cast(vector3d, json_type, Box::new(|_, data| Ok(data.clone())));
    ts.declare_cast(json_type, vector3d, Box::new(|_, data| Ok(data.clone())));
    ts.declare_cast(
        vector3d,
        string_type,
        Box::new(|_, data| match data {
            ValueData::Json(value) => {
                let mut parts = Vec::new();
                for axis in ["x", "y", "z"] {
                    let component = value
                        .get(axis)
                        .and_then(|v| v.as_f64())
                        .ok_or_else(|| Error::Runtime(format!("missing '{axis}'")))?;
                    parts.push(component.to_string());
                }
                Ok(ValueData::Str(parts.join(" ")))
            }
            _ => Err(Error::Runtime("vector payload must be json".to_string())),
        }),
    );
    ts.declare_cast(
        string_type,
        vector3d,
        Box::new(|_, data| match data {
            ValueData::Str(text) => {
                let components: Vec<f64> = text
                    .split_whitespace()
                    .map(|part| part.parse::<f64>())
                    .collect::<Result<_, _>>()
                    .map_err(|_| Error::Runtime(format!("bad vector text '{text}'")))?;
                if components.len() != 3 {
                    return Err(Error::Runtime(format!("bad vector text '{text}'")));
                }
                Ok(vector3(components[0], components[1], components[2]))
            }
            _ => Err(Error::Runtime("vector text must be a string".to_string())),
        }),
    );

    ts.define_enum(
        "enum NestedObjectKind",
        &[("NONE", 0), ("OBJECT", 1), ("OBJECT_A", 2), ("OBJECT_B", 3)],
    )
    .unwrap();

    ts.define_class(
        ClassBuilder::new("class NestedTestObject")
            .scalar("m_kind", "enum NestedObjectKind")
            .default_value(ValueData::Enum(1)),
    )
    .unwrap();
    ts.define_class(
        ClassBuilder::new("class NestedTestObjectA")
            .base("class NestedTestObject")
            .scalar("extra_value", "int")
            .default_value(ValueData::Signed(10)),
    )
    .unwrap();
    ts.define_class(ClassBuilder::new("class NestedTestObjectB").base("class NestedTestObject"))
        .unwrap();

    let mut class = ClassBuilder::new("class TestObject");
    let declarations: Vec<(&str, &str, &str, usize)> = vec![
        ("scalar", "int4", "bi4", 0),
        ("scalar", "uint4", "bui4", 0),
        ("scalar", "int8", "char", 0),
        ("scalar", "int16", "short", 0),
        ("scalar", "int24", "s24", 0),
        ("scalar", "int32", "int", 0),
        ("scalar", "int64", "long", 0),
        ("scalar", "uint8", "unsigned char", 0),
        ("scalar", "uint16", "unsigned short", 0),
        ("scalar", "uint24", "u24", 0),
        ("scalar", "uint32", "unsigned int", 0),
        ("scalar", "uint64", "unsigned long", 0),
        ("scalar", "string", "std::string", 0),
        ("scalar", "wstring", "std::wstring", 0),
        ("scalar", "float32", "float", 0),
        ("scalar", "float64", "double", 0),
        ("scalar", "vector3d", "struct Vector3D", 0),
        ("pointer", "int_ptr", "int", 0),
        ("array", "int_array", "int", 5),
        ("pointer_array", "int_ptr_array", "int", 5),
        ("scalar", "object", "class NestedTestObjectA", 0),
        ("pointer", "object_ptr", "class NestedTestObject", 0),
        ("pointer", "null_object_ptr", "class NestedTestObject", 0),
        ("vector", "int_vector", "int", 0),
        ("pointer_vector", "int_ptr_vector", "int", 0),
        ("pointer_vector", "object_ptr_vector", "class NestedTestObject", 0),
    ];
    let ordered: Vec<_> = if reversed {
        declarations.into_iter().rev().collect()
    } else {
        declarations
    };
    for (shape, name, type_name, len) in ordered {
        class = match shape {
            "scalar" => class.scalar(name, type_name),
            "pointer" => class.pointer(name, type_name),
            "array" => class.array(name, type_name, len),
            "pointer_array" => class.pointer_array(name, type_name, len),
            "vector" => class.vector(name, type_name),
            "pointer_vector" => class.pointer_vector(name, type_name),
            _ => unreachable!(),
        };
    }
    ts.define_class(class).unwrap();

    ts
}

fn configure_test_object(ts: &TypeSystem) -> PropertyClass {
    let mut object = ts.instantiate("class TestObject").unwrap();

    let scalars: Vec<(&str, ValueData)> = vec![
        ("int4", ValueData::Signed(-6)),
        ("uint4", ValueData::Unsigned(5)),
        ("int8", ValueData::Signed(0x01)),
        ("int16", ValueData::Signed(0x0203)),
        ("int24", ValueData::Signed(0x040506)),
        ("int32", ValueData::Signed(0x0708090A)),
        ("int64", ValueData::Signed(0x0B0C0D0E0F101112)),
        ("uint8", ValueData::Unsigned(0x01)),
        ("uint16", ValueData::Unsigned(0x0203)),
        ("uint24", ValueData::Unsigned(0x040506)),
        ("uint32", ValueData::Unsigned(0x0708090A)),
        ("uint64", ValueData::Unsigned(0x0B0C0D0E0F101112)),
        ("string", ValueData::Str("This is a test value".to_string())),
        ("wstring", ValueData::WStr(WSTRING_VALUE.to_string())),
        ("float32", ValueData::Float(std::f32::consts::PI as f64)),
        ("float64", ValueData::Float(std::f64::consts::PI)),
        ("vector3d", vector3(24.0, 61.0, 3.62f32 as f64)),
        ("int_ptr", ValueData::Signed(52)),
    ];
    for (name, data) in scalars {
        object.property_mut(name).unwrap().set(data).unwrap();
    }

    for i in 0..5 {
        object
            .property_mut("int_array")
            .unwrap()
            .set_at(i, ValueData::Signed(i as i64))
            .unwrap();
        object
            .property_mut("int_ptr_array")
            .unwrap()
            .set_at(i, ValueData::Signed(i as i64))
            .unwrap();
    }

    for i in 0..100 {
        object
            .property_mut("int_vector")
            .unwrap()
            .push(ValueData::Signed(i))
            .unwrap();
        object
            .property_mut("int_ptr_vector")
            .unwrap()
            .push(ValueData::Signed(i))
            .unwrap();
    }

    object
        .property_mut("object")
        .unwrap()
        .object_at_mut(0)
        .unwrap()
        .unwrap()
        .property_mut("extra_value")
        .unwrap()
        .set(ValueData::Signed(20))
        .unwrap();
    object
        .property_mut("object")
        .unwrap()
        .object_at_mut(0)
        .unwrap()
        .unwrap()
        .property_mut("m_kind")
        .unwrap()
        .set(ValueData::Enum(2))
        .unwrap();

    let nested = ts.instantiate("class NestedTestObject").unwrap();
    object
        .property_mut("object_ptr")
        .unwrap()
        .set_object(Some(nested), 0, ts)
        .unwrap();

    let mut a = ts.instantiate("class NestedTestObjectA").unwrap();
    a.property_mut("m_kind").unwrap().set(ValueData::Enum(2)).unwrap();
    let mut b = ts.instantiate("class NestedTestObjectB").unwrap();
    b.property_mut("m_kind").unwrap().set(ValueData::Enum(3)).unwrap();
    object
        .property_mut("object_ptr_vector")
        .unwrap()
        .push_object(a, ts)
        .unwrap();
    object
        .property_mut("object_ptr_vector")
        .unwrap()
        .push_object(b, ts)
        .unwrap();

    object
}

fn save_to_stream(
    ts: &TypeSystem,
    object: &PropertyClass,
    is_file: bool,
    flags: SerializerFlags,
) -> (BitStream, usize) {
    let serializer = BinarySerializer::new(ts, is_file, flags);
    let mut stream = BitStream::new(BitBuffer::with_size(0x40));
    serializer.save(object, &mut stream).unwrap();
    let size = stream.tell().as_bytes();
    stream.seek(BufferPos::default(), false).unwrap();
    (stream, size)
}

fn binary_round_trip(is_file: bool, flags: SerializerFlags) {
    let ts = build_type_system(false);
    let object = configure_test_object(&ts);

    let (mut stream, size) = save_to_stream(&ts, &object, is_file, flags);
    let mut serializer = BinarySerializer::new(&ts, is_file, flags);
    let loaded = serializer.load(&mut stream, size).unwrap().unwrap();

    assert_eq!(loaded, object);
    assert!(loaded
        .property("null_object_ptr")
        .unwrap()
        .get_object(0)
        .unwrap()
        .is_none());
}

#[test]
fn network_round_trip() {
    binary_round_trip(false, SerializerFlags::empty());
}

#[test]
fn file_round_trip() {
    binary_round_trip(true, SerializerFlags::empty());
}

#[test]
fn compressed_round_trip() {
    binary_round_trip(false, SerializerFlags::COMPRESSED);
    binary_round_trip(true, SerializerFlags::COMPRESSED);
}

#[test]
fn compressed_stream_leads_with_the_uncompressed_size() {
    let ts = build_type_system(false);
    let object = configure_test_object(&ts);

    let (_, plain_size) = save_to_stream(&ts, &object, false, SerializerFlags::empty());
    let (compressed, compressed_size) =
        save_to_stream(&ts, &object, false, SerializerFlags::COMPRESSED);

    let data = compressed.buffer().data();
    let header = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    assert_eq!(header, plain_size);

    // The int vectors compress well, so the deflate branch must have won
    // and a zlib header must follow.
    assert!(compressed_size < plain_size);
    assert_eq!(data[4], 0x78);
}

#[test]
fn serializer_flags_header_round_trips() {
    let ts = build_type_system(false);
    let object = configure_test_object(&ts);
    let flags = SerializerFlags::WRITE_SERIALIZER_FLAGS | SerializerFlags::COMPRESSED;

    let (mut stream, size) = save_to_stream(&ts, &object, true, flags);

    // The loader starts from just the header flag and picks up the rest
    // from the stream.
    let mut serializer =
        BinarySerializer::new(&ts, true, SerializerFlags::WRITE_SERIALIZER_FLAGS);
    let loaded = serializer.load(&mut stream, size).unwrap().unwrap();
    assert_eq!(loaded, object);
    assert_eq!(serializer.flags(), flags);
}

#[test]
fn file_mode_recovers_objects_across_property_reordering() {
    let ts = build_type_system(false);
    let reordered = build_type_system(true);
    let object = configure_test_object(&ts);

    let (mut stream, size) = save_to_stream(&ts, &object, true, SerializerFlags::empty());
    let mut serializer = BinarySerializer::new(&reordered, true, SerializerFlags::empty());
    let loaded = serializer.load(&mut stream, size).unwrap().unwrap();

    for name in ["int4", "uint24", "int64", "string", "wstring", "float32"] {
        assert_eq!(
            loaded.property(name).unwrap().value_at(0).unwrap(),
            object.property(name).unwrap().value_at(0).unwrap(),
            "property {name}"
        );
    }

    let int_vector = loaded.property("int_vector").unwrap();
    assert_eq!(int_vector.element_count(), 100);
    assert_eq!(int_vector.value_at(99).unwrap(), &ValueData::Signed(99));

    let nested = loaded.property("object").unwrap().get_object(0).unwrap().unwrap();
    assert_eq!(
        nested.property("extra_value").unwrap().value_at(0).unwrap(),
        &ValueData::Signed(20)
    );

    assert!(loaded
        .property("null_object_ptr")
        .unwrap()
        .get_object(0)
        .unwrap()
        .is_none());

    let polymorphic = loaded.property("object_ptr_vector").unwrap();
    assert_eq!(polymorphic.element_count(), 2);
    let b = polymorphic.get_object(1).unwrap().unwrap();
    assert_eq!(
        b.type_hash(),
        reordered.get_type("class NestedTestObjectB").unwrap().hash()
    );
}

#[test]
fn file_mode_skips_unknown_property_records() {
    // The sender's class carries a property the receiver has never heard
    // of, and the receiver's class carries one the sender never wrote.
    let mut sender = TypeSystem::new();
    sender
        .define_class(
            ClassBuilder::new("class Extras")
                .scalar("kept_int", "int")
                .scalar("dropped", "double")
                .scalar("kept_string", "std::string"),
        )
        .unwrap();

    let mut receiver = TypeSystem::new();
    receiver
        .define_class(
            ClassBuilder::new("class Extras")
                .scalar("kept_string", "std::string")
                .scalar("added", "short")
                .scalar("kept_int", "int"),
        )
        .unwrap();

    let mut donor = sender.instantiate("class Extras").unwrap();
    donor
        .property_mut("kept_int")
        .unwrap()
        .set(ValueData::Signed(7))
        .unwrap();
    donor
        .property_mut("dropped")
        .unwrap()
        .set(ValueData::Float(9.5))
        .unwrap();
    donor
        .property_mut("kept_string")
        .unwrap()
        .set(ValueData::Str("kept".to_string()))
        .unwrap();

    let (mut stream, size) = save_to_stream(&sender, &donor, true, SerializerFlags::empty());
    let mut serializer = BinarySerializer::new(&receiver, true, SerializerFlags::empty());
    let loaded = serializer.load(&mut stream, size).unwrap().unwrap();

    assert_eq!(
        loaded.property("kept_int").unwrap().value_at(0).unwrap(),
        &ValueData::Signed(7)
    );
    assert_eq!(
        loaded.property("kept_string").unwrap().value_at(0).unwrap(),
        &ValueData::Str("kept".to_string())
    );
    // Never written by the sender; stays at its default.
    assert_eq!(
        loaded.property("added").unwrap().value_at(0).unwrap(),
        &ValueData::Signed(0)
    );
}

#[test]
fn public_only_mode_skips_private_properties() {
    let mut ts = TypeSystem::new();
    ts.define_class(
        ClassBuilder::new("class Gated")
            .scalar("open", "int")
            .flags(PropertyFlags::PUBLIC)
            .scalar("hidden", "int"),
    )
    .unwrap();

    let mut object = ts.instantiate("class Gated").unwrap();
    object
        .property_mut("open")
        .unwrap()
        .set(ValueData::Signed(11))
        .unwrap();
    object
        .property_mut("hidden")
        .unwrap()
        .set(ValueData::Signed(22))
        .unwrap();

    let flags = SerializerFlags::WRITE_PUBLIC_ONLY;
    let (mut stream, size) = save_to_stream(&ts, &object, false, flags);
    // Only the hash and one 32-bit int made it out.
    assert_eq!(size, 8);

    let mut serializer = BinarySerializer::new(&ts, false, flags);
    let loaded = serializer.load(&mut stream, size).unwrap().unwrap();
    assert_eq!(
        loaded.property("open").unwrap().value_at(0).unwrap(),
        &ValueData::Signed(11)
    );
    assert_eq!(
        loaded.property("hidden").unwrap().value_at(0).unwrap(),
        &ValueData::Signed(0)
    );
}

#[test]
fn json_round_trip() {
    let ts = build_type_system(false);
    let object = configure_test_object(&ts);

    let serializer = JsonSerializer::new(&ts, false);
    let text = serializer.save(&object).unwrap();
    assert!(text.contains("_pclass_meta"));

    let loaded = serializer.load(&text).unwrap().unwrap();
    assert_eq!(loaded, object);
}

#[test]
fn json_null_pointers_encode_a_null_hash() {
    let ts = build_type_system(false);
    let object = configure_test_object(&ts);

    let text = JsonSerializer::new(&ts, false).save(&object).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        value["null_object_ptr"]["_pclass_meta"]["type_hash"],
        serde_json::Value::Null
    );
}

#[test]
fn xml_round_trip() {
    let ts = build_type_system(false);
    let object = configure_test_object(&ts);

    let serializer = XmlSerializer::new(&ts);
    let text = serializer.save(&object).unwrap();
    assert!(text.starts_with("<Objects><Class Name=\"class TestObject\">"));
    assert!(text.contains("<int_array key=\"0\">0</int_array>"));
    assert!(text.contains("<m_kind>OBJECT</m_kind>"));
    assert!(text.contains("<null_object_ptr>0</null_object_ptr>"));

    let loaded = serializer.load(&text).unwrap().unwrap();
    assert_eq!(loaded, object);
}

#[test]
fn file_containers_dispatch_on_their_magic() {
    let ts = build_type_system(false);
    let object = configure_test_object(&ts);
    let serializer = FileSerializer::new(&ts);

    let binary = serializer
        .save_binary(&object, SerializerFlags::empty())
        .unwrap();
    assert_eq!(&binary[..4], b"BINd");
    assert_eq!(serializer.load(&binary).unwrap().unwrap(), object);

    let compressed = serializer
        .save_binary(&object, SerializerFlags::COMPRESSED)
        .unwrap();
    assert_eq!(&compressed[..4], b"BINd");
    assert!(compressed.len() < binary.len());
    assert_eq!(serializer.load(&compressed).unwrap().unwrap(), object);

    let json = serializer.save_json(&object).unwrap();
    assert_eq!(&json[..4], b"JSON");
    assert_eq!(serializer.load(&json).unwrap().unwrap(), object);

    let xml = serializer.save_xml(&object).unwrap();
    assert!(xml.starts_with(b"<?xml"));
    assert_eq!(serializer.load(&xml).unwrap().unwrap(), object);
}

#[test]
fn polymorphic_pointer_assignment_enforces_inheritance() {
    let ts = build_type_system(false);
    let mut object = ts.instantiate("class TestObject").unwrap();

    // A TestObject is not a NestedTestObject.
    let stranger = ts.instantiate("class TestObject").unwrap();
    assert!(object
        .property_mut("object_ptr")
        .unwrap()
        .set_object(Some(stranger), 0, &ts)
        .is_err());

    let a = ts.instantiate("class NestedTestObjectA").unwrap();
    assert!(object
        .property_mut("object_ptr")
        .unwrap()
        .set_object(Some(a), 0, &ts)
        .is_ok());

    // The by-value property requires the exact class.
    let b = ts.instantiate("class NestedTestObjectB").unwrap();
    assert!(object
        .property_mut("object")
        .unwrap()
        .set_object(Some(b), 0, &ts)
        .is_err());
}

#[test]
fn dynamic_operations_reject_static_properties() {
    let ts = build_type_system(false);
    let mut object = ts.instantiate("class TestObject").unwrap();

    assert!(object
        .property_mut("int_array")
        .unwrap()
        .set_element_count(9, &ts)
        .is_err());
    assert!(object
        .property_mut("int_vector")
        .unwrap()
        .set_element_count(9, &ts)
        .is_ok());
}

#[test]
fn property_identities_follow_the_declared_hashes() {
    let ts = build_type_system(false);
    let object = ts.instantiate("class TestObject").unwrap();

    let int_type = ts.get_type("int").unwrap();
    let property = object.property("int32").unwrap();
    assert_eq!(property.name_hash(), ts.hasher().property_hash("int32"));
    assert_eq!(
        property.full_hash(),
        ts.hasher()
            .property_hash("int32")
            .wrapping_add(int_type.hash())
    );

    // Declaration order is the iteration order.
    let names: Vec<&str> = object.properties().iter().map(|p| p.name()).collect();
    assert_eq!(&names[..3], &["int4", "uint4", "int8"]);
    assert_eq!(
        object.properties().get_by_full_hash(property.full_hash()).map(|p| p.name()),
        Some("int32")
    );
}
