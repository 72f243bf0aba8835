//! The object-property system: run-time reflective classes and the
//! serializers that move them on and off the wire.
//!
//! Types are registered into a [`TypeSystem`] at startup; class types
//! describe their properties once, and every instantiated
//! [`PropertyClass`] carries those properties with live values. The
//! binary serializer walks that reflection surface to produce either the
//! compact positional network encoding or the self-describing file
//! encoding, and the JSON/XML serializers reuse the same surface for
//! text formats.

pub mod codec;
pub mod hash;
pub mod property;
pub mod property_class;
pub mod serde;
pub mod types;
pub mod value;

mod error;

pub use error::Error;
pub use hash::{djb2, string_id, DefaultHashCalculator, HashCalculator};
pub use property::{Property, PropertyFlags, PropertyList, Shape};
pub use property_class::PropertyClass;
pub use serde::binary::{BinarySerializer, SerializerFlags};
pub use serde::file::FileSerializer;
pub use serde::json::JsonSerializer;
pub use serde::xml::XmlSerializer;
pub use types::{
    ClassBuilder, ClassDef, CustomCodec, CustomPrimitive, EnumDef, Primitive, Type, TypeId,
    TypeKind, TypeSystem,
};
pub use value::{Value, ValueData};
