//! Run-time type registration and lookup.
//!
//! A [`TypeSystem`] owns every [`Type`] it defines and hands out integer
//! [`TypeId`] handles. Class types carry their property layout as data,
//! so instantiating a class is a table walk rather than a constructor
//! call, and every instance of a class gets the same properties in the
//! same order by construction.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use glyph_bits::BitIo;

use crate::hash::{DefaultHashCalculator, HashCalculator};
use crate::property::{Property, PropertyFlags, PropertyList, Shape};
use crate::property_class::PropertyClass;
use crate::value::{Value, ValueData};
use crate::Error;

/// Handle to a type registered in a [`TypeSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(usize);

/// Wire-level shape of a primitive type.
#[derive(Clone)]
pub enum Primitive {
    Bool,
    Signed { bits: u8 },
    Unsigned { bits: u8 },
    Float { bits: u8 },
    Str,
    WStr,
    /// Cast-registry member only; not serializable by the wire codecs.
    Json,
    Custom(CustomPrimitive),
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Bool => write!(f, "Bool"),
            Primitive::Signed { bits } => write!(f, "Signed({bits})"),
            Primitive::Unsigned { bits } => write!(f, "Unsigned({bits})"),
            Primitive::Float { bits } => write!(f, "Float({bits})"),
            Primitive::Str => write!(f, "Str"),
            Primitive::WStr => write!(f, "WStr"),
            Primitive::Json => write!(f, "Json"),
            Primitive::Custom(c) => write!(f, "Custom(byte_aligned={})", c.byte_aligned),
        }
    }
}

/// Bit-level reader/writer pair for a user-defined primitive.
pub trait CustomCodec: Send + Sync {
    fn write(&self, stream: &mut dyn BitIo, data: &ValueData, is_file: bool) -> Result<(), Error>;
    fn read(&self, stream: &mut dyn BitIo, is_file: bool) -> Result<ValueData, Error>;
}

/// A user-defined primitive: its codec, its default payload, and whether
/// elements of it must start on a byte boundary.
#[derive(Clone)]
pub struct CustomPrimitive {
    pub byte_aligned: bool,
    pub default: ValueData,
    pub codec: Arc<dyn CustomCodec>,
}

/// Bidirectional name/value table of an enum type.
#[derive(Debug, Default, Clone)]
pub struct EnumDef {
    elements: Vec<(String, u32)>,
    by_name: HashMap<String, u32>,
    by_value: HashMap<u32, usize>,
}

impl EnumDef {
    pub fn elements(&self) -> impl Iterator<Item = (&str, u32)> {
        self.elements.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn has_value(&self, value: u32) -> bool {
        self.by_value.contains_key(&value)
    }

    pub fn name_of(&self, value: u32) -> Option<&str> {
        self.by_value
            .get(&value)
            .map(|&i| self.elements[i].0.as_str())
    }

    pub fn value_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    fn add(&mut self, name: &str, value: u32) -> Result<(), Error> {
        if self.by_name.contains_key(name) {
            return Err(Error::runtime(format!(
                "enum already has an element called '{name}'"
            )));
        }
        if self.by_value.contains_key(&value) {
            return Err(Error::runtime(format!(
                "enum already has an element with the value {value}"
            )));
        }
        self.by_name.insert(name.to_string(), value);
        self.by_value.insert(value, self.elements.len());
        self.elements.push((name.to_string(), value));
        Ok(())
    }
}

/// Resolved property declaration inside a [`ClassDef`].
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub name: String,
    pub type_id: TypeId,
    pub shape: Shape,
    pub pointer: bool,
    pub flags: PropertyFlags,
    pub default: Option<ValueData>,
}

/// Property layout of a class type. Base-class properties come first at
/// instantiation, in base declaration order.
#[derive(Debug, Clone)]
pub struct ClassDef {
    base: Option<TypeId>,
    specs: Vec<PropertySpec>,
}

impl ClassDef {
    pub fn base(&self) -> Option<TypeId> {
        self.base
    }

    pub fn specs(&self) -> &[PropertySpec] {
        &self.specs
    }
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Primitive(Primitive),
    Enum(EnumDef),
    Class(ClassDef),
}

/// Immutable descriptor of a registered type.
#[derive(Debug, Clone)]
pub struct Type {
    id: TypeId,
    name: String,
    hash: u32,
    kind: TypeKind,
}

impl Type {
    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, TypeKind::Class(_))
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.kind, TypeKind::Enum(_))
    }

    pub fn class_def(&self) -> Option<&ClassDef> {
        match &self.kind {
            TypeKind::Class(def) => Some(def),
            _ => None,
        }
    }

    pub fn enum_def(&self) -> Option<&EnumDef> {
        match &self.kind {
            TypeKind::Enum(def) => Some(def),
            _ => None,
        }
    }

    /// Whether elements of this type must start on a byte boundary.
    pub fn is_byte_aligned(&self) -> bool {
        matches!(
            &self.kind,
            TypeKind::Primitive(Primitive::Custom(c)) if c.byte_aligned
        )
    }
}

/// Unresolved property declaration collected by [`ClassBuilder`].
#[derive(Debug, Clone)]
struct RawSpec {
    name: String,
    type_name: String,
    shape: Shape,
    pointer: bool,
    flags: PropertyFlags,
    default: Option<ValueData>,
}

/// Declarative description of a class type, fed to
/// [`TypeSystem::define_class`].
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    name: String,
    base: Option<String>,
    specs: Vec<RawSpec>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            specs: Vec::new(),
        }
    }

    pub fn base(mut self, name: impl Into<String>) -> Self {
        self.base = Some(name.into());
        self
    }

    fn push(mut self, name: &str, type_name: &str, shape: Shape, pointer: bool) -> Self {
        self.specs.push(RawSpec {
            name: name.to_string(),
            type_name: type_name.to_string(),
            shape,
            pointer,
            flags: PropertyFlags::empty(),
            default: None,
        });
        self
    }

    pub fn scalar(self, name: &str, type_name: &str) -> Self {
        self.push(name, type_name, Shape::Scalar, false)
    }

    pub fn pointer(self, name: &str, type_name: &str) -> Self {
        self.push(name, type_name, Shape::Scalar, true)
    }

    pub fn array(self, name: &str, type_name: &str, len: usize) -> Self {
        self.push(name, type_name, Shape::Array(len), false)
    }

    pub fn pointer_array(self, name: &str, type_name: &str, len: usize) -> Self {
        self.push(name, type_name, Shape::Array(len), true)
    }

    pub fn vector(self, name: &str, type_name: &str) -> Self {
        self.push(name, type_name, Shape::Vector, false)
    }

    pub fn pointer_vector(self, name: &str, type_name: &str) -> Self {
        self.push(name, type_name, Shape::Vector, true)
    }

    /// Sets the flags of the most recently added property.
    pub fn flags(mut self, flags: PropertyFlags) -> Self {
        if let Some(last) = self.specs.last_mut() {
            last.flags = flags;
        }
        self
    }

    /// Sets the default payload of the most recently added property.
    pub fn default_value(mut self, default: ValueData) -> Self {
        if let Some(last) = self.specs.last_mut() {
            last.default = Some(default);
        }
        self
    }
}

/// Signature of a registered cast.
pub type CastFn = Box<dyn Fn(&TypeSystem, &ValueData) -> Result<ValueData, Error> + Send + Sync>;

/// The name of the implicit root class every class defaults its base to.
pub const ROOT_CLASS: &str = "class PropertyClass";

/// Registry of types, plus the cast table between them.
///
/// Read-only once setup is complete; serializers and sessions borrow it
/// shared.
pub struct TypeSystem {
    hasher: Box<dyn HashCalculator + Send + Sync>,
    types: Vec<Type>,
    by_name: HashMap<String, TypeId>,
    by_hash: HashMap<u32, TypeId>,
    casts: HashMap<(TypeId, TypeId), CastFn>,
}

impl Default for TypeSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeSystem {
    /// An empty registry with a custom hasher. No standard types are
    /// defined.
    pub fn bare(hasher: Box<dyn HashCalculator + Send + Sync>) -> Self {
        Self {
            hasher,
            types: Vec::new(),
            by_name: HashMap::new(),
            by_hash: HashMap::new(),
            casts: HashMap::new(),
        }
    }

    /// A registry pre-populated with the standard primitive set, the bit
    /// integers, the string types, the JSON cast family, and the root
    /// class.
    pub fn new() -> Self {
        let mut ts = Self::bare(Box::new(DefaultHashCalculator));
        ts.define_standard_types()
            .expect("standard type set must be definable in an empty registry");
        ts
    }

    fn define_standard_types(&mut self) -> Result<(), Error> {
        self.define_primitive("bool", Primitive::Bool)?;
        self.define_primitive("char", Primitive::Signed { bits: 8 })?;
        self.define_primitive("unsigned char", Primitive::Unsigned { bits: 8 })?;
        self.define_primitive("short", Primitive::Signed { bits: 16 })?;
        self.define_primitive("unsigned short", Primitive::Unsigned { bits: 16 })?;
        self.define_primitive("int", Primitive::Signed { bits: 32 })?;
        self.define_primitive("unsigned int", Primitive::Unsigned { bits: 32 })?;
        self.define_primitive("long", Primitive::Signed { bits: 64 })?;
        self.define_primitive("unsigned long", Primitive::Unsigned { bits: 64 })?;
        self.define_primitive("gid", Primitive::Unsigned { bits: 64 })?;

        for bits in 1..=7 {
            self.define_primitive(&format!("bi{bits}"), Primitive::Signed { bits })?;
            self.define_primitive(&format!("bui{bits}"), Primitive::Unsigned { bits })?;
        }
        self.define_primitive("s24", Primitive::Signed { bits: 24 })?;
        self.define_primitive("u24", Primitive::Unsigned { bits: 24 })?;

        self.define_primitive("float", Primitive::Float { bits: 32 })?;
        self.define_primitive("double", Primitive::Float { bits: 64 })?;
        self.define_primitive("std::string", Primitive::Str)?;
        self.define_primitive("std::wstring", Primitive::WStr)?;
        self.define_primitive("json", Primitive::Json)?;

        self.define_class(ClassBuilder::new(ROOT_CLASS))?;
        Ok(())
    }

    pub fn hasher(&self) -> &(dyn HashCalculator + Send + Sync) {
        self.hasher.as_ref()
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// The descriptor behind a handle minted by this system.
    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0]
    }

    pub fn get_type(&self, name: &str) -> Result<&Type, Error> {
        self.by_name
            .get(name)
            .map(|&id| self.get(id))
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    pub fn get_type_by_hash(&self, hash: u32) -> Result<&Type, Error> {
        self.by_hash
            .get(&hash)
            .map(|&id| self.get(id))
            .ok_or(Error::UnknownTypeHash(hash))
    }

    fn register(&mut self, name: &str, kind: TypeKind) -> Result<TypeId, Error> {
        if self.by_name.contains_key(name) {
            return Err(Error::DuplicateType(name.to_string()));
        }

        let hash = self.hasher.type_hash(name);
        if let Some(&other) = self.by_hash.get(&hash) {
            return Err(Error::TypeHashCollision(
                self.get(other).name.clone(),
                name.to_string(),
                hash,
            ));
        }

        let id = TypeId(self.types.len());
        self.types.push(Type {
            id,
            name: name.to_string(),
            hash,
            kind,
        });
        self.by_name.insert(name.to_string(), id);
        self.by_hash.insert(hash, id);
        Ok(id)
    }

    /// Defines a primitive and declares the default casters between it
    /// and every previously defined member of the cast families.
    pub fn define_primitive(&mut self, name: &str, primitive: Primitive) -> Result<TypeId, Error> {
        let custom = matches!(primitive, Primitive::Custom(_));
        let id = self.register(name, TypeKind::Primitive(primitive))?;
        if !custom {
            self.declare_family_casts(id);
        }
        Ok(id)
    }

    /// Defines an enum from a name/value table.
    pub fn define_enum(&mut self, name: &str, elements: &[(&str, u32)]) -> Result<TypeId, Error> {
        let mut def = EnumDef::default();
        for &(element, value) in elements {
            def.add(element, value)?;
        }
        let id = self.register(name, TypeKind::Enum(def))?;
        self.declare_family_casts(id);
        Ok(id)
    }

    /// Defines a class from its builder, resolving the base class and
    /// every property type. A class without an explicit base gets
    /// [`ROOT_CLASS`] if it has been defined.
    pub fn define_class(&mut self, builder: ClassBuilder) -> Result<TypeId, Error> {
        let base = match &builder.base {
            Some(name) => Some(self.get_type(name)?.id()),
            None if builder.name != ROOT_CLASS && self.has_type(ROOT_CLASS) => {
                Some(self.get_type(ROOT_CLASS)?.id())
            }
            None => None,
        };

        if let Some(base) = base {
            if !self.get(base).is_class() {
                return Err(Error::runtime(format!(
                    "base of '{}' must be a class type",
                    builder.name
                )));
            }
        }

        let mut specs = Vec::with_capacity(builder.specs.len());
        for raw in &builder.specs {
            let ty = self.get_type(&raw.type_name)?;
            specs.push(PropertySpec {
                name: raw.name.clone(),
                type_id: ty.id(),
                shape: raw.shape,
                pointer: raw.pointer,
                flags: raw.flags,
                default: raw.default.clone(),
            });
        }

        self.register(&builder.name, TypeKind::Class(ClassDef { base, specs }))
    }

    /// Whether `child` is `ancestor` or a descendant of it.
    pub fn inherits(&self, child: TypeId, ancestor: TypeId) -> bool {
        let mut cursor = Some(child);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.get(id).class_def().and_then(ClassDef::base);
        }
        false
    }

    /// Constructs a fresh instance of a class type by name.
    pub fn instantiate(&self, name: &str) -> Result<PropertyClass, Error> {
        let id = self.get_type(name)?.id();
        self.instantiate_id(id)
    }

    /// Constructs a fresh instance of a class type.
    pub fn instantiate_id(&self, id: TypeId) -> Result<PropertyClass, Error> {
        let ty = self.get(id);
        let def = ty
            .class_def()
            .ok_or_else(|| Error::runtime(format!("type '{}' is not a class", ty.name())))?;

        // Base chain, root first.
        let mut chain = vec![def];
        let mut cursor = def.base;
        while let Some(base_id) = cursor {
            let base_def = self
                .get(base_id)
                .class_def()
                .ok_or_else(|| Error::runtime("base of a class must be a class".to_string()))?;
            chain.push(base_def);
            cursor = base_def.base;
        }
        chain.reverse();

        let mut properties = PropertyList::default();
        for class_def in chain {
            for spec in &class_def.specs {
                let property = self.build_property(spec)?;
                properties.add(property)?;
            }
        }

        Ok(PropertyClass::new(id, ty.hash(), properties))
    }

    fn build_property(&self, spec: &PropertySpec) -> Result<Property, Error> {
        let name_hash = self.hasher.property_hash(&spec.name);
        let full_hash = name_hash.wrapping_add(self.get(spec.type_id).hash());

        let count = match spec.shape {
            Shape::Scalar => 1,
            Shape::Array(len) => len,
            Shape::Vector => 0,
        };
        let mut property = Property::new(
            spec.name.clone(),
            name_hash,
            full_hash,
            spec.type_id,
            spec.shape,
            spec.pointer,
            spec.flags,
        );
        for _ in 0..count {
            let element = self.default_element(spec)?;
            property.push_element(element);
        }
        Ok(property)
    }

    fn default_element(&self, spec: &PropertySpec) -> Result<crate::property::Element, Error> {
        self.default_element_parts(spec.type_id, spec.pointer, spec.default.as_ref())
    }

    /// The default element for a property of `type_id`: a null pointer,
    /// a freshly instantiated nested object, or a zero payload.
    pub(crate) fn default_element_parts(
        &self,
        type_id: TypeId,
        pointer: bool,
        default: Option<&ValueData>,
    ) -> Result<crate::property::Element, Error> {
        use crate::property::Element;

        if self.get(type_id).is_class() {
            if pointer {
                return Ok(Element::Null);
            }
            return Ok(Element::Object(Box::new(self.instantiate_id(type_id)?)));
        }
        let data = match default {
            Some(data) => data.clone(),
            None => self.default_data(type_id)?,
        };
        Ok(Element::Value(data))
    }

    /// The zero payload for a primitive or enum type.
    pub fn default_data(&self, id: TypeId) -> Result<ValueData, Error> {
        let ty = self.get(id);
        match &ty.kind {
            TypeKind::Primitive(Primitive::Bool) => Ok(ValueData::Bool(false)),
            TypeKind::Primitive(Primitive::Signed { .. }) => Ok(ValueData::Signed(0)),
            TypeKind::Primitive(Primitive::Unsigned { .. }) => Ok(ValueData::Unsigned(0)),
            TypeKind::Primitive(Primitive::Float { .. }) => Ok(ValueData::Float(0.0)),
            TypeKind::Primitive(Primitive::Str) => Ok(ValueData::Str(String::new())),
            TypeKind::Primitive(Primitive::WStr) => Ok(ValueData::WStr(String::new())),
            TypeKind::Primitive(Primitive::Json) => Ok(ValueData::Json(serde_json::Value::Null)),
            TypeKind::Primitive(Primitive::Custom(c)) => Ok(c.default.clone()),
            TypeKind::Enum(_) => Ok(ValueData::Enum(0)),
            TypeKind::Class(_) => Err(Error::runtime(format!(
                "type '{}' has no primitive default",
                ty.name()
            ))),
        }
    }

    /// Declares a cast between two registered types.
    pub fn declare_cast(&mut self, src: TypeId, dst: TypeId, cast: CastFn) {
        self.casts.insert((src, dst), cast);
    }

    fn declare_family_casts(&mut self, new_id: TypeId) {
        let peers: Vec<TypeId> = self
            .types
            .iter()
            .filter(|t| {
                t.id() != new_id
                    && matches!(
                        t.kind,
                        TypeKind::Enum(_)
                            | TypeKind::Primitive(
                                Primitive::Bool
                                    | Primitive::Signed { .. }
                                    | Primitive::Unsigned { .. }
                                    | Primitive::Float { .. }
                                    | Primitive::Str
                                    | Primitive::WStr
                                    | Primitive::Json,
                            )
                    )
            })
            .map(Type::id)
            .collect();

        for peer in peers {
            self.declare_cast(
                peer,
                new_id,
                Box::new(move |ts, data| convert(ts, peer, new_id, data)),
            );
            self.declare_cast(
                new_id,
                peer,
                Box::new(move |ts, data| convert(ts, new_id, peer, data)),
            );
        }
    }

    /// Casts a value to `dst` through the registry. A value already of
    /// type `dst` is returned as a copy.
    pub fn cast_value(&self, value: &Value, dst: TypeId) -> Result<Value, Error> {
        if value.is(dst) {
            return Ok(value.clone());
        }
        let cast = self.casts.get(&(value.type_id(), dst)).ok_or_else(|| Error::Cast {
            from: self.get(value.type_id()).name().to_string(),
            to: self.get(dst).name().to_string(),
        })?;
        Ok(Value::new(dst, cast(self, value.data())?))
    }
}

/// The default conversion used for every auto-declared family cast.
fn convert(ts: &TypeSystem, src: TypeId, dst: TypeId, data: &ValueData) -> Result<ValueData, Error> {
    let cast_error = || Error::Cast {
        from: ts.get(src).name().to_string(),
        to: ts.get(dst).name().to_string(),
    };

    // Render the source as a string first when the destination wants one;
    // enums render as their element name.
    let to_text = |data: &ValueData| -> Result<String, Error> {
        match data {
            ValueData::Bool(v) => Ok(if *v { "1".into() } else { "0".into() }),
            ValueData::Signed(v) => Ok(v.to_string()),
            ValueData::Unsigned(v) => Ok(v.to_string()),
            ValueData::Float(v) => Ok(v.to_string()),
            ValueData::Str(v) | ValueData::WStr(v) => Ok(v.clone()),
            ValueData::Enum(v) => ts
                .get(src)
                .enum_def()
                .and_then(|def| def.name_of(*v))
                .map(str::to_string)
                .ok_or_else(cast_error),
            ValueData::Json(v) => match v {
                serde_json::Value::String(s) => Ok(s.clone()),
                other => Ok(other.to_string()),
            },
        }
    };

    let as_i64 = |data: &ValueData| -> Result<i64, Error> {
        match data {
            ValueData::Bool(v) => Ok(*v as i64),
            ValueData::Signed(v) => Ok(*v),
            ValueData::Unsigned(v) => Ok(*v as i64),
            ValueData::Float(v) => Ok(*v as i64),
            ValueData::Enum(v) => Ok(*v as i64),
            ValueData::Str(v) | ValueData::WStr(v) => v.parse().map_err(|_| cast_error()),
            ValueData::Json(v) => v.as_i64().ok_or_else(cast_error),
        }
    };

    let as_u64 = |data: &ValueData| -> Result<u64, Error> {
        match data {
            ValueData::Bool(v) => Ok(*v as u64),
            ValueData::Signed(v) => Ok(*v as u64),
            ValueData::Unsigned(v) => Ok(*v),
            ValueData::Float(v) => Ok(*v as u64),
            ValueData::Enum(v) => Ok(*v as u64),
            ValueData::Str(v) | ValueData::WStr(v) => v.parse().map_err(|_| cast_error()),
            ValueData::Json(v) => v.as_u64().ok_or_else(cast_error),
        }
    };

    let as_f64 = |data: &ValueData| -> Result<f64, Error> {
        match data {
            ValueData::Bool(v) => Ok(*v as u8 as f64),
            ValueData::Signed(v) => Ok(*v as f64),
            ValueData::Unsigned(v) => Ok(*v as f64),
            ValueData::Float(v) => Ok(*v),
            ValueData::Enum(v) => Ok(*v as f64),
            ValueData::Str(v) | ValueData::WStr(v) => v.parse().map_err(|_| cast_error()),
            ValueData::Json(v) => v.as_f64().ok_or_else(cast_error),
        }
    };

    match ts.get(dst).kind() {
        TypeKind::Primitive(Primitive::Bool) => Ok(ValueData::Bool(match data {
            ValueData::Str(v) | ValueData::WStr(v) => v == "1" || v == "true",
            ValueData::Json(v) => v.as_bool().ok_or_else(cast_error)?,
            other => as_i64(other)? != 0,
        })),
        TypeKind::Primitive(Primitive::Signed { .. }) => Ok(ValueData::Signed(as_i64(data)?)),
        TypeKind::Primitive(Primitive::Unsigned { .. }) => Ok(ValueData::Unsigned(as_u64(data)?)),
        TypeKind::Primitive(Primitive::Float { bits }) => {
            let value = as_f64(data)?;
            // Narrow to the destination precision so later equality and
            // formatting behave like a real f32.
            let value = if *bits == 32 { value as f32 as f64 } else { value };
            Ok(ValueData::Float(value))
        }
        TypeKind::Primitive(Primitive::Str) => Ok(ValueData::Str(to_text(data)?)),
        TypeKind::Primitive(Primitive::WStr) => Ok(ValueData::WStr(to_text(data)?)),
        TypeKind::Primitive(Primitive::Json) => Ok(ValueData::Json(match data {
            ValueData::Bool(v) => serde_json::Value::from(*v),
            ValueData::Signed(v) => serde_json::Value::from(*v),
            ValueData::Unsigned(v) => serde_json::Value::from(*v),
            ValueData::Float(v) => serde_json::Value::from(*v),
            ValueData::Str(v) | ValueData::WStr(v) => serde_json::Value::from(v.clone()),
            ValueData::Enum(v) => serde_json::Value::from(*v),
            ValueData::Json(v) => v.clone(),
        })),
        TypeKind::Enum(def) => {
            let value = match data {
                ValueData::Str(v) | ValueData::WStr(v) => {
                    def.value_of(v).ok_or_else(cast_error)?
                }
                other => u32::try_from(as_u64(other)?).map_err(|_| cast_error())?,
            };
            if value != 0 && !def.has_value(value) {
                return Err(cast_error());
            }
            Ok(ValueData::Enum(value))
        }
        TypeKind::Primitive(Primitive::Custom(_)) | TypeKind::Class(_) => Err(cast_error()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_resolve_by_name_and_hash() {
        let mut ts = TypeSystem::new();
        let id = ts
            .define_class(ClassBuilder::new("class TestClassTypeA"))
            .unwrap();

        let hash = ts.hasher().type_hash("class TestClassTypeA");
        assert_eq!(ts.get_type("class TestClassTypeA").unwrap().id(), id);
        assert_eq!(ts.get_type_by_hash(hash).unwrap().id(), id);
        assert_eq!(ts.get(id).hash(), hash);
    }

    #[test]
    fn missing_types_are_errors() {
        let ts = TypeSystem::new();
        assert!(matches!(
            ts.get_type("struct MadeUp"),
            Err(Error::UnknownType(_))
        ));
        assert!(matches!(
            ts.get_type_by_hash(0x0DEADA55),
            Err(Error::UnknownTypeHash(_))
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut ts = TypeSystem::new();
        ts.define_class(ClassBuilder::new("class TestClassTypeA"))
            .unwrap();
        assert!(matches!(
            ts.define_class(ClassBuilder::new("class TestClassTypeA")),
            Err(Error::DuplicateType(_))
        ));
    }

    #[test]
    fn colliding_type_hashes_are_fatal() {
        // "a" and "a " hash identically; the space contributes zero.
        let mut ts = TypeSystem::new();
        ts.define_class(ClassBuilder::new("a")).unwrap();
        assert!(matches!(
            ts.define_class(ClassBuilder::new("a ")),
            Err(Error::TypeHashCollision(..))
        ));
    }

    #[test]
    fn non_class_bases_are_rejected() {
        let mut ts = TypeSystem::new();
        assert!(ts
            .define_class(ClassBuilder::new("class TestClassTypeA").base("int"))
            .is_err());
    }

    #[test]
    fn inheritance_walks_the_base_chain() {
        let mut ts = TypeSystem::new();
        let a = ts
            .define_class(ClassBuilder::new("class TestClassTypeA"))
            .unwrap();
        let b = ts
            .define_class(ClassBuilder::new("class TestClassTypeB").base("class TestClassTypeA"))
            .unwrap();

        assert!(ts.inherits(b, a));
        assert!(ts.inherits(b, b));
        assert!(!ts.inherits(a, b));

        let root = ts.get_type(ROOT_CLASS).unwrap().id();
        assert!(ts.inherits(a, root));
    }

    #[test]
    fn numeric_casts_go_through_the_registry() {
        let ts = TypeSystem::new();
        let int = ts.get_type("int").unwrap().id();
        let string = ts.get_type("std::string").unwrap().id();

        let value = Value::new(int, ValueData::Signed(-42));
        let casted = ts.cast_value(&value, string).unwrap();
        assert_eq!(casted.data(), &ValueData::Str("-42".to_string()));

        let back = ts.cast_value(&casted, int).unwrap();
        assert_eq!(back.data(), &ValueData::Signed(-42));
    }

    #[test]
    fn unknown_casts_fail_with_both_names() {
        let mut ts = TypeSystem::new();
        let class = ts
            .define_class(ClassBuilder::new("class TestClassTypeA"))
            .unwrap();
        let int = ts.get_type("int").unwrap().id();

        let value = Value::new(int, ValueData::Signed(1));
        match ts.cast_value(&value, class) {
            Err(Error::Cast { from, to }) => {
                assert_eq!(from, "int");
                assert_eq!(to, "class TestClassTypeA");
            }
            other => panic!("expected cast error, got {other:?}"),
        }
    }

    #[test]
    fn enum_casts_use_names_for_strings_and_values_for_numbers() {
        let mut ts = TypeSystem::new();
        let kind = ts
            .define_enum(
                "enum NestedObjectKind",
                &[("NONE", 0), ("OBJECT", 1), ("OBJECT_A", 2)],
            )
            .unwrap();
        let string = ts.get_type("std::string").unwrap().id();
        let uint = ts.get_type("unsigned int").unwrap().id();

        let value = Value::new(kind, ValueData::Enum(2));
        let name = ts.cast_value(&value, string).unwrap();
        assert_eq!(name.data(), &ValueData::Str("OBJECT_A".to_string()));

        let back = ts.cast_value(&name, kind).unwrap();
        assert_eq!(back.data(), &ValueData::Enum(2));

        let number = Value::new(uint, ValueData::Unsigned(7));
        assert!(ts.cast_value(&number, kind).is_err());
        let zero = Value::new(uint, ValueData::Unsigned(0));
        assert_eq!(
            ts.cast_value(&zero, kind).unwrap().data(),
            &ValueData::Enum(0)
        );
    }
}
