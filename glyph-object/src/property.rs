//! Reflective properties and the ordered list a class instance carries.

use bitflags::bitflags;
use glyph_bits::BitIo;
use std::collections::HashMap;

use crate::codec;
use crate::property_class::PropertyClass;
use crate::types::{TypeId, TypeSystem};
use crate::value::{Value, ValueData};
use crate::Error;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PropertyFlags: u32 {
        /// Written even when the serializer is in public-only mode.
        const PUBLIC = 1 << 0;
        /// Elements must start on a byte boundary regardless of type.
        const BYTE_ALIGNED = 1 << 1;
    }
}

/// Storage shape of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    Array(usize),
    Vector,
}

/// One element of a property: either a primitive/enum payload, a nested
/// object, or a null class pointer.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Value(ValueData),
    Object(Box<PropertyClass>),
    Null,
}

/// A property bound to a class instance: identity, shape, and live
/// elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    name: String,
    name_hash: u32,
    full_hash: u32,
    type_id: TypeId,
    shape: Shape,
    pointer: bool,
    flags: PropertyFlags,
    elements: Vec<Element>,
}

impl Property {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        name_hash: u32,
        full_hash: u32,
        type_id: TypeId,
        shape: Shape,
        pointer: bool,
        flags: PropertyFlags,
    ) -> Self {
        Self {
            name,
            name_hash,
            full_hash,
            type_id,
            shape,
            pointer,
            flags,
            elements: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_hash(&self) -> u32 {
        self.name_hash
    }

    /// The file-mode property key: name hash plus type hash, mod 2^32.
    pub fn full_hash(&self) -> u32 {
        self.full_hash
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    pub fn is_pointer(&self) -> bool {
        self.pointer
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.shape, Shape::Vector)
    }

    /// Whether the property holds a sequence (fixed or dynamic).
    pub fn is_array(&self) -> bool {
        !matches!(self.shape, Shape::Scalar)
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub(crate) fn push_element(&mut self, element: Element) {
        self.elements.push(element);
    }

    pub(crate) fn element(&self, index: usize) -> Result<&Element, Error> {
        self.elements.get(index).ok_or_else(|| {
            Error::runtime(format!(
                "property '{}' index out of range (index={index}, count={})",
                self.name,
                self.elements.len()
            ))
        })
    }

    pub(crate) fn element_mut(&mut self, index: usize) -> Result<&mut Element, Error> {
        if index >= self.elements.len() {
            return Err(Error::runtime(format!(
                "property '{}' index out of range (index={index}, count={})",
                self.name,
                self.elements.len()
            )));
        }
        Ok(&mut self.elements[index])
    }

    /// Resizes a dynamic vector, filling new slots with defaults.
    pub fn set_element_count(&mut self, count: usize, ts: &TypeSystem) -> Result<(), Error> {
        if !self.is_dynamic() {
            return Err(Error::runtime(format!(
                "called set_element_count() on static property '{}'",
                self.name
            )));
        }
        while self.elements.len() > count {
            self.elements.pop();
        }
        while self.elements.len() < count {
            let element = ts.default_element_parts(self.type_id, self.pointer, None)?;
            self.elements.push(element);
        }
        Ok(())
    }

    /// The payload of element `index` as a typed [`Value`].
    pub fn get_value(&self, index: usize) -> Result<Value, Error> {
        match self.element(index)? {
            Element::Value(data) => Ok(Value::new(self.type_id, data.clone())),
            _ => Err(Error::runtime(format!(
                "property '{}' holds objects; use get_object()",
                self.name
            ))),
        }
    }

    /// Stores `value` into element `index`, casting through the registry
    /// when the incoming type differs from the property type.
    pub fn set_value(&mut self, value: Value, index: usize, ts: &TypeSystem) -> Result<(), Error> {
        let value = ts.cast_value(&value, self.type_id)?;
        let slot = self.element_mut(index)?;
        match slot {
            Element::Value(_) => {
                *slot = Element::Value(value.into_data());
                Ok(())
            }
            _ => Err(Error::runtime(format!(
                "property '{}' holds objects; use set_object()",
                self.name
            ))),
        }
    }

    /// The nested object at `index`, or `None` for a null pointer.
    pub fn get_object(&self, index: usize) -> Result<Option<&PropertyClass>, Error> {
        match self.element(index)? {
            Element::Object(object) => Ok(Some(object)),
            Element::Null => Ok(None),
            Element::Value(_) => Err(Error::runtime(format!(
                "property '{}' does not store an object",
                self.name
            ))),
        }
    }

    /// Stores an object into element `index`.
    ///
    /// A pointer property accepts the property type or any descendant,
    /// and accepts `None`; a value property requires the exact type and
    /// rejects `None`.
    pub fn set_object(
        &mut self,
        object: Option<PropertyClass>,
        index: usize,
        ts: &TypeSystem,
    ) -> Result<(), Error> {
        if !ts.get(self.type_id).is_class() {
            return Err(Error::runtime(format!(
                "property '{}' does not store an object",
                self.name
            )));
        }

        let element = match object {
            Some(object) => {
                let matches = if self.pointer {
                    ts.inherits(object.type_id(), self.type_id)
                } else {
                    object.type_id() == self.type_id
                };
                if !matches {
                    return Err(Error::runtime(format!(
                        "object of type '{}' cannot be stored in property '{}' of type '{}'",
                        ts.get(object.type_id()).name(),
                        self.name,
                        ts.get(self.type_id).name()
                    )));
                }
                Element::Object(Box::new(object))
            }
            None if self.pointer => Element::Null,
            None => {
                return Err(Error::runtime(format!(
                    "property '{}' cannot be null",
                    self.name
                )))
            }
        };

        *self.element_mut(index)? = element;
        Ok(())
    }

    /// Shorthand for writing a scalar's payload directly.
    pub fn set(&mut self, data: ValueData) -> Result<(), Error> {
        self.set_at(0, data)
    }

    /// Writes the payload of element `index` directly, without casting.
    pub fn set_at(&mut self, index: usize, data: ValueData) -> Result<(), Error> {
        *self.element_mut(index)? = Element::Value(data);
        Ok(())
    }

    /// Mutable access to the nested object at `index`.
    pub fn object_at_mut(&mut self, index: usize) -> Result<Option<&mut PropertyClass>, Error> {
        match self.element_mut(index)? {
            Element::Object(object) => Ok(Some(object)),
            Element::Null => Ok(None),
            Element::Value(_) => Err(Error::runtime(
                "property does not store an object".to_string(),
            )),
        }
    }

    /// The payload at `index` without the [`Value`] wrapper.
    pub fn value_at(&self, index: usize) -> Result<&ValueData, Error> {
        match self.element(index)? {
            Element::Value(data) => Ok(data),
            _ => Err(Error::runtime(format!(
                "property '{}' holds objects; use get_object()",
                self.name
            ))),
        }
    }

    /// Appends a payload to a dynamic vector.
    pub fn push(&mut self, data: ValueData) -> Result<(), Error> {
        if !self.is_dynamic() {
            return Err(Error::runtime(format!(
                "called push() on static property '{}'",
                self.name
            )));
        }
        self.elements.push(Element::Value(data));
        Ok(())
    }

    /// Appends an object to a dynamic vector of objects.
    pub fn push_object(&mut self, object: PropertyClass, ts: &TypeSystem) -> Result<(), Error> {
        if !self.is_dynamic() {
            return Err(Error::runtime(format!(
                "called push_object() on static property '{}'",
                self.name
            )));
        }
        self.elements.push(Element::Null);
        let index = self.elements.len() - 1;
        self.set_object(Some(object), index, ts)
    }

    /// Writes element `index` through the property type's codec.
    pub fn write_value_to(
        &self,
        ts: &TypeSystem,
        stream: &mut dyn BitIo,
        is_file: bool,
        index: usize,
    ) -> Result<(), Error> {
        match self.element(index)? {
            Element::Value(data) => codec::write_data(ts, stream, self.type_id, data, is_file),
            _ => Err(Error::runtime(format!(
                "property '{}' element {index} is an object; it is written as a nested object",
                self.name
            ))),
        }
    }

    /// Reads element `index` through the property type's codec.
    pub fn read_value_from(
        &mut self,
        ts: &TypeSystem,
        stream: &mut dyn BitIo,
        is_file: bool,
        index: usize,
    ) -> Result<(), Error> {
        let data = codec::read_data(ts, stream, self.type_id, is_file)
            .map_err(|e| Error::parse(format!("property '{}': {e}", self.name)))?;
        *self.element_mut(index)? = Element::Value(data);
        Ok(())
    }
}

/// The ordered property set of a class instance.
///
/// Iteration order is declaration order (base classes first), which is
/// also the canonical network-mode serialization order.
#[derive(Debug, Clone, Default)]
pub struct PropertyList {
    properties: Vec<Property>,
    by_name: HashMap<String, usize>,
    by_full_hash: HashMap<u32, usize>,
}

impl PartialEq for PropertyList {
    fn eq(&self, other: &Self) -> bool {
        self.properties == other.properties
    }
}

impl PropertyList {
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }

    pub fn at(&self, index: usize) -> Result<&Property, Error> {
        self.properties.get(index).ok_or_else(|| {
            Error::runtime(format!(
                "property index out of range (index={index}, count={})",
                self.properties.len()
            ))
        })
    }

    pub(crate) fn at_mut(&mut self, index: usize) -> Result<&mut Property, Error> {
        if index >= self.properties.len() {
            return Err(Error::runtime(format!(
                "property index out of range (index={index}, count={})",
                self.properties.len()
            )));
        }
        Ok(&mut self.properties[index])
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.by_name.get(name).map(|&i| &self.properties[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Property> {
        let index = *self.by_name.get(name)?;
        Some(&mut self.properties[index])
    }

    pub fn get_by_full_hash(&self, hash: u32) -> Option<&Property> {
        self.by_full_hash.get(&hash).map(|&i| &self.properties[i])
    }

    pub(crate) fn get_mut_by_full_hash(&mut self, hash: u32) -> Option<&mut Property> {
        let index = *self.by_full_hash.get(&hash)?;
        Some(&mut self.properties[index])
    }

    /// Appends a property, enforcing unique names and unique full
    /// hashes. Collisions on either are fatal to the instantiation.
    pub fn add(&mut self, property: Property) -> Result<(), Error> {
        if self.by_name.contains_key(property.name()) {
            return Err(Error::DuplicateProperty(property.name().to_string()));
        }
        if let Some(&other) = self.by_full_hash.get(&property.full_hash()) {
            return Err(Error::PropertyHashCollision(
                self.properties[other].name().to_string(),
                property.name().to_string(),
                property.full_hash(),
            ));
        }

        let index = self.properties.len();
        self.by_name.insert(property.name().to_string(), index);
        self.by_full_hash.insert(property.full_hash(), index);
        self.properties.push(property);
        Ok(())
    }
}
