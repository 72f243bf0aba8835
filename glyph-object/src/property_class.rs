//! Instances of reflective class types.

use crate::property::{Property, PropertyList};
use crate::types::TypeId;
use crate::Error;

/// A live instance of a class type: its identity plus its properties
/// with values.
///
/// Instances are only created through
/// [`TypeSystem::instantiate`](crate::types::TypeSystem::instantiate),
/// which guarantees that every instance of a class carries the same
/// properties in the same order. Dropping an instance releases the
/// nested objects it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyClass {
    type_id: TypeId,
    type_hash: u32,
    properties: PropertyList,
}

impl PropertyClass {
    pub(crate) fn new(type_id: TypeId, type_hash: u32, properties: PropertyList) -> Self {
        Self {
            type_id,
            type_hash,
            properties,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The wire hash of this instance's type.
    pub fn type_hash(&self) -> u32 {
        self.type_hash
    }

    pub fn properties(&self) -> &PropertyList {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut PropertyList {
        &mut self.properties
    }

    pub fn property(&self, name: &str) -> Result<&Property, Error> {
        self.properties
            .get(name)
            .ok_or_else(|| Error::runtime(format!("could not find property with name '{name}'")))
    }

    pub fn property_mut(&mut self, name: &str) -> Result<&mut Property, Error> {
        self.properties
            .get_mut(name)
            .ok_or_else(|| Error::runtime(format!("could not find property with name '{name}'")))
    }
}
