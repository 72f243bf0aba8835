//! JSON rendition of the reflection surface.
//!
//! An object becomes a JSON object with a `_pclass_meta` member carrying
//! the type hash (`null` for a null pointer) and one member per
//! property; array-shaped properties become JSON arrays and class-typed
//! properties nest.

use serde_json::{json, Map, Value as Json};

use crate::property::Property;
use crate::property_class::PropertyClass;
use crate::types::TypeSystem;
use crate::value::{Value, ValueData};
use crate::Error;

pub struct JsonSerializer<'a> {
    types: &'a TypeSystem,
    pretty: bool,
}

impl<'a> JsonSerializer<'a> {
    pub fn new(types: &'a TypeSystem, pretty: bool) -> Self {
        Self { types, pretty }
    }

    pub fn save(&self, object: &PropertyClass) -> Result<String, Error> {
        let value = self.save_object(Some(object))?;
        let text = if self.pretty {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        };
        text.map_err(|e| Error::runtime(format!("failed to serialize JSON: {e}")))
    }

    fn save_object(&self, object: Option<&PropertyClass>) -> Result<Json, Error> {
        let mut members = Map::new();
        members.insert(
            "_pclass_meta".to_string(),
            json!({ "type_hash": object.map(PropertyClass::type_hash) }),
        );

        if let Some(object) = object {
            for property in object.properties().iter() {
                self.save_property(&mut members, property)?;
            }
        }

        Ok(Json::Object(members))
    }

    fn save_property(&self, members: &mut Map<String, Json>, property: &Property) -> Result<(), Error> {
        let json_type = self.types.get_type("json")?.id();
        let is_class = self.types.get(property.type_id()).is_class();

        let mut values = Vec::with_capacity(property.element_count());
        for index in 0..property.element_count() {
            let value = if is_class {
                self.save_object(property.get_object(index)?)?
            } else {
                let value = property.get_value(index)?;
                match self.types.cast_value(&value, json_type)?.into_data() {
                    ValueData::Json(v) => v,
                    other => {
                        return Err(Error::runtime(format!(
                            "json cast of property '{}' produced a {} payload",
                            property.name(),
                            other.kind_name()
                        )))
                    }
                }
            };
            values.push(value);
        }

        let member = if property.is_array() {
            Json::Array(values)
        } else {
            values.pop().unwrap_or(Json::Null)
        };
        members.insert(property.name().to_string(), member);
        Ok(())
    }

    pub fn load(&self, text: &str) -> Result<Option<PropertyClass>, Error> {
        let value: Json = serde_json::from_str(text)
            .map_err(|e| Error::parse(format!("failed to deserialize JSON: {e}")))?;
        self.load_object(&value)
    }

    fn load_object(&self, value: &Json) -> Result<Option<PropertyClass>, Error> {
        // Absent meta is read as a null object.
        let type_hash = match value.get("_pclass_meta").and_then(|m| m.get("type_hash")) {
            Some(hash) => hash.as_u64().unwrap_or(0) as u32,
            None => 0,
        };
        if type_hash == 0 {
            return Ok(None);
        }

        let ty = self.types.get_type_by_hash(type_hash)?;
        let mut object = self.types.instantiate_id(ty.id())?;
        for index in 0..object.properties().len() {
            self.load_property(&mut object, index, value)?;
        }
        Ok(Some(object))
    }

    fn load_property(
        &self,
        object: &mut PropertyClass,
        index: usize,
        value: &Json,
    ) -> Result<(), Error> {
        let json_type = self.types.get_type("json")?.id();
        let (name, is_array, dynamic, type_id) = {
            let property = object.properties().at(index)?;
            (
                property.name().to_string(),
                property.is_array(),
                property.is_dynamic(),
                property.type_id(),
            )
        };

        let member = value.get(&name).ok_or_else(|| {
            Error::runtime(format!("JSON object missing property '{name}'"))
        })?;

        let elements: Vec<&Json> = if is_array {
            match member.as_array() {
                Some(array) => array.iter().collect(),
                None => {
                    return Err(Error::parse(format!(
                        "property '{name}' expects a JSON array"
                    )))
                }
            }
        } else {
            vec![member]
        };

        if dynamic {
            let count = elements.len();
            object
                .properties_mut()
                .at_mut(index)?
                .set_element_count(count, self.types)?;
        }

        let is_class = self.types.get(type_id).is_class();
        for (element_index, element) in elements.iter().enumerate() {
            if is_class {
                let nested = self.load_object(element)?;
                object.properties_mut().at_mut(index)?.set_object(
                    nested,
                    element_index,
                    self.types,
                )?;
            } else {
                let incoming = Value::new(json_type, ValueData::Json((*element).clone()));
                object.properties_mut().at_mut(index)?.set_value(
                    incoming,
                    element_index,
                    self.types,
                )?;
            }
        }

        Ok(())
    }
}
