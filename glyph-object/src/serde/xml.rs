//! XML rendition of the reflection surface.
//!
//! The emitted shape is `<Objects><Class Name="…"><Prop
//! [key="i"]>…</Prop></Class></Objects>`: one element per property
//! element, a zero-based `key` attribute on array-valued properties,
//! nested `<Class>` elements for class-typed members, and the literal
//! text `0` for a null pointer.

use crate::property_class::PropertyClass;
use crate::types::TypeSystem;
use crate::value::{Value, ValueData};
use crate::Error;

pub struct XmlSerializer<'a> {
    types: &'a TypeSystem,
}

impl<'a> XmlSerializer<'a> {
    pub fn new(types: &'a TypeSystem) -> Self {
        Self { types }
    }

    pub fn save(&self, object: &PropertyClass) -> Result<String, Error> {
        let mut out = String::from("<Objects>");
        self.save_object(&mut out, Some(object))?;
        out.push_str("</Objects>");
        Ok(out)
    }

    fn save_object(&self, out: &mut String, object: Option<&PropertyClass>) -> Result<(), Error> {
        let object = match object {
            Some(object) => object,
            None => return Ok(()),
        };

        let name = self.types.get(object.type_id()).name();
        out.push_str("<Class Name=\"");
        push_escaped(out, name);
        out.push_str("\">");

        for index in 0..object.properties().len() {
            self.save_property(out, object, index)?;
        }

        out.push_str("</Class>");
        Ok(())
    }

    fn save_property(
        &self,
        out: &mut String,
        object: &PropertyClass,
        index: usize,
    ) -> Result<(), Error> {
        let string_type = self.types.get_type("std::string")?.id();
        let property = object.properties().at(index)?;
        let is_class = self.types.get(property.type_id()).is_class();

        for element in 0..property.element_count() {
            out.push('<');
            out.push_str(property.name());
            if property.is_array() {
                out.push_str(&format!(" key=\"{element}\""));
            }
            out.push('>');

            if is_class {
                match property.get_object(element)? {
                    Some(nested) => self.save_object(out, Some(nested))?,
                    None => out.push('0'),
                }
            } else {
                let value = property.get_value(element)?;
                match self.types.cast_value(&value, string_type)?.into_data() {
                    ValueData::Str(text) => push_escaped(out, &text),
                    other => {
                        return Err(Error::runtime(format!(
                            "string cast of property '{}' produced a {} payload",
                            property.name(),
                            other.kind_name()
                        )))
                    }
                }
            }

            out.push_str("</");
            out.push_str(property.name());
            out.push('>');
        }

        Ok(())
    }

    pub fn load(&self, text: &str) -> Result<Option<PropertyClass>, Error> {
        let document = roxmltree::Document::parse(text)
            .map_err(|e| Error::parse(format!("failed to parse XML: {e}")))?;
        let root = document.root_element();
        if root.tag_name().name() != "Objects" {
            return Err(Error::parse(format!(
                "expected <Objects> root element but got <{}>",
                root.tag_name().name()
            )));
        }
        self.load_object(root)
    }

    fn load_object(&self, node: roxmltree::Node) -> Result<Option<PropertyClass>, Error> {
        let class_node = match node.children().find(|n| n.has_tag_name("Class")) {
            Some(class_node) => class_node,
            None => return Ok(None),
        };

        let name = class_node
            .attribute("Name")
            .ok_or_else(|| Error::parse("'Class' element is missing 'Name' attribute".to_string()))?;
        let ty = self.types.get_type(name)?;
        let mut object = self.types.instantiate_id(ty.id())?;

        for index in 0..object.properties().len() {
            self.load_property(&mut object, index, class_node)?;
        }
        Ok(Some(object))
    }

    fn load_property(
        &self,
        object: &mut PropertyClass,
        index: usize,
        node: roxmltree::Node,
    ) -> Result<(), Error> {
        let string_type = self.types.get_type("std::string")?.id();
        let (name, is_array, dynamic, count, type_id) = {
            let property = object.properties().at(index)?;
            (
                property.name().to_string(),
                property.is_array(),
                property.is_dynamic(),
                property.element_count(),
                property.type_id(),
            )
        };

        // Collect this property's element nodes, ordered by their key
        // attribute when the property is array-valued.
        let mut entries: Vec<(usize, roxmltree::Node)> = Vec::new();
        for entry in node.children().filter(|n| n.has_tag_name(name.as_str())) {
            let key = if is_array {
                let key = entry.attribute("key").ok_or_else(|| {
                    Error::parse(format!(
                        "parameter element '{name}' is missing 'key' attribute"
                    ))
                })?;
                key.parse::<usize>()
                    .map_err(|_| Error::parse(format!("bad 'key' attribute on '{name}'")))?
            } else {
                entries.len()
            };
            entries.push((key, entry));
        }
        entries.sort_by_key(|(key, _)| *key);

        if entries.is_empty() {
            return Err(Error::runtime(format!("missing parameter element '{name}'")));
        }

        if dynamic {
            object
                .properties_mut()
                .at_mut(index)?
                .set_element_count(entries.len(), self.types)?;
        } else if entries.len() != count {
            return Err(Error::parse(format!(
                "expected {count} values for '{name}' but got {}",
                entries.len()
            )));
        }

        let is_class = self.types.get(type_id).is_class();
        for (element_index, (_, entry)) in entries.iter().enumerate() {
            if is_class {
                let nested = self.load_object(*entry)?;
                object.properties_mut().at_mut(index)?.set_object(
                    nested,
                    element_index,
                    self.types,
                )?;
            } else {
                let text = entry.text().unwrap_or("").to_string();
                let incoming = Value::new(string_type, ValueData::Str(text));
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

fn push_escaped(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
}
