//! Message catalogs parsed from XML protocol documents.

use std::collections::{BTreeMap, HashMap};

use crate::error::ValueError;
use crate::message::Message;
use crate::record::Record;

/// One message template: a name, a wire type id, and the record layout
/// its payloads follow.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    name: String,
    message_type: u8,
    service_id: u8,
    access_level: u8,
    record: Record,
}

impl MessageTemplate {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message_type(&self) -> u8 {
        self.message_type
    }

    pub fn service_id(&self) -> u8 {
        self.service_id
    }

    pub fn access_level(&self) -> u8 {
        self.access_level
    }

    pub fn record(&self) -> &Record {
        &self.record
    }
}

/// A service's worth of message templates.
///
/// Type ids come from `_MsgOrder` fields when the module declares them
/// ("ordered" modules); otherwise ids are assigned 1..N by alphabetical
/// template name once the module is finalized.
#[derive(Debug, Default)]
pub struct MessageModule {
    service_id: u8,
    protocol_type: String,
    protocol_description: String,
    templates: Vec<MessageTemplate>,
    by_name: BTreeMap<String, usize>,
    by_type: HashMap<u8, usize>,
}

impl MessageModule {
    pub fn new(service_id: u8, protocol_type: impl Into<String>) -> Self {
        Self {
            service_id,
            protocol_type: protocol_type.into(),
            ..Self::default()
        }
    }

    pub fn service_id(&self) -> u8 {
        self.service_id
    }

    pub(crate) fn set_service_id(&mut self, service_id: u8) {
        self.service_id = service_id;
        for template in &mut self.templates {
            template.service_id = service_id;
        }
    }

    pub fn protocol_type(&self) -> &str {
        &self.protocol_type
    }

    pub(crate) fn set_protocol_type(&mut self, protocol_type: String) {
        self.protocol_type = protocol_type;
    }

    pub fn protocol_description(&self) -> &str {
        &self.protocol_description
    }

    pub(crate) fn set_protocol_description(&mut self, description: String) {
        self.protocol_description = description;
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    pub fn template_by_name(&self, name: &str) -> Option<&MessageTemplate> {
        self.by_name.get(name).map(|&i| &self.templates[i])
    }

    pub fn template_by_type(&self, message_type: u8) -> Option<&MessageTemplate> {
        self.by_type.get(&message_type).map(|&i| &self.templates[i])
    }

    /// Registers a template. The record may override the element name
    /// via a `_MsgName` STR field and pin the type id via a `_MsgOrder`
    /// UBYT field; an `_AccessLevel` UBYT field sets the access gate.
    pub fn add_message_template(
        &mut self,
        element_name: &str,
        record: Record,
    ) -> Result<&MessageTemplate, ValueError> {
        let name = match record.field("_MsgName") {
            Some(field) => match field.value() {
                crate::FieldValue::Str(name) if !name.is_empty() => name.clone(),
                _ => element_name.to_string(),
            },
            None => element_name.to_string(),
        };

        if let Some(&existing) = self.by_name.get(&name) {
            return Ok(&self.templates[existing]);
        }

        let message_type = match record.field("_MsgOrder") {
            Some(field) => match field.value() {
                crate::FieldValue::UByt(0) => {
                    return Err(ValueError::BadField(format!(
                        "message '{name}' declares _MsgOrder 0"
                    )))
                }
                crate::FieldValue::UByt(order) => *order,
                _ => {
                    return Err(ValueError::BadField(format!(
                        "message '{name}' declares a non-UBYT _MsgOrder"
                    )))
                }
            },
            None => 0,
        };

        if message_type != 0 && self.by_type.contains_key(&message_type) {
            return Err(ValueError::OverwritesLookup(format!(
                "message type {message_type} is already taken in service {}",
                self.service_id
            )));
        }

        let access_level = match record.field("_AccessLevel") {
            Some(field) => match field.value() {
                crate::FieldValue::UByt(level) => *level,
                _ => 0,
            },
            None => 0,
        };

        let index = self.templates.len();
        self.templates.push(MessageTemplate {
            name: name.clone(),
            message_type,
            service_id: self.service_id,
            access_level,
            record,
        });
        self.by_name.insert(name, index);
        if message_type != 0 {
            self.by_type.insert(message_type, index);
        }

        Ok(&self.templates[index])
    }

    /// Whether any template pinned its type id explicitly.
    pub fn is_ordered(&self) -> bool {
        self.templates.iter().any(|t| t.message_type != 0)
    }

    /// Assigns type ids 1..N by alphabetical template name. Called once
    /// after loading an unordered module.
    pub(crate) fn sort_lookup(&mut self) -> Result<(), ValueError> {
        if self.templates.len() > 254 {
            return Err(ValueError::ExceedsLimit(format!(
                "module has more than 254 messages ({})",
                self.templates.len()
            )));
        }

        self.by_type.clear();
        let mut message_type: u8 = 1;
        // BTreeMap iteration is the alphabetical order we need.
        for (_, &index) in self.by_name.iter() {
            self.templates[index].message_type = message_type;
            self.by_type.insert(message_type, index);
            message_type = message_type.wrapping_add(1);
        }
        Ok(())
    }

    /// A fresh message built from the template with the given type id.
    pub fn build_message(&self, message_type: u8) -> Result<Message, ValueError> {
        self.template_by_type(message_type)
            .map(Message::from_template)
            .ok_or(ValueError::InvalidMessageType {
                service_id: self.service_id,
                message_type,
            })
    }

    /// A fresh message built from the template with the given name.
    pub fn build_message_by_name(&self, name: &str) -> Result<Message, ValueError> {
        self.template_by_name(name)
            .map(Message::from_template)
            .ok_or_else(|| ValueError::InvalidMessageName {
                service_id: self.service_id,
                name: name.to_string(),
            })
    }
}
