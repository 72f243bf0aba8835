//! Module loading and message dispatch.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, ParseError, ValueError};
use crate::message::Message;
use crate::module::MessageModule;
use crate::record::Record;

/// Owns every loaded [`MessageModule`] and routes messages by service id
/// or protocol type. Read-only once loading is done.
#[derive(Debug, Default)]
pub struct MessageManager {
    modules: Vec<MessageModule>,
    by_service: HashMap<u8, usize>,
    by_protocol: HashMap<String, usize>,
}

impl MessageManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a message module from an XML document.
    pub fn load_module_xml(&mut self, xml: &str) -> Result<&MessageModule, Error> {
        let document = roxmltree::Document::parse(xml)
            .map_err(|e| ParseError::InvalidXml(format!("failed to parse module: {e}")))?;

        let mut module = MessageModule::default();
        for node in document.root_element().children().filter(roxmltree::Node::is_element) {
            let record_node = match node.children().find(roxmltree::Node::is_element) {
                Some(record_node) => record_node,
                None => continue,
            };
            let record = Record::from_xml(record_node)?;
            let element_name = node.tag_name().name();

            if element_name == "_ProtocolInfo" {
                if let Some(crate::FieldValue::UByt(service_id)) =
                    record.field("ServiceID").map(|f| f.value().clone())
                {
                    module.set_service_id(service_id);
                }
                if let Some(crate::FieldValue::Str(protocol_type)) =
                    record.field("ProtocolType").map(|f| f.value().clone())
                {
                    module.set_protocol_type(protocol_type);
                }
                if let Some(crate::FieldValue::Str(description)) =
                    record.field("ProtocolDescription").map(|f| f.value().clone())
                {
                    module.set_protocol_description(description);
                }
            } else {
                module.add_message_template(element_name, record)?;
            }
        }

        if !module.is_ordered() {
            module.sort_lookup()?;
        }

        if self.by_service.contains_key(&module.service_id()) {
            return Err(ValueError::OverwritesLookup(format!(
                "a message module has already been loaded with service id {}",
                module.service_id()
            ))
            .into());
        }
        if self.by_protocol.contains_key(module.protocol_type()) {
            return Err(ValueError::OverwritesLookup(format!(
                "a message module has already been loaded with protocol type '{}'",
                module.protocol_type()
            ))
            .into());
        }

        debug!(
            service_id = module.service_id(),
            protocol_type = module.protocol_type(),
            templates = module.template_count(),
            "loaded message module"
        );

        let index = self.modules.len();
        self.by_service.insert(module.service_id(), index);
        self.by_protocol
            .insert(module.protocol_type().to_string(), index);
        self.modules.push(module);
        Ok(&self.modules[index])
    }

    /// Loads a message module from an XML file on disk.
    pub fn load_module_file(&mut self, path: impl AsRef<Path>) -> Result<&MessageModule, Error> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path)
            .map_err(|_| ValueError::MissingFile(path.display().to_string()))?;
        self.load_module_xml(&xml)
    }

    pub fn module(&self, service_id: u8) -> Option<&MessageModule> {
        self.by_service.get(&service_id).map(|&i| &self.modules[i])
    }

    pub fn module_by_protocol(&self, protocol_type: &str) -> Option<&MessageModule> {
        self.by_protocol.get(protocol_type).map(|&i| &self.modules[i])
    }

    /// Builds an outgoing message by service id and template name.
    pub fn build_message(&self, service_id: u8, name: &str) -> Result<Message, Error> {
        let module = self
            .module(service_id)
            .ok_or(ValueError::InvalidService(service_id))?;
        Ok(module.build_message_by_name(name)?)
    }

    /// Builds an outgoing message by service id and type id.
    pub fn build_message_by_type(&self, service_id: u8, message_type: u8) -> Result<Message, Error> {
        let module = self
            .module(service_id)
            .ok_or(ValueError::InvalidService(service_id))?;
        Ok(module.build_message(message_type)?)
    }

    /// Parses a framed message and resolves it against the catalog.
    pub fn message_from_binary<R: Read>(&self, reader: &mut R) -> Result<Message, Error> {
        let mut message = Message::read_from(reader)?;

        let module = self
            .module(message.service_id())
            .ok_or(ValueError::InvalidService(message.service_id()))?;
        let template = module.template_by_type(message.message_type()).ok_or(
            ValueError::InvalidMessageType {
                service_id: message.service_id(),
                message_type: message.message_type(),
            },
        )?;

        message.apply_template(template)?;
        Ok(message)
    }
}
