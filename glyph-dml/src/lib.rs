//! DML: ordered records of named primitive fields, and the XML message
//! modules that give them wire identities.
//!
//! A [`Record`] is the unit of encoding: every field writes its value
//! little-endian at its natural width, in declaration order. A
//! [`MessageModule`] is a catalog of record templates loaded from an XML
//! document, and the [`MessageManager`] routes incoming `[service,
//! type]`-tagged messages to the right template.

mod error;
mod field;
mod manager;
mod message;
mod module;
mod record;

pub use error::{Error, ParseError, ValueError};
pub use field::{Field, FieldType, FieldValue};
pub use manager::MessageManager;
pub use message::{Message, MESSAGE_HEADER_SIZE};
pub use module::{MessageModule, MessageTemplate};
pub use record::Record;
