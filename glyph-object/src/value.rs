//! Type-erased property values.
//!
//! A [`Value`] couples a payload with the [`TypeId`] it was produced
//! under; reading it back as another type goes through the cast registry
//! owned by the [`TypeSystem`](crate::types::TypeSystem).

use crate::types::TypeId;

/// The closed set of payloads a property element can hold.
///
/// Numeric payloads are stored at full width regardless of the wire
/// width of their type; the codec narrows on write and extends on read.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueData {
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Str(String),
    WStr(String),
    Enum(u32),
    Json(serde_json::Value),
}

impl ValueData {
    /// Short label used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ValueData::Bool(_) => "bool",
            ValueData::Signed(_) => "signed",
            ValueData::Unsigned(_) => "unsigned",
            ValueData::Float(_) => "float",
            ValueData::Str(_) => "string",
            ValueData::WStr(_) => "wstring",
            ValueData::Enum(_) => "enum",
            ValueData::Json(_) => "json",
        }
    }
}

/// A payload tagged with the type it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    type_id: TypeId,
    data: ValueData,
}

impl Value {
    pub fn new(type_id: TypeId, data: ValueData) -> Self {
        Self { type_id, data }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn data(&self) -> &ValueData {
        &self.data
    }

    pub fn into_data(self) -> ValueData {
        self.data
    }

    /// Whether this value was produced under `type_id`.
    pub fn is(&self, type_id: TypeId) -> bool {
        self.type_id == type_id
    }
}
