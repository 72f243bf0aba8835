use thiserror::Error;

/// A request referenced something the catalog does not have, or would
/// corrupt what it does have.
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("could not open file: {0}")]
    MissingFile(String),

    #[error("{0}")]
    OverwritesLookup(String),

    #[error("{0}")]
    ExceedsLimit(String),

    #[error("no service exists with id {0}")]
    InvalidService(u8),

    #[error("no service exists with protocol type '{0}'")]
    InvalidProtocolType(String),

    #[error("no message exists with type {message_type} (service={service_id})")]
    InvalidMessageType { service_id: u8, message_type: u8 },

    #[error("no message exists with name '{name}' (service={service_id})")]
    InvalidMessageName { service_id: u8, name: String },

    #[error("{0}")]
    BadField(String),
}

/// Raw data did not decode.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid XML: {0}")]
    InvalidXml(String),

    #[error("invalid header data: {0}")]
    InvalidHeaderData(String),

    #[error("not enough data: {0}")]
    InsufficientMessageData(String),

    #[error("invalid message data: {0}")]
    InvalidMessageData(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}
