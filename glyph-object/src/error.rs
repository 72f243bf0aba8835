use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Buffer(#[from] glyph_bits::BufferError),

    #[error("{0}")]
    Runtime(String),

    #[error("cannot cast from '{from}' to '{to}'")]
    Cast { from: String, to: String },

    #[error("failed to parse serialized data: {0}")]
    Parse(String),

    #[error("a type has already been defined with the name '{0}'")]
    DuplicateType(String),

    #[error("type hash collision between '{0}' and '{1}' (0x{2:08X})")]
    TypeHashCollision(String, String, u32),

    #[error("a property has already been added with the name '{0}'")]
    DuplicateProperty(String),

    #[error("property hash collision between '{0}' and '{1}' (0x{2:08X})")]
    PropertyHashCollision(String, String, u32),

    #[error("could not find type with name '{0}'")]
    UnknownType(String),

    #[error("could not find type with hash 0x{0:08X}")]
    UnknownTypeHash(u32),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime(message.into())
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Error::Parse(message.into())
    }
}
