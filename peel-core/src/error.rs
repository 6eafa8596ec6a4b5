use thiserror::Error;

/// One-line, component-tagged failures. The tag names the decoder that gave
/// up ("BinHex", "cpt", "sit5", "sit15", ...), never the layer above it.
#[derive(Error, Debug)]
pub enum PeelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Format rejection and header validation failures.
    #[error("{0}: {1}")]
    Format(&'static str, String),

    #[error("{0}: premature end of stream")]
    Truncated(&'static str),

    #[error("{0}: {1} CRC mismatch")]
    Crc(&'static str, &'static str),

    #[error("{0}: encrypted entries are not supported")]
    Encrypted(&'static str),

    #[error("{0}: unsupported compression method {1}")]
    UnsupportedMethod(&'static str, u8),

    /// Failures inside a decompression engine: bitstream underflow,
    /// malformed trees, impossible back-references, illegal escapes.
    #[error("{0}: {1}")]
    Decode(&'static str, String),
}

pub type Result<T> = std::result::Result<T, PeelError>;

impl PeelError {
    pub fn format(tag: &'static str, msg: impl Into<String>) -> Self {
        PeelError::Format(tag, msg.into())
    }

    pub fn decode(tag: &'static str, msg: impl Into<String>) -> Self {
        PeelError::Decode(tag, msg.into())
    }
}
