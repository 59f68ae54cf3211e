use std::sync::Arc;

/// Errors that can occur while framing words and sentences.
///
/// `Clone` so a single connection failure can be fanned out to every
/// outstanding exchange; `std::io::Error` is wrapped in `Arc` for that.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProtoError {
    /// The stream ended at a word boundary (clean remote or local close).
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream ended inside a length prefix or word body.
    #[error("connection closed mid-word (truncated sentence)")]
    Truncated,

    /// The first byte of a length prefix is in the reserved range.
    #[error("reserved length prefix byte {0:#04x}")]
    ReservedLength(u8),

    /// A word exceeds the configured maximum length.
    #[error("word too long ({len} bytes, max {max})")]
    WordTooLong { len: usize, max: usize },

    /// An I/O error occurred while reading or writing.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for ProtoError {
    fn from(err: std::io::Error) -> Self {
        ProtoError::Io(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, ProtoError>;
