/// Errors that can occur during frame encoding.
///
/// Decoding problems (bad checksum, lost sync) are not errors: they are
/// reported as [`crate::Decoded`] outcomes so the stream can continue.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The message type id exceeds the configured maximum length.
    #[error("type id too long ({len} code units, max {max})")]
    TypeIdTooLong { len: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
