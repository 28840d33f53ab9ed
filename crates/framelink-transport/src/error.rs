use std::time::Duration;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Host name resolution produced no usable address.
    #[error("failed to resolve {addr}: {source}")]
    Resolve {
        addr: String,
        source: std::io::Error,
    },

    /// Connecting did not complete in time.
    #[error("connect to {addr} timed out after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Stable numeric code reported through connection error events.
    pub fn code(&self) -> i32 {
        match self {
            TransportError::Bind { .. } => 1,
            TransportError::Connect { .. } => 2,
            TransportError::Resolve { .. } => 3,
            TransportError::Timeout { .. } => 4,
            TransportError::Accept(_) => 5,
            TransportError::Io(_) => 6,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
