use framelink_message::SessionId;

/// Errors that can occur in connection and server operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] framelink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] framelink_frame::FrameError),

    /// Message construction or serialization error.
    #[error("message error: {0}")]
    Message(#[from] framelink_message::MessageError),

    /// Send attempted while the connection is not established.
    #[error("not connected")]
    NotConnected,

    /// Connect attempted while already connecting or connected.
    #[error("already connected")]
    AlreadyConnected,

    /// No session with this id is active.
    #[error("unknown client {0}")]
    UnknownClient(SessionId),

    /// The peer went away while an operation was in flight.
    #[error("peer disconnected: {0}")]
    Disconnected(String),
}

impl NetError {
    /// Stable numeric code reported through error events.
    pub fn code(&self) -> i32 {
        match self {
            NetError::Transport(err) => err.code(),
            NetError::Frame(_) => 10,
            NetError::Message(_) => 20,
            NetError::NotConnected => 30,
            NetError::AlreadyConnected => 31,
            NetError::UnknownClient(_) => 32,
            NetError::Disconnected(_) => 33,
        }
    }
}

pub type Result<T> = std::result::Result<T, NetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_codes_pass_through() {
        let err: NetError = framelink_transport::TransportError::Accept(std::io::Error::other("x")).into();
        assert_eq!(err.code(), 5);
        assert_eq!(NetError::NotConnected.code(), 30);
        assert_eq!(
            NetError::UnknownClient(SessionId(4)).to_string(),
            "unknown client session-4"
        );
    }
}
