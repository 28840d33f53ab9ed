/// Errors that can occur while building, encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// No creator is registered for the type id.
    #[error("unknown message type id '{0}'")]
    UnknownTypeId(String),

    /// A creator is already registered for the type id.
    #[error("message type id '{0}' registered twice")]
    DuplicateTypeId(String),

    /// The message could not serialize its payload.
    #[error("failed to encode '{type_id}' payload: {reason}")]
    Encode {
        type_id: &'static str,
        reason: String,
    },

    /// The payload could not be decoded into the message.
    #[error("failed to decode '{type_id}' payload: {reason}")]
    Decode { type_id: String, reason: String },

    /// Frame construction failed.
    #[error("frame error: {0}")]
    Frame(#[from] framelink_frame::FrameError),
}

pub type Result<T> = std::result::Result<T, MessageError>;
