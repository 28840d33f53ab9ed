use std::any::Any;
use std::fmt;

use bytes::BytesMut;
use framelink_frame::Frame;

use crate::error::Result;

/// Dispatch tag of a concrete message kind.
///
/// Wraps the kind's wire type id. Ids are unique within a registry, so the
/// tag identifies exactly one concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageKind(&'static str);

impl MessageKind {
    /// Create a tag from a wire type id.
    pub const fn new(type_id: &'static str) -> Self {
        Self(type_id)
    }

    /// The wire type id.
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A concrete message kind.
///
/// Implement this for each message struct. The blank value produced by
/// `Default` is what the registry builds before [`decode_payload`] fills it.
///
/// [`decode_payload`]: MessageType::decode_payload
pub trait MessageType: fmt::Debug + Default + Send + 'static {
    /// Stable wire-level type id.
    const TYPE_ID: &'static str;

    /// Dispatch tag for this kind.
    const KIND: MessageKind = MessageKind::new(Self::TYPE_ID);

    /// Serialize this message's fields as its payload.
    fn encode_payload(&self, dst: &mut BytesMut) -> Result<()>;

    /// Populate this message from a received payload.
    fn decode_payload(&mut self, payload: &[u8]) -> Result<()>;
}

/// Type-erased message, as produced by the registry and carried by
/// connections and the dispatch queue.
pub trait Message: fmt::Debug + Send + 'static {
    /// Dispatch tag of the concrete kind.
    fn kind(&self) -> MessageKind;

    /// Serialize the payload.
    fn encode_payload(&self, dst: &mut BytesMut) -> Result<()>;

    /// Populate from a payload.
    fn decode_payload(&mut self, payload: &[u8]) -> Result<()>;

    #[doc(hidden)]
    fn as_any(&self) -> &dyn Any;
}

impl<M: MessageType> Message for M {
    fn kind(&self) -> MessageKind {
        M::KIND
    }

    fn encode_payload(&self, dst: &mut BytesMut) -> Result<()> {
        MessageType::encode_payload(self, dst)
    }

    fn decode_payload(&mut self, payload: &[u8]) -> Result<()> {
        MessageType::decode_payload(self, payload)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn Message {
    /// True if this message is of kind `M`.
    pub fn is<M: MessageType>(&self) -> bool {
        self.kind() == M::KIND
    }

    /// Borrow as the concrete kind `M`.
    pub fn downcast_ref<M: MessageType>(&self) -> Option<&M> {
        if !self.is::<M>() {
            return None;
        }
        self.as_any().downcast_ref::<M>()
    }
}

/// Serialize a message into a frame ready for the wire.
pub fn to_frame(message: &dyn Message) -> Result<Frame> {
    let mut payload = BytesMut::new();
    message.encode_payload(&mut payload)?;
    Ok(Frame::new(message.kind().as_str(), payload.freeze()))
}
