use std::collections::HashMap;

use framelink_frame::Frame;
use tracing::debug;

use crate::error::{MessageError, Result};
use crate::message::{Message, MessageType};

/// Builds a blank message instance for one type id.
pub type Creator = fn() -> Box<dyn Message>;

fn create_blank<M: MessageType>() -> Box<dyn Message> {
    Box::new(M::default())
}

/// Type-id keyed table of message creators.
///
/// Every receiving connection holds a shared reference to one registry and
/// uses it to turn frames back into messages.
#[derive(Debug, Default, Clone)]
pub struct MessageTypeRegistry {
    creators: HashMap<String, Creator>,
}

impl MessageTypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a creator for a type id.
    ///
    /// Fails with [`MessageError::DuplicateTypeId`] if the id is taken; use
    /// [`replace`](Self::replace) to overwrite deliberately.
    pub fn register(&mut self, type_id: impl Into<String>, creator: Creator) -> Result<()> {
        let type_id = type_id.into();
        if self.creators.contains_key(&type_id) {
            return Err(MessageError::DuplicateTypeId(type_id));
        }
        debug!(%type_id, "registered message type");
        self.creators.insert(type_id, creator);
        Ok(())
    }

    /// Register the creator for kind `M` under its `TYPE_ID`.
    pub fn register_kind<M: MessageType>(&mut self) -> Result<()> {
        self.register(M::TYPE_ID, create_blank::<M>)
    }

    /// Install a creator, returning the one it displaced.
    pub fn replace(&mut self, type_id: impl Into<String>, creator: Creator) -> Option<Creator> {
        self.creators.insert(type_id.into(), creator)
    }

    /// Install the creator for kind `M`, replacing any existing one.
    pub fn replace_kind<M: MessageType>(&mut self) -> Option<Creator> {
        self.replace(M::TYPE_ID, create_blank::<M>)
    }

    /// Remove the creator for a type id.
    pub fn unregister(&mut self, type_id: &str) -> Option<Creator> {
        self.creators.remove(type_id)
    }

    /// Build a blank instance for a type id.
    pub fn create(&self, type_id: &str) -> Result<Box<dyn Message>> {
        let creator = self
            .creators
            .get(type_id)
            .ok_or_else(|| MessageError::UnknownTypeId(type_id.to_string()))?;
        Ok(creator())
    }

    /// Build a message from a received frame and decode its payload.
    pub fn decode(&self, frame: &Frame) -> Result<Box<dyn Message>> {
        let mut message = self.create(&frame.type_id)?;
        message.decode_payload(&frame.payload)?;
        Ok(message)
    }

    /// True if a creator is registered for the type id.
    pub fn contains(&self, type_id: &str) -> bool {
        self.creators.contains_key(type_id)
    }

    /// Registered type ids, sorted.
    pub fn type_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.creators.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.creators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creators.is_empty()
    }
}
