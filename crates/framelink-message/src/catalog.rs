//! Built-in message kinds used by the CLI and demos.
//!
//! Payloads are JSON objects. An empty payload decodes to the kind's default.

use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{MessageError, Result};
use crate::message::MessageType;
use crate::registry::MessageTypeRegistry;

/// Liveness probe. The peer answers with a [`Pong`] echoing `sequence`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at_ms: Option<u64>,
}

/// Reply to a [`Ping`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at_ms: Option<u64>,
}

impl Pong {
    /// Build the reply for `ping`.
    pub fn answer(ping: &Ping) -> Self {
        Self {
            sequence: ping.sequence,
            sent_at_ms: ping.sent_at_ms,
        }
    }
}

/// Chat line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    #[serde(default)]
    pub from: String,
    pub body: String,
}

impl Text {
    pub fn new(from: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            body: body.into(),
        }
    }
}

/// Announces an orderly close by the sender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goodbye {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn write_json<T: Serialize>(type_id: &'static str, value: &T, dst: &mut BytesMut) -> Result<()> {
    let json = serde_json::to_vec(value).map_err(|err| MessageError::Encode {
        type_id,
        reason: err.to_string(),
    })?;
    dst.put_slice(&json);
    Ok(())
}

fn read_json<T: DeserializeOwned + Default>(type_id: &str, payload: &[u8]) -> Result<T> {
    if payload.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(payload).map_err(|err| MessageError::Decode {
        type_id: type_id.to_string(),
        reason: err.to_string(),
    })
}

macro_rules! json_message {
    ($ty:ty, $id:literal) => {
        impl MessageType for $ty {
            const TYPE_ID: &'static str = $id;

            fn encode_payload(&self, dst: &mut BytesMut) -> Result<()> {
                write_json(Self::TYPE_ID, self, dst)
            }

            fn decode_payload(&mut self, payload: &[u8]) -> Result<()> {
                *self = read_json(Self::TYPE_ID, payload)?;
                Ok(())
            }
        }
    };
}

json_message!(Ping, "Ping");
json_message!(Pong, "Pong");
json_message!(Text, "Text");
json_message!(Goodbye, "Goodbye");

/// Register every built-in kind.
pub fn register_builtin(registry: &mut MessageTypeRegistry) -> Result<()> {
    registry.register_kind::<Ping>()?;
    registry.register_kind::<Pong>()?;
    registry.register_kind::<Text>()?;
    registry.register_kind::<Goodbye>()?;
    Ok(())
}

impl MessageTypeRegistry {
    /// Registry preloaded with the built-in kinds.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.replace_kind::<Ping>();
        registry.replace_kind::<Pong>();
        registry.replace_kind::<Text>();
        registry.replace_kind::<Goodbye>();
        registry
    }
}
