//! Message kinds, type-id registry and exact-kind dispatch.
//!
//! A frame carries a type id and an opaque payload. This crate turns that
//! pair back into a concrete message: the [`MessageTypeRegistry`] builds a
//! blank instance for the id, the instance decodes its own payload, and the
//! [`Dispatcher`] hands it to the handlers registered for exactly that kind.
//!
//! Registries and dispatch queues are explicit values passed to the
//! connections that use them; there is no process-wide state.

pub mod catalog;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod registry;

pub use catalog::{register_builtin, Goodbye, Ping, Pong, Text};
pub use dispatch::{DispatchQueue, Dispatcher, Envelope, HandlerRegistry, OwnerId, SessionId};
pub use error::{MessageError, Result};
pub use message::{to_frame, Message, MessageKind, MessageType};
pub use registry::{Creator, MessageTypeRegistry};
