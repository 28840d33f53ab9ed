//! Client connections and multi-session servers.
//!
//! This is the "just works" layer. A [`ClientConnection`] dials one server;
//! a [`Server`] accepts any number of clients and keeps one
//! [`ClientSession`] per connection. Both read frames on a background task,
//! rebuild messages through a shared [`MessageTypeRegistry`] and report what
//! happened as events on an unbounded channel.
//!
//! [`MessageTypeRegistry`]: framelink_message::MessageTypeRegistry

pub mod client;
pub mod config;
pub mod error;
mod link;
pub mod server;
pub mod session;

pub use client::{ClientConnection, ConnectionEvent, ConnectionState};
pub use config::{ConnectionConfig, ServerConfig};
pub use error::{NetError, Result};
pub use server::{Server, ServerEvent};
pub use session::{ClientSession, SessionInfo};
