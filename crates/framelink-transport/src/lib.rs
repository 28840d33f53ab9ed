//! TCP transport for framelink.
//!
//! This is the lowest layer of framelink. It binds listeners, accepts
//! connections and opens outbound streams, mapping every failure to a
//! [`TransportError`] that names the address involved. Everything above it
//! works on plain [`tokio::net::TcpStream`] halves.

pub mod error;
pub mod tcp;

pub use error::{Result, TransportError};
pub use tcp::{connect, StreamOptions, TcpTransport};
