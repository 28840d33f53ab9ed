//! Framed, checksummed message exchange over TCP with typed dispatch.
//!
//! framelink moves application messages over plain TCP streams. Each message
//! travels as one frame: a sync marker, the payload length, the message type
//! id and a CRC-16 over the payload. Receivers resynchronize on the marker
//! after corruption, rebuild concrete messages through a type registry and
//! route them to handlers registered for exactly that kind.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP bind, accept and connect
//! - [`frame`]: wire format, CRC-16 and resynchronizing decoder
//! - [`message`]: message kinds, type registry and dispatch queue
//! - [`net`]: client connections and multi-session servers (behind `net` feature)

/// Re-export transport types.
pub mod transport {
    pub use framelink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framelink_frame::*;
}

/// Re-export message types.
pub mod message {
    pub use framelink_message::*;
}

/// Re-export connection and server types (requires `net` feature).
#[cfg(feature = "net")]
pub mod net {
    pub use framelink_net::*;
}
