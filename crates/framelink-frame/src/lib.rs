//! Sync-marked, CRC-checked message framing over byte streams.
//!
//! Every message travels as one frame:
//! - A 4-byte sync marker (`0x1ACFFC1D`) for stream resynchronization
//! - A 4-byte big-endian payload length
//! - The message type id as a length-prefixed UTF-16 string
//! - The payload
//! - A 2-byte CRC-16 of the payload
//!
//! Decoding never consumes a partially received frame, so callers can keep
//! appending bytes and retrying.

pub mod checksum;
pub mod codec;
pub mod decoder;
pub mod error;
#[cfg(feature = "async")]
pub mod framed;

pub use checksum::Crc16;
pub use codec::{
    decode_frame, encode_frame, Decoded, Frame, FrameConfig, CHECKSUM_SIZE, DEFAULT_MAX_PAYLOAD,
    DEFAULT_MAX_TYPE_ID_LEN, FIXED_HEADER_SIZE, SYNC_MARKER,
};
pub use decoder::FrameDecoder;
pub use error::{FrameError, Result};
#[cfg(feature = "async")]
pub use framed::FrameCodec;
