use bytes::BytesMut;
use tracing::warn;

use crate::codec::{decode_frame, Decoded, Frame, FrameConfig};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Stateful decoder bound to one connection's receive buffer.
///
/// Bytes are appended as they arrive; complete frames are taken from the
/// front. A partially received frame stays buffered until the rest arrives.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    config: FrameConfig,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a decoder with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Append newly received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Run one decode step. `None` means more bytes are needed.
    pub fn decode_next(&mut self) -> Option<Decoded> {
        decode_frame(&mut self.buf, &self.config)
    }

    /// Return the next valid frame, dropping corrupt input along the way.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.decode_next()? {
                Decoded::Frame(frame) => return Some(frame),
                Decoded::ChecksumMismatch {
                    type_id,
                    received,
                    computed,
                    len,
                } => {
                    warn!(%type_id, received, computed, len, "dropping frame with bad checksum");
                }
                Decoded::SyncLost { discarded } => {
                    warn!(discarded, "sync lost, discarded bytes");
                }
                Decoded::Malformed { reason, discarded } => {
                    warn!(reason, discarded, "malformed frame header");
                }
            }
        }
    }

    /// Number of bytes waiting in the receive buffer.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop everything buffered and return how many bytes were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.buf.len();
        self.buf.clear();
        discarded
    }

    /// Current decoder configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
