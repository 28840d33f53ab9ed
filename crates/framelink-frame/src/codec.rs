use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::checksum::Crc16;
use crate::error::{FrameError, Result};

/// Sync marker that opens every frame.
pub const SYNC_MARKER: u32 = 0x1ACF_FC1D;

const SYNC_BYTES: [u8; 4] = SYNC_MARKER.to_be_bytes();

/// Fixed header: sync (4) + payload length (4) + type id length (4).
pub const FIXED_HEADER_SIZE: usize = 12;

/// Trailing CRC-16.
pub const CHECKSUM_SIZE: usize = 2;

/// Type id length that encodes a null string.
const NULL_STRING_LEN: u32 = u32::MAX;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default maximum type id length in UTF-16 code units.
pub const DEFAULT_MAX_TYPE_ID_LEN: usize = 256;

/// A decoded message frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Wire-level message type id.
    pub type_id: String,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(type_id: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            type_id: type_id.into(),
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        FIXED_HEADER_SIZE
            + self.type_id.encode_utf16().count() * 2
            + self.payload.len()
            + CHECKSUM_SIZE
    }
}

/// Outcome of one decode attempt that consumed bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame whose checksum matched.
    Frame(Frame),
    /// A complete frame was consumed but its checksum did not match.
    ChecksumMismatch {
        type_id: String,
        received: u16,
        computed: u16,
        len: usize,
    },
    /// Bytes were discarded while searching for a sync marker.
    SyncLost { discarded: usize },
    /// A header or type id could not be interpreted; bytes were skipped.
    Malformed {
        reason: &'static str,
        discarded: usize,
    },
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Maximum type id length in UTF-16 code units. Default: 256.
    pub max_type_id_len: usize,
    /// Discard a partial frame when no byte arrives for this long.
    pub partial_frame_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_type_id_len: DEFAULT_MAX_TYPE_ID_LEN,
            partial_frame_timeout: None,
        }
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (all integers big-endian):
/// ```text
/// ┌────────────┬────────────┬──────────────┬──────────────┬───────────┬──────────┐
/// │ Sync (4B)  │ Length     │ Id units (4B)│ Id (2B/unit) │ Payload   │ CRC-16   │
/// │ 1A CF FC 1D│ N (4B)     │ C            │ UTF-16       │ N bytes   │ (2B)     │
/// └────────────┴────────────┴──────────────┴──────────────┴───────────┴──────────┘
/// ```
///
/// The checksum covers the payload only.
pub fn encode_frame(type_id: &str, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    let units: Vec<u16> = type_id.encode_utf16().collect();
    if units.len() >= NULL_STRING_LEN as usize {
        return Err(FrameError::TypeIdTooLong {
            len: units.len(),
            max: NULL_STRING_LEN as usize - 1,
        });
    }

    dst.reserve(FIXED_HEADER_SIZE + units.len() * 2 + payload.len() + CHECKSUM_SIZE);
    dst.put_u32(SYNC_MARKER);
    dst.put_u32(payload.len() as u32);
    dst.put_u32(units.len() as u32);
    for unit in units {
        dst.put_u16(unit);
    }
    dst.put_slice(payload);
    dst.put_u16(Crc16::checksum(payload));
    Ok(())
}

/// Decode the next frame from a receive buffer.
///
/// Returns `None` when more bytes are needed; the buffer is then left exactly
/// as it was, apart from garbage that cannot belong to any frame. Every
/// `Some` outcome has consumed bytes from the front of `src`, so callers loop
/// until `None`.
pub fn decode_frame(src: &mut BytesMut, config: &FrameConfig) -> Option<Decoded> {
    match find_sync(src) {
        Some(0) => {}
        Some(offset) => {
            src.advance(offset);
            return Some(Decoded::SyncLost { discarded: offset });
        }
        None => {
            let keep = marker_prefix_suffix(src);
            let discarded = src.len() - keep;
            if discarded == 0 {
                return None;
            }
            src.advance(discarded);
            return Some(Decoded::SyncLost { discarded });
        }
    }

    if src.len() < FIXED_HEADER_SIZE {
        return None; // Need more data
    }

    let payload_len = read_u32(src, 4) as usize;
    let raw_id_len = read_u32(src, 8);
    let id_units = if raw_id_len == NULL_STRING_LEN {
        0
    } else {
        raw_id_len as usize
    };

    if payload_len > config.max_payload_size {
        return Some(skip_marker(src, "payload length exceeds limit"));
    }
    if id_units > config.max_type_id_len {
        return Some(skip_marker(src, "type id length exceeds limit"));
    }

    let id_bytes = id_units * 2;
    let total = FIXED_HEADER_SIZE + id_bytes + payload_len + CHECKSUM_SIZE;
    if src.len() < total {
        return None; // Need more data
    }

    let mut raw = src.split_to(total);
    raw.advance(FIXED_HEADER_SIZE);
    let id_raw = raw.split_to(id_bytes);
    let payload = raw.split_to(payload_len).freeze();
    let received = raw.get_u16();
    let computed = Crc16::checksum(&payload);

    let units: Vec<u16> = id_raw
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    if received != computed {
        return Some(Decoded::ChecksumMismatch {
            type_id: String::from_utf16_lossy(&units),
            received,
            computed,
            len: payload_len,
        });
    }

    match String::from_utf16(&units) {
        Ok(type_id) => Some(Decoded::Frame(Frame { type_id, payload })),
        Err(_) => Some(Decoded::Malformed {
            reason: "type id is not valid UTF-16",
            discarded: total,
        }),
    }
}

fn find_sync(src: &[u8]) -> Option<usize> {
    src.windows(SYNC_BYTES.len())
        .position(|window| window == SYNC_BYTES)
}

/// Length of the longest tail of `src` that could start a sync marker.
fn marker_prefix_suffix(src: &[u8]) -> usize {
    (1..SYNC_BYTES.len())
        .rev()
        .find(|&len| src.len() >= len && src[src.len() - len..] == SYNC_BYTES[..len])
        .unwrap_or(0)
}

fn skip_marker(src: &mut BytesMut, reason: &'static str) -> Decoded {
    src.advance(1);
    Decoded::Malformed {
        reason,
        discarded: 1,
    }
}

fn read_u32(src: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([src[at], src[at + 1], src[at + 2], src[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(type_id: &str, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(type_id, payload, &mut buf).unwrap();
        buf
    }

    fn expect_frame(outcome: Option<Decoded>) -> Frame {
        match outcome {
            Some(Decoded::Frame(frame)) => frame,
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_ping_wire_bytes() {
        let buf = encoded("PING", &[0x01]);
        assert_eq!(
            buf.as_ref(),
            &[
                0x1A, 0xCF, 0xFC, 0x1D, // sync
                0x00, 0x00, 0x00, 0x01, // length
                0x00, 0x00, 0x00, 0x04, // type id units
                0x00, 0x50, 0x00, 0x49, 0x00, 0x4E, 0x00, 0x47, // "PING"
                0x01, // payload
                0xE1, 0xF1, // crc-16
            ]
        );
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = encoded("Position", b"lat=52.1;lon=4.3");
        let wire_len = buf.len();

        let frame = expect_frame(decode_frame(&mut buf, &FrameConfig::default()));
        assert_eq!(frame.type_id, "Position");
        assert_eq!(frame.payload.as_ref(), b"lat=52.1;lon=4.3");
        assert_eq!(frame.wire_size(), wire_len);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let mut buf = encoded("Heartbeat", b"");
        let frame = expect_frame(decode_frame(&mut buf, &FrameConfig::default()));
        assert_eq!(frame.type_id, "Heartbeat");
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_payload_containing_sync_marker() {
        let payload = [0x1A, 0xCF, 0xFC, 0x1D, 0x1A, 0xCF, 0xFC, 0x1D, 0x00];
        let mut buf = encoded("Blob", &payload);
        let frame = expect_frame(decode_frame(&mut buf, &FrameConfig::default()));
        assert_eq!(frame.payload.as_ref(), &payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_non_ascii_type_id() {
        let mut buf = encoded("Météo→𝄞", b"x");
        let frame = expect_frame(decode_frame(&mut buf, &FrameConfig::default()));
        assert_eq!(frame.type_id, "Météo→𝄞");
    }

    #[test]
    fn test_incomplete_frame_leaves_buffer_untouched() {
        let full = encoded("PING", b"hello");
        for cut in 0..full.len() {
            let mut buf = BytesMut::from(&full[..cut]);
            assert!(decode_frame(&mut buf, &FrameConfig::default()).is_none());
            assert_eq!(buf.as_ref(), &full[..cut], "buffer changed at cut {cut}");
        }
    }

    #[test]
    fn test_multiple_frames_in_order() {
        let mut buf = encoded("A", b"first");
        buf.extend_from_slice(&encoded("B", b"second"));

        let f1 = expect_frame(decode_frame(&mut buf, &FrameConfig::default()));
        let f2 = expect_frame(decode_frame(&mut buf, &FrameConfig::default()));
        assert_eq!((f1.type_id.as_str(), f1.payload.as_ref()), ("A", b"first".as_ref()));
        assert_eq!((f2.type_id.as_str(), f2.payload.as_ref()), ("B", b"second".as_ref()));
        assert!(decode_frame(&mut buf, &FrameConfig::default()).is_none());
    }

    #[test]
    fn test_single_bit_flip_in_payload_or_checksum() {
        let clean = encoded("Data", b"\x00\x7F\xFFpayload");
        let region_start = clean.len() - CHECKSUM_SIZE - 10;

        for byte in region_start..clean.len() {
            for bit in 0..8 {
                let mut buf = clean.clone();
                buf[byte] ^= 1u8 << bit;
                match decode_frame(&mut buf, &FrameConfig::default()) {
                    Some(Decoded::ChecksumMismatch { type_id, len, .. }) => {
                        assert_eq!(type_id, "Data");
                        assert_eq!(len, 10);
                    }
                    other => panic!("byte {byte} bit {bit}: expected mismatch, got {other:?}"),
                }
                assert!(buf.is_empty(), "corrupt frame must be consumed");
            }
        }
    }

    #[test]
    fn test_leading_garbage_is_reported_then_frame_decodes() {
        let mut buf = BytesMut::from(&[0xAA, 0xBB, 0xCC][..]);
        buf.extend_from_slice(&encoded("PING", b"x"));

        assert_eq!(
            decode_frame(&mut buf, &FrameConfig::default()),
            Some(Decoded::SyncLost { discarded: 3 })
        );
        let frame = expect_frame(decode_frame(&mut buf, &FrameConfig::default()));
        assert_eq!(frame.type_id, "PING");
    }

    #[test]
    fn test_unaligned_marker_is_found() {
        // A 4-byte-stride scan would skip a marker at offset 1.
        let mut buf = BytesMut::from(&[0x00][..]);
        buf.extend_from_slice(&encoded("PING", b""));

        assert_eq!(
            decode_frame(&mut buf, &FrameConfig::default()),
            Some(Decoded::SyncLost { discarded: 1 })
        );
        expect_frame(decode_frame(&mut buf, &FrameConfig::default()));
    }

    #[test]
    fn test_no_marker_keeps_possible_prefix() {
        let mut buf = BytesMut::from(&[0x01, 0x02, 0x03, 0x04, 0x1A, 0xCF][..]);
        assert_eq!(
            decode_frame(&mut buf, &FrameConfig::default()),
            Some(Decoded::SyncLost { discarded: 4 })
        );
        assert_eq!(buf.as_ref(), &[0x1A, 0xCF]);
        assert!(decode_frame(&mut buf, &FrameConfig::default()).is_none());
    }

    #[test]
    fn test_no_marker_discards_everything_else() {
        let mut buf = BytesMut::from(&[0x10, 0x20, 0x30, 0x40, 0x50][..]);
        assert_eq!(
            decode_frame(&mut buf, &FrameConfig::default()),
            Some(Decoded::SyncLost { discarded: 5 })
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_oversized_length_skips_marker() {
        let mut buf = BytesMut::new();
        buf.put_u32(SYNC_MARKER);
        buf.put_u32(1024 * 1024 * 32);
        buf.put_u32(4);

        let outcome = decode_frame(&mut buf, &FrameConfig::default());
        assert!(matches!(
            outcome,
            Some(Decoded::Malformed { discarded: 1, .. })
        ));
        assert_eq!(buf.len(), FIXED_HEADER_SIZE - 1);
    }

    #[test]
    fn test_oversized_type_id_skips_marker() {
        let mut buf = encoded("ABCDEFGH", b"");
        let cfg = FrameConfig {
            max_type_id_len: 4,
            ..FrameConfig::default()
        };
        assert!(matches!(
            decode_frame(&mut buf, &cfg),
            Some(Decoded::Malformed { .. })
        ));
    }

    #[test]
    fn test_null_type_id_decodes_as_empty() {
        let mut buf = BytesMut::new();
        buf.put_u32(SYNC_MARKER);
        buf.put_u32(1);
        buf.put_u32(u32::MAX);
        buf.put_u8(0x01);
        buf.put_u16(Crc16::checksum(&[0x01]));

        let frame = expect_frame(decode_frame(&mut buf, &FrameConfig::default()));
        assert_eq!(frame.type_id, "");
        assert_eq!(frame.payload.as_ref(), &[0x01]);
    }

    #[test]
    fn test_invalid_utf16_type_id_is_consumed() {
        let mut buf = BytesMut::new();
        buf.put_u32(SYNC_MARKER);
        buf.put_u32(0);
        buf.put_u32(1);
        buf.put_u16(0xD800); // lone surrogate
        buf.put_u16(Crc16::checksum(&[]));

        assert!(matches!(
            decode_frame(&mut buf, &FrameConfig::default()),
            Some(Decoded::Malformed { discarded: 16, .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_frame_wire_size() {
        let frame = Frame::new("PING", Bytes::from_static(b"test"));
        assert_eq!(frame.wire_size(), FIXED_HEADER_SIZE + 8 + 4 + CHECKSUM_SIZE);
    }
}
