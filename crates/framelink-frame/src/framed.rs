//! tokio-util codec for framed connections.
//!
//! `FramedRead` owns the receive buffer; [`FrameCodec`] only parses it. Decode
//! outcomes that drop data are yielded as items rather than errors so a single
//! bad frame never terminates the stream.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{decode_frame, encode_frame, Decoded, Frame, FrameConfig};
use crate::error::FrameError;

/// Frame codec for `FramedRead` / `FramedWrite`.
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    config: FrameConfig,
}

impl FrameCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }

    /// Current codec configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Decoder for FrameCodec {
    type Item = Decoded;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Decoded>, FrameError> {
        Ok(decode_frame(src, &self.config))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Decoded>, FrameError> {
        if let Some(decoded) = self.decode(src)? {
            return Ok(Some(decoded));
        }
        if !src.is_empty() {
            debug!(discarded = src.len(), "stream ended mid-frame");
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        if frame.payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max: self.config.max_payload_size,
            });
        }
        let id_len = frame.type_id.encode_utf16().count();
        if id_len > self.config.max_type_id_len {
            return Err(FrameError::TypeIdTooLong {
                len: id_len,
                max: self.config.max_type_id_len,
            });
        }
        encode_frame(&frame.type_id, &frame.payload, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = FramedWrite::new(client, FrameCodec::new());
        let mut reader = FramedRead::new(server, FrameCodec::new());

        writer.send(Frame::new("PING", vec![1u8])).await.unwrap();
        writer.send(Frame::new("Text", b"hi".to_vec())).await.unwrap();

        let first = reader.next().await.unwrap().unwrap();
        let second = reader.next().await.unwrap().unwrap();
        assert_eq!(first, Decoded::Frame(Frame::new("PING", vec![1u8])));
        assert_eq!(second, Decoded::Frame(Frame::new("Text", b"hi".to_vec())));
    }

    #[tokio::test]
    async fn corrupt_frame_does_not_end_stream() {
        let mut bad = BytesMut::new();
        encode_frame("Bad", b"abc", &mut bad).unwrap();
        let last = bad.len() - 1;
        bad[last] ^= 0x01;
        let mut good = BytesMut::new();
        encode_frame("Good", b"abc", &mut good).unwrap();

        let (mut client, server) = tokio::io::duplex(256);
        client.write_all(&bad).await.unwrap();
        client.write_all(&good).await.unwrap();
        drop(client);

        let mut reader = FramedRead::new(server, FrameCodec::new());
        assert!(matches!(
            reader.next().await,
            Some(Ok(Decoded::ChecksumMismatch { .. }))
        ));
        assert!(matches!(
            reader.next().await,
            Some(Ok(Decoded::Frame(frame))) if frame.type_id == "Good"
        ));
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn eof_mid_frame_ends_cleanly() {
        let mut wire = BytesMut::new();
        encode_frame("Cut", b"0123456789", &mut wire).unwrap();

        let (mut client, server) = tokio::io::duplex(256);
        client.write_all(&wire[..wire.len() - 3]).await.unwrap();
        drop(client);

        let mut reader = FramedRead::new(server, FrameCodec::new());
        assert!(reader.next().await.is_none());
    }

    #[test]
    fn encoder_enforces_configured_limits() {
        let mut codec = FrameCodec::with_config(FrameConfig {
            max_payload_size: 4,
            max_type_id_len: 3,
            ..FrameConfig::default()
        });
        let mut dst = BytesMut::new();

        let err = codec
            .encode(Frame::new("A", b"oversized".to_vec()), &mut dst)
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 9, max: 4 }));

        let err = codec
            .encode(Frame::new("LONG", b"ok".to_vec()), &mut dst)
            .unwrap_err();
        assert!(matches!(err, FrameError::TypeIdTooLong { len: 4, max: 3 }));
        assert!(dst.is_empty());
    }
}
