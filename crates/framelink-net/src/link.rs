//! Reader and writer halves shared by client connections and server sessions.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use framelink_frame::{Decoded, FrameCodec, FrameConfig, FrameError};
use framelink_message::{to_frame, Message, MessageTypeRegistry};
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::{Encoder, FramedRead};
use tracing::{debug, warn};

use crate::error::Result;

/// Serialize and frame a message once, ready to queue on any number of links.
pub(crate) fn encode_wire(message: &dyn Message, config: &FrameConfig) -> Result<Bytes> {
    let frame = to_frame(message)?;
    let mut buf = BytesMut::with_capacity(frame.wire_size());
    FrameCodec::with_config(config.clone()).encode(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Read frames until the peer closes or the stream fails, handing every
/// decodable message to `deliver` in arrival order.
///
/// Corrupt frames and unknown type ids are dropped with a warning. With a
/// `partial_frame_timeout`, a partial frame that makes no progress for a full
/// period is discarded and reading continues.
pub(crate) async fn read_messages<R, F>(
    reader: R,
    registry: Arc<MessageTypeRegistry>,
    config: FrameConfig,
    mut deliver: F,
) -> std::result::Result<(), FrameError>
where
    R: AsyncRead + Unpin,
    F: FnMut(Box<dyn Message>),
{
    let stall_timeout = config.partial_frame_timeout;
    let mut framed = FramedRead::new(reader, FrameCodec::with_config(config));

    loop {
        let next = match stall_timeout {
            Some(period) => {
                let before = framed.read_buffer().len();
                match tokio::time::timeout(period, framed.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let buffered = framed.read_buffer().len();
                        if buffered > 0 && buffered == before {
                            warn!(discarded = buffered, "discarding stale partial frame");
                            framed.read_buffer_mut().clear();
                        }
                        continue;
                    }
                }
            }
            None => framed.next().await,
        };

        let decoded = match next {
            Some(Ok(decoded)) => decoded,
            Some(Err(err)) => return Err(err),
            None => return Ok(()),
        };

        match decoded {
            Decoded::Frame(frame) => match registry.decode(&frame) {
                Ok(message) => deliver(message),
                Err(err) => {
                    warn!(type_id = %frame.type_id, len = frame.payload.len(), error = %err, "dropping message");
                }
            },
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

/// Write queued frames in order until every sender is dropped, then shut
/// down the write half.
///
/// Stops at the first failed write; the owning side reports it and ends the
/// link.
pub(crate) async fn write_frames<W>(
    mut writer: W,
    mut outgoing: mpsc::UnboundedReceiver<Bytes>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(bytes) = outgoing.recv().await {
        writer.write_all(&bytes).await?;
    }
    if let Err(err) = writer.shutdown().await {
        debug!(error = %err, "shutdown after last write failed");
    }
    Ok(())
}
