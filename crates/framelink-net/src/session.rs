use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use framelink_message::SessionId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Server-side state of one accepted connection.
///
/// Owned by the server's session table. Dropping it closes the outgoing
/// queue; the writer task flushes what is queued and shuts the socket down.
#[derive(Debug)]
pub struct ClientSession {
    id: SessionId,
    peer_addr: SocketAddr,
    connected_at: Instant,
    outgoing: mpsc::UnboundedSender<Bytes>,
    reader: Option<JoinHandle<()>>,
    writer: JoinHandle<()>,
}

/// Snapshot of a session for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer_addr: SocketAddr,
    /// Time since the connection was accepted.
    pub connected_for: Duration,
}

impl ClientSession {
    pub(crate) fn new(
        id: SessionId,
        peer_addr: SocketAddr,
        outgoing: mpsc::UnboundedSender<Bytes>,
        writer: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            peer_addr,
            connected_at: Instant::now(),
            outgoing,
            reader: None,
            writer,
        }
    }

    pub(crate) fn attach_reader(&mut self, reader: JoinHandle<()>) {
        self.reader = Some(reader);
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            peer_addr: self.peer_addr,
            connected_for: self.connected_at.elapsed(),
        }
    }

    /// Queue already-framed bytes. False if the writer has stopped.
    pub(crate) fn queue(&self, bytes: Bytes) -> bool {
        self.outgoing.send(bytes).is_ok()
    }

    /// Stop reading. Queued writes still go out in the background.
    pub(crate) fn close(mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    /// Stop reading and wait up to `grace` for queued writes to go out.
    pub(crate) async fn finish(self, grace: Duration) {
        let Self {
            id,
            outgoing,
            reader,
            writer,
            ..
        } = self;
        if let Some(reader) = reader {
            reader.abort();
        }
        drop(outgoing);
        if tokio::time::timeout(grace, writer).await.is_err() {
            debug!(session_id = %id, "queued writes not flushed in time");
        }
    }
}
