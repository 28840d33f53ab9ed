use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use framelink_message::{DispatchQueue, Message, MessageTypeRegistry};
use framelink_transport::{StreamOptions, TransportError};
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{NetError, Result};
use crate::link::{encode_wire, read_messages, write_frames};

/// Lifecycle of a [`ClientConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Everything a client connection reports to its owner.
#[derive(Debug)]
pub enum ConnectionEvent {
    Connected { peer_addr: SocketAddr },
    Disconnected,
    Error { code: i32, description: String },
    /// Only emitted when no dispatch queue is attached.
    MessageReceived(Box<dyn Message>),
}

struct Shared {
    registry: Arc<MessageTypeRegistry>,
    config: ConnectionConfig,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    dispatch: Option<DispatchQueue>,
    state: watch::Sender<ConnectionState>,
    /// Bumped whenever a link ends; whoever bumps it reports the disconnect.
    generation: AtomicU64,
}

impl Shared {
    fn emit(&self, event: ConnectionEvent) {
        // The owner may have stopped listening for events.
        let _ = self.events.send(event);
    }

    fn deliver(&self, message: Box<dyn Message>) {
        match &self.dispatch {
            Some(queue) => {
                if !queue.enqueue(message) {
                    debug!("dispatch queue closed, message dropped");
                }
            }
            None => self.emit(ConnectionEvent::MessageReceived(message)),
        }
    }

    /// End link `generation` if it is still current. Returns true if this
    /// call did the transition.
    fn end_link(&self, generation: u64) -> bool {
        let ended = self
            .generation
            .compare_exchange(
                generation,
                generation + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if ended {
            self.state.send_replace(ConnectionState::Disconnected);
            self.emit(ConnectionEvent::Disconnected);
        }
        ended
    }

    /// Drive the writer for link `generation`. A failed write reports an
    /// error and ends the link.
    async fn write_link<W>(
        self: Arc<Self>,
        generation: u64,
        peer_addr: SocketAddr,
        writer: W,
        outgoing: mpsc::UnboundedReceiver<Bytes>,
    ) where
        W: AsyncWrite + Unpin,
    {
        let Err(err) = write_frames(writer, outgoing).await else {
            return;
        };
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }
        warn!(%peer_addr, error = %err, "write failed");
        let err = NetError::from(TransportError::from(err));
        self.emit(ConnectionEvent::Error {
            code: err.code(),
            description: err.to_string(),
        });
        if self.end_link(generation) {
            info!(%peer_addr, "connection lost on write");
        }
    }
}

struct Link {
    generation: u64,
    peer_addr: SocketAddr,
    outgoing: mpsc::UnboundedSender<Bytes>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// A single outbound connection to a framelink server.
pub struct ClientConnection {
    shared: Arc<Shared>,
    link: Option<Link>,
}

impl ClientConnection {
    /// Create a disconnected client and the channel its events arrive on.
    pub fn new(
        registry: Arc<MessageTypeRegistry>,
        config: ConnectionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        Self::build(registry, config, None)
    }

    /// Create a client that hands received messages to `queue` instead of
    /// emitting [`ConnectionEvent::MessageReceived`].
    pub fn with_dispatch_queue(
        registry: Arc<MessageTypeRegistry>,
        config: ConnectionConfig,
        queue: DispatchQueue,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        Self::build(registry, config, Some(queue))
    }

    fn build(
        registry: Arc<MessageTypeRegistry>,
        config: ConnectionConfig,
        dispatch: Option<DispatchQueue>,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Shared {
            registry,
            config,
            events,
            dispatch,
            state,
            generation: AtomicU64::new(0),
        });
        (Self { shared, link: None }, events_rx)
    }

    /// Connect to `host:port`.
    ///
    /// On failure the state returns to `Disconnected`, an
    /// [`ConnectionEvent::Error`] is emitted and the error is returned.
    pub async fn connect_to(&mut self, host: &str, port: u16) -> Result<()> {
        if self.state() != ConnectionState::Disconnected {
            return Err(NetError::AlreadyConnected);
        }
        if let Some(stale) = self.link.take() {
            stale.reader.abort();
            stale.writer.abort();
        }
        self.shared.state.send_replace(ConnectionState::Connecting);

        let options = self.shared.config.stream_options();
        let (peer_addr, stream) = match open(host, port, &options).await {
            Ok(connected) => connected,
            Err(err) => {
                warn!(host, port, error = %err, "connect failed");
                self.shared.state.send_replace(ConnectionState::Disconnected);
                self.shared.emit(ConnectionEvent::Error {
                    code: err.code(),
                    description: err.to_string(),
                });
                return Err(err);
            }
        };

        let generation = self.shared.generation.load(Ordering::Acquire);
        let (read_half, write_half) = stream.into_split();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(Arc::clone(&self.shared).write_link(
            generation,
            peer_addr,
            write_half,
            outgoing_rx,
        ));

        self.shared.state.send_replace(ConnectionState::Connected);
        self.shared.emit(ConnectionEvent::Connected { peer_addr });
        info!(%peer_addr, "connected");

        let shared = Arc::clone(&self.shared);
        let reader = tokio::spawn(async move {
            let result = read_messages(
                read_half,
                Arc::clone(&shared.registry),
                shared.config.frame.clone(),
                |message| shared.deliver(message),
            )
            .await;

            if shared.generation.load(Ordering::Acquire) != generation {
                return;
            }
            if let Err(err) = result {
                warn!(%peer_addr, error = %err, "read failed");
                let err = NetError::from(err);
                shared.emit(ConnectionEvent::Error {
                    code: err.code(),
                    description: err.to_string(),
                });
            }
            if shared.end_link(generation) {
                info!(%peer_addr, "connection closed by peer");
            }
        });

        self.link = Some(Link {
            generation,
            peer_addr,
            outgoing,
            reader,
            writer,
        });
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Address of the server, while connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match &self.link {
            Some(link) if self.is_connected() => Some(link.peer_addr),
            _ => None,
        }
    }

    /// Serialize, frame and queue a message for the server.
    pub fn send(&self, message: &dyn Message) -> Result<()> {
        let link = match &self.link {
            Some(link) if self.is_connected() => link,
            _ => return Err(NetError::NotConnected),
        };
        let bytes = encode_wire(message, &self.shared.config.frame)?;
        link.outgoing
            .send(bytes)
            .map_err(|_| NetError::Disconnected(link.peer_addr.to_string()))
    }

    /// Write every queued message, then close the connection.
    ///
    /// Waits at most [`ConnectionConfig::close_grace`] for the writes; a
    /// peer that stops reading gets its connection dropped instead.
    pub async fn close(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        let Link {
            generation,
            peer_addr,
            outgoing,
            reader,
            mut writer,
        } = link;
        drop(outgoing);
        match tokio::time::timeout(self.shared.config.close_grace, &mut writer).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(%peer_addr, error = %err, "writer task ended abnormally"),
            Err(_) => {
                debug!(%peer_addr, "queued writes not flushed in time");
                writer.abort();
            }
        }
        reader.abort();
        if self.shared.end_link(generation) {
            info!(%peer_addr, "closed");
        }
    }

    /// Close the connection. Messages already queued are still written.
    pub fn disconnect(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        link.reader.abort();
        if self.shared.end_link(link.generation) {
            info!(peer_addr = %link.peer_addr, "disconnected");
        }
    }
}

async fn open(host: &str, port: u16, options: &StreamOptions) -> Result<(SocketAddr, TcpStream)> {
    let stream = framelink_transport::connect(host, port, options).await?;
    let peer_addr = stream.peer_addr().map_err(TransportError::from)?;
    Ok((peer_addr, stream))
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
