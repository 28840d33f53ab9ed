use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use framelink_message::{DispatchQueue, Message, MessageTypeRegistry, SessionId};
use framelink_transport::{TcpTransport, TransportError};
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ServerConfig, DEFAULT_CLOSE_GRACE};
use crate::error::{NetError, Result};
use crate::link::{encode_wire, read_messages, write_frames};
use crate::session::{ClientSession, SessionInfo};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Everything a server reports to its owner.
#[derive(Debug)]
pub enum ServerEvent {
    Listening {
        addr: SocketAddr,
    },
    ListenError {
        code: i32,
        description: String,
    },
    ClientConnected {
        session_id: SessionId,
        peer_addr: SocketAddr,
    },
    /// Emitted after the session has left the session table.
    ClientDisconnected {
        session_id: SessionId,
    },
    /// Only emitted when no dispatch queue is attached.
    MessageReceived {
        session_id: SessionId,
        message: Box<dyn Message>,
    },
    Error {
        session_id: Option<SessionId>,
        code: i32,
        description: String,
    },
}

struct Shared {
    registry: Arc<MessageTypeRegistry>,
    config: ServerConfig,
    events: mpsc::UnboundedSender<ServerEvent>,
    dispatch: Option<DispatchQueue>,
    sessions: Mutex<HashMap<SessionId, ClientSession>>,
    next_session_id: AtomicU64,
}

impl Shared {
    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, ClientSession>> {
        // A panicking holder cannot leave the map half-updated.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ServerEvent) {
        // The owner may have stopped listening for events.
        let _ = self.events.send(event);
    }

    fn deliver(&self, session_id: SessionId, message: Box<dyn Message>) {
        match &self.dispatch {
            Some(queue) => {
                if !queue.enqueue_from(session_id, message) {
                    debug!(%session_id, "dispatch queue closed, message dropped");
                }
            }
            None => self.emit(ServerEvent::MessageReceived {
                session_id,
                message,
            }),
        }
    }

    fn admit(self: &Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        let mut sessions = self.sessions();
        if let Some(max) = self.config.max_sessions {
            if sessions.len() >= max {
                warn!(%peer_addr, max, "session limit reached, closing connection");
                return;
            }
        }

        let session_id = SessionId(self.next_session_id.fetch_add(1, Ordering::Relaxed));
        let (read_half, write_half) = stream.into_split();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(Arc::clone(self).write_session(
            session_id,
            write_half,
            outgoing_rx,
        ));

        let mut session = ClientSession::new(session_id, peer_addr, outgoing_tx, writer);
        self.emit(ServerEvent::ClientConnected {
            session_id,
            peer_addr,
        });
        info!(%session_id, %peer_addr, "client connected");

        // The table lock is held until the session is inserted, so the
        // reader cannot finish and try to remove it first.
        let shared = Arc::clone(self);
        session.attach_reader(tokio::spawn(async move {
            shared.read_session(session_id, read_half).await;
        }));
        sessions.insert(session_id, session);
    }

    /// Drive one session's writer. A failed write reports an error and
    /// drops the session.
    async fn write_session<W>(
        self: Arc<Self>,
        session_id: SessionId,
        writer: W,
        outgoing: mpsc::UnboundedReceiver<Bytes>,
    ) where
        W: AsyncWrite + Unpin,
    {
        let Err(err) = write_frames(writer, outgoing).await else {
            return;
        };
        warn!(%session_id, error = %err, "session write failed");
        let err = NetError::from(TransportError::from(err));
        self.emit(ServerEvent::Error {
            session_id: Some(session_id),
            code: err.code(),
            description: err.to_string(),
        });

        let removed = self.sessions().remove(&session_id);
        if let Some(session) = removed {
            session.close();
            info!(%session_id, "client disconnected after write failure");
            self.emit(ServerEvent::ClientDisconnected { session_id });
        }
    }

    async fn read_session(&self, session_id: SessionId, read_half: tokio::net::tcp::OwnedReadHalf) {
        let result = read_messages(
            read_half,
            Arc::clone(&self.registry),
            self.config.frame.clone(),
            |message| self.deliver(session_id, message),
        )
        .await;

        if let Err(err) = result {
            warn!(%session_id, error = %err, "session read failed");
            let err = NetError::from(err);
            self.emit(ServerEvent::Error {
                session_id: Some(session_id),
                code: err.code(),
                description: err.to_string(),
            });
        }

        let removed = self.sessions().remove(&session_id);
        if removed.is_some() {
            info!(%session_id, "client disconnected");
            self.emit(ServerEvent::ClientDisconnected { session_id });
        }
    }
}

/// Accepts client connections and tracks one [`ClientSession`] per client.
pub struct Server {
    shared: Arc<Shared>,
    acceptor: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    /// Create a server and the channel its events arrive on.
    pub fn new(
        registry: Arc<MessageTypeRegistry>,
        config: ServerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        Self::build(registry, config, None)
    }

    /// Create a server that hands received messages to `queue` instead of
    /// emitting [`ServerEvent::MessageReceived`].
    pub fn with_dispatch_queue(
        registry: Arc<MessageTypeRegistry>,
        config: ServerConfig,
        queue: DispatchQueue,
    ) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        Self::build(registry, config, Some(queue))
    }

    fn build(
        registry: Arc<MessageTypeRegistry>,
        config: ServerConfig,
        dispatch: Option<DispatchQueue>,
    ) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            registry,
            config,
            events,
            dispatch,
            sessions: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
        });
        let server = Self {
            shared,
            acceptor: None,
            local_addr: None,
        };
        (server, events_rx)
    }

    /// Bind `address:port` and start accepting clients.
    ///
    /// Returns the bound address; pass port 0 for an ephemeral port.
    pub async fn listen(&mut self, address: &str, port: u16) -> Result<SocketAddr> {
        if self.acceptor.is_some() {
            return Err(NetError::AlreadyConnected);
        }

        let transport = match TcpTransport::bind_with_options(
            address,
            port,
            self.shared.config.stream_options(),
        )
        .await
        {
            Ok(transport) => transport,
            Err(err) => {
                warn!(address, port, error = %err, "listen failed");
                self.shared.emit(ServerEvent::ListenError {
                    code: err.code(),
                    description: err.to_string(),
                });
                return Err(err.into());
            }
        };

        let addr = transport.local_addr();
        self.local_addr = Some(addr);
        self.shared.emit(ServerEvent::Listening { addr });

        let shared = Arc::clone(&self.shared);
        self.acceptor = Some(tokio::spawn(async move {
            loop {
                match transport.accept().await {
                    Ok((stream, peer_addr)) => shared.admit(stream, peer_addr),
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        shared.emit(ServerEvent::Error {
                            session_id: None,
                            code: err.code(),
                            description: err.to_string(),
                        });
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        }));

        Ok(addr)
    }

    /// Bound address, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_listening(&self) -> bool {
        self.acceptor.is_some()
    }

    /// Send a message to one client.
    pub fn send_to_client(&self, session_id: SessionId, message: &dyn Message) -> Result<()> {
        let bytes = encode_wire(message, &self.shared.config.frame)?;
        let sessions = self.shared.sessions();
        let session = sessions
            .get(&session_id)
            .ok_or(NetError::UnknownClient(session_id))?;
        if !session.queue(bytes) {
            return Err(NetError::Disconnected(session_id.to_string()));
        }
        Ok(())
    }

    /// Send a message to every connected client. The frame is encoded once.
    ///
    /// Returns how many sessions it was queued to.
    pub fn send_to_all(&self, message: &dyn Message) -> Result<usize> {
        let bytes = encode_wire(message, &self.shared.config.frame)?;
        let sessions = self.shared.sessions();
        let queued = sessions
            .values()
            .filter(|session| session.queue(bytes.clone()))
            .count();
        debug!(kind = %message.kind(), queued, "broadcast");
        Ok(queued)
    }

    /// Close one client's connection. Messages already queued to it are
    /// still written.
    pub fn disconnect_client(&self, session_id: SessionId) -> Result<()> {
        let session = self
            .shared
            .sessions()
            .remove(&session_id)
            .ok_or(NetError::UnknownClient(session_id))?;
        session.close();
        info!(%session_id, "client disconnected by server");
        self.shared
            .emit(ServerEvent::ClientDisconnected { session_id });
        Ok(())
    }

    /// Ids of the active sessions, ascending.
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.shared.sessions().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn session_count(&self) -> usize {
        self.shared.sessions().len()
    }

    pub fn session_info(&self, session_id: SessionId) -> Option<SessionInfo> {
        self.shared.sessions().get(&session_id).map(ClientSession::info)
    }

    /// Stop accepting and close every session. Queued writes go out in the
    /// background while the runtime keeps running.
    pub fn shutdown(&mut self) {
        for session in self.stop() {
            session.close();
        }
    }

    /// Stop accepting, flush every session's queued writes and close them.
    pub async fn close(&mut self) {
        for session in self.stop() {
            session.finish(DEFAULT_CLOSE_GRACE).await;
        }
    }

    fn stop(&mut self) -> Vec<ClientSession> {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }
        let drained: Vec<ClientSession> = self
            .shared
            .sessions()
            .drain()
            .map(|(_, session)| session)
            .collect();
        for session in &drained {
            self.shared.emit(ServerEvent::ClientDisconnected {
                session_id: session.id(),
            });
        }
        if let Some(addr) = self.local_addr.take() {
            info!(%addr, "server stopped");
        }
        drained
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use framelink_message::{Dispatcher, OwnerId, Ping, Text};

    use super::*;
    use crate::client::{ClientConnection, ConnectionEvent};
    use crate::config::ConnectionConfig;

    fn registry() -> Arc<MessageTypeRegistry> {
        Arc::new(MessageTypeRegistry::with_builtin())
    }

    async fn next_server_event(events: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("server event should arrive")
            .expect("server event channel open")
    }

    async fn next_message(
        events: &mut mpsc::UnboundedReceiver<ConnectionEvent>,
    ) -> Box<dyn Message> {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("client event should arrive")
                .expect("client event channel open");
            if let ConnectionEvent::MessageReceived(message) = event {
                return message;
            }
        }
    }

    async fn wait_for_sessions(server: &Server, count: usize) {
        for _ in 0..200 {
            if server.session_count() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} sessions, have {}", server.session_count());
    }

    async fn connect_client(
        addr: SocketAddr,
    ) -> (ClientConnection, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (mut client, events) = ClientConnection::new(registry(), ConnectionConfig::default());
        client
            .connect_to(&addr.ip().to_string(), addr.port())
            .await
            .expect("client should connect");
        (client, events)
    }

    #[tokio::test]
    async fn listen_reports_bound_address() {
        let (mut server, mut events) = Server::new(registry(), ServerConfig::default());
        let addr = server.listen("127.0.0.1", 0).await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.local_addr(), Some(addr));
        assert!(matches!(
            next_server_event(&mut events).await,
            ServerEvent::Listening { addr: reported } if reported == addr
        ));
    }

    #[tokio::test]
    async fn listen_error_is_reported() {
        let (mut first, _first_events) = Server::new(registry(), ServerConfig::default());
        let addr = first.listen("127.0.0.1", 0).await.unwrap();

        let (mut second, mut events) = Server::new(registry(), ServerConfig::default());
        let err = second.listen("127.0.0.1", addr.port()).await.unwrap_err();
        assert!(matches!(err, NetError::Transport(_)));
        assert!(matches!(
            next_server_event(&mut events).await,
            ServerEvent::ListenError { code: 1, .. }
        ));
        assert!(!second.is_listening());
    }

    #[tokio::test]
    async fn messages_are_tagged_with_session() {
        let (mut server, mut events) = Server::new(registry(), ServerConfig::default());
        let addr = server.listen("127.0.0.1", 0).await.unwrap();
        let _ = next_server_event(&mut events).await;

        let (client, _client_events) = connect_client(addr).await;
        let session_id = match next_server_event(&mut events).await {
            ServerEvent::ClientConnected { session_id, .. } => session_id,
            other => panic!("unexpected event: {other:?}"),
        };

        client.send(&Text::new("c1", "hello")).unwrap();
        match next_server_event(&mut events).await {
            ServerEvent::MessageReceived {
                session_id: from,
                message,
            } => {
                assert_eq!(from, session_id);
                assert_eq!(message.downcast_ref::<Text>(), Some(&Text::new("c1", "hello")));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fan_out_reaches_only_connected_sessions() {
        let (mut server, mut events) = Server::new(registry(), ServerConfig::default());
        let addr = server.listen("127.0.0.1", 0).await.unwrap();

        let (_a, mut a_events) = connect_client(addr).await;
        let (_b, mut b_events) = connect_client(addr).await;
        let (mut c, _c_events) = connect_client(addr).await;
        wait_for_sessions(&server, 3).await;

        c.disconnect();
        wait_for_sessions(&server, 2).await;

        let queued = server.send_to_all(&Text::new("server", "X")).unwrap();
        assert_eq!(queued, 2);

        for events in [&mut a_events, &mut b_events] {
            let message = next_message(events).await;
            assert_eq!(message.downcast_ref::<Text>(), Some(&Text::new("server", "X")));
        }

        let mut disconnected = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, ServerEvent::ClientDisconnected { .. }) {
                disconnected += 1;
            }
        }
        assert_eq!(disconnected, 1);
    }

    #[tokio::test]
    async fn send_to_client_reaches_only_that_session() {
        let (mut server, _events) = Server::new(registry(), ServerConfig::default());
        let addr = server.listen("127.0.0.1", 0).await.unwrap();

        let (_a, mut a_events) = connect_client(addr).await;
        wait_for_sessions(&server, 1).await;
        let a_id = server.session_ids()[0];
        let (_b, mut b_events) = connect_client(addr).await;
        wait_for_sessions(&server, 2).await;

        server
            .send_to_client(a_id, &Text::new("server", "only a"))
            .unwrap();

        let message = next_message(&mut a_events).await;
        assert_eq!(
            message.downcast_ref::<Text>(),
            Some(&Text::new("server", "only a"))
        );

        let quiet = tokio::time::timeout(Duration::from_millis(300), async {
            loop {
                match b_events.recv().await {
                    Some(ConnectionEvent::MessageReceived(message)) => return message,
                    Some(_) => continue,
                    None => std::future::pending().await,
                }
            }
        })
        .await;
        assert!(quiet.is_err(), "second client got a message");
    }

    #[tokio::test]
    async fn write_failure_drops_session() {
        let (server, mut events) = Server::new(registry(), ServerConfig::default());
        let shared = Arc::clone(&server.shared);
        let session_id = SessionId(7);
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let session = ClientSession::new(
            session_id,
            "127.0.0.1:9".parse().unwrap(),
            outgoing.clone(),
            tokio::spawn(async {}),
        );
        shared.sessions().insert(session_id, session);

        let (writer, peer) = tokio::io::duplex(64);
        drop(peer);
        outgoing.send(Bytes::from_static(b"lost")).unwrap();
        Arc::clone(&shared)
            .write_session(session_id, writer, outgoing_rx)
            .await;

        assert!(matches!(
            next_server_event(&mut events).await,
            ServerEvent::Error { session_id: Some(SessionId(7)), code: 6, .. }
        ));
        assert!(matches!(
            next_server_event(&mut events).await,
            ServerEvent::ClientDisconnected { session_id: SessionId(7) }
        ));
        assert_eq!(server.session_count(), 0);
    }

    #[tokio::test]
    async fn send_to_unknown_client_fails() {
        let (server, _events) = Server::new(registry(), ServerConfig::default());
        let err = server
            .send_to_client(SessionId(99), &Ping::default())
            .unwrap_err();
        assert!(matches!(err, NetError::UnknownClient(SessionId(99))));
        assert!(matches!(
            server.disconnect_client(SessionId(99)),
            Err(NetError::UnknownClient(_))
        ));
    }

    #[tokio::test]
    async fn disconnect_client_closes_peer() {
        let (mut server, _events) = Server::new(registry(), ServerConfig::default());
        let addr = server.listen("127.0.0.1", 0).await.unwrap();
        let (client, mut client_events) = connect_client(addr).await;
        wait_for_sessions(&server, 1).await;

        let session_id = server.session_ids()[0];
        let info = server.session_info(session_id).unwrap();
        assert_eq!(info.id, session_id);
        assert!(info.peer_addr.ip().is_loopback());
        server
            .send_to_client(session_id, &Text::new("server", "bye"))
            .unwrap();
        server.disconnect_client(session_id).unwrap();
        assert_eq!(server.session_count(), 0);

        let message = next_message(&mut client_events).await;
        assert!(message.is::<Text>());
        loop {
            match tokio::time::timeout(Duration::from_secs(5), client_events.recv()).await {
                Ok(Some(ConnectionEvent::Disconnected)) => break,
                Ok(Some(_)) => continue,
                other => panic!("expected disconnect, got {other:?}"),
            }
        }
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn max_sessions_rejects_excess_clients() {
        let config = ServerConfig::default().with_max_sessions(Some(1));
        let (mut server, _events) = Server::new(registry(), config);
        let addr = server.listen("127.0.0.1", 0).await.unwrap();

        let (_first, _first_events) = connect_client(addr).await;
        wait_for_sessions(&server, 1).await;
        let (_second, mut second_events) = connect_client(addr).await;

        loop {
            match tokio::time::timeout(Duration::from_secs(5), second_events.recv()).await {
                Ok(Some(ConnectionEvent::Disconnected)) => break,
                Ok(Some(_)) => continue,
                other => panic!("expected rejection, got {other:?}"),
            }
        }
        assert_eq!(server.session_count(), 1);
    }

    #[tokio::test]
    async fn dispatch_queue_receives_session_messages() {
        let (mut dispatcher, queue) = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.register::<Ping, _>(OwnerId(1), move |ping: &Ping, session| {
            sink.lock().unwrap().push((ping.sequence, session));
        });

        let (mut server, _events) =
            Server::with_dispatch_queue(registry(), ServerConfig::default(), queue);
        let addr = server.listen("127.0.0.1", 0).await.unwrap();
        let (client, _client_events) = connect_client(addr).await;
        wait_for_sessions(&server, 1).await;
        let session_id = server.session_ids()[0];

        client
            .send(&Ping {
                sequence: 11,
                sent_at_ms: None,
            })
            .unwrap();
        assert!(
            tokio::time::timeout(Duration::from_secs(5), dispatcher.dispatch_next())
                .await
                .unwrap()
        );
        assert_eq!(*seen.lock().unwrap(), [(11, Some(session_id))]);
    }

    #[tokio::test]
    async fn close_flushes_pending_replies() {
        let (mut server, _events) = Server::new(registry(), ServerConfig::default());
        let addr = server.listen("127.0.0.1", 0).await.unwrap();
        let (_client, mut client_events) = connect_client(addr).await;
        wait_for_sessions(&server, 1).await;

        let queued = server.send_to_all(&Text::new("server", "last")).unwrap();
        assert_eq!(queued, 1);
        server.close().await;

        let message = next_message(&mut client_events).await;
        assert_eq!(message.downcast_ref::<Text>().map(|t| t.body.as_str()), Some("last"));
    }

    #[tokio::test]
    async fn shutdown_closes_sessions() {
        let (mut server, mut events) = Server::new(registry(), ServerConfig::default());
        let addr = server.listen("127.0.0.1", 0).await.unwrap();
        let (_client, _client_events) = connect_client(addr).await;
        wait_for_sessions(&server, 1).await;

        server.shutdown();
        assert!(!server.is_listening());
        assert_eq!(server.session_count(), 0);

        let mut disconnected = false;
        while let Ok(event) = events.try_recv() {
            disconnected |= matches!(event, ServerEvent::ClientDisconnected { .. });
        }
        assert!(disconnected);
    }
}
