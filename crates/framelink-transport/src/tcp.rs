use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Per-stream socket options applied on connect and accept.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Disable Nagle's algorithm. Default: true.
    pub nodelay: bool,
    /// Upper bound for an outbound connect. Default: 5 seconds.
    pub connect_timeout: Option<Duration>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            nodelay: true,
            connect_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Listening TCP socket.
///
/// Accepted streams have [`StreamOptions::nodelay`] applied before they are
/// handed out.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
    options: StreamOptions,
}

impl TcpTransport {
    /// Bind and listen on `host:port`. Port 0 picks an ephemeral port.
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        Self::bind_with_options(host, port, StreamOptions::default()).await
    }

    /// Bind and listen with explicit stream options.
    pub async fn bind_with_options(host: &str, port: u16, options: StreamOptions) -> Result<Self> {
        let addr = format_addr(host, port);
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
            options,
        })
    }

    /// Accept the next incoming connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        stream.set_nodelay(self.options.nodelay)?;
        debug!(%peer, "accepted connection");
        Ok((stream, peer))
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Connect to `host:port`, trying each resolved address in turn.
pub async fn connect(host: &str, port: u16, options: &StreamOptions) -> Result<TcpStream> {
    let addr = format_addr(host, port);

    let attempt = connect_any(host, port, &addr);
    let stream = match options.connect_timeout {
        Some(timeout) => tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| TransportError::Timeout {
                addr: addr.clone(),
                timeout,
            })??,
        None => attempt.await?,
    };

    stream.set_nodelay(options.nodelay)?;
    debug!(%addr, "connected over tcp");
    Ok(stream)
}

async fn connect_any(host: &str, port: u16, addr: &str) -> Result<TcpStream> {
    let candidates: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|source| TransportError::Resolve {
            addr: addr.to_string(),
            source,
        })?
        .collect();

    if candidates.is_empty() {
        return Err(TransportError::Resolve {
            addr: addr.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no addresses for host",
            ),
        });
    }

    let mut last_err = None;
    for candidate in candidates {
        match TcpStream::connect(candidate).await {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                debug!(%candidate, error = %err, "connect attempt failed");
                last_err = Some(err);
            }
        }
    }

    Err(TransportError::Connect {
        addr: addr.to_string(),
        source: last_err
            .unwrap_or_else(|| std::io::Error::other("no connect attempt was made")),
    })
}

fn format_addr(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
