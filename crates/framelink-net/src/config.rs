use std::time::Duration;

use framelink_frame::FrameConfig;
use framelink_transport::StreamOptions;

/// Default timeout for establishing an outbound connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time `close()` waits for queued writes.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Outbound connection behavior.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub frame: FrameConfig,
    /// `None` waits for the OS connect timeout.
    pub connect_timeout: Option<Duration>,
    pub nodelay: bool,
    /// How long a graceful close waits for queued writes.
    pub close_grace: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            nodelay: true,
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }
}

impl ConnectionConfig {
    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    pub(crate) fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            nodelay: self.nodelay,
            connect_timeout: self.connect_timeout,
        }
    }
}

/// Server behavior.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub frame: FrameConfig,
    pub nodelay: bool,
    /// Connections beyond this many active sessions are closed on accept.
    pub max_sessions: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            nodelay: true,
            max_sessions: None,
        }
    }
}

impl ServerConfig {
    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn with_max_sessions(mut self, max: Option<usize>) -> Self {
        self.max_sessions = max;
        self
    }

    pub(crate) fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            nodelay: self.nodelay,
            connect_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let config = ConnectionConfig::default()
            .with_connect_timeout(None)
            .with_nodelay(false)
            .with_close_grace(Duration::from_millis(50));
        assert!(config.connect_timeout.is_none());
        assert_eq!(config.close_grace, Duration::from_millis(50));
        assert!(!config.stream_options().nodelay);

        let server = ServerConfig::default().with_max_sessions(Some(2));
        assert_eq!(server.max_sessions, Some(2));
        assert!(server.stream_options().nodelay);
    }
}
