//! Blocking TCP transport seam.
//!
//! The protocol client opens one fresh connection per operation attempt and
//! never shares or reuses a socket, so the seam is two small traits: a
//! [`Connector`] that dials and a [`Connection`] that moves bytes. The
//! connection closes when dropped, which keeps the device's per-client
//! connection limit honored on every exit path.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;

/// Errors from the transport layer.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Host/port did not resolve to any address.
    #[error("address {0:?} did not resolve")]
    Resolve(String),

    /// TCP connect failed or timed out.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        /// Address that was dialed.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Write-side failure.
    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    /// Read-side failure.
    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    /// Peer closed the connection.
    #[error("connection closed by peer")]
    Closed,
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// One blocking byte-stream connection to the device.
pub trait Connection {
    /// Send the whole buffer.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Poll for inbound bytes. `Ok(0)` means nothing arrived within the
    /// transport's poll interval - deadlines stay with the caller, which
    /// keeps calling until its own clock runs out.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Dials a fresh [`Connection`] per protocol attempt.
pub trait Connector {
    /// Connection type produced by this connector.
    type Conn: Connection;

    /// Open a new connection.
    fn connect(&self) -> Result<Self::Conn>;
}

/// Default connect timeout for [`TcpConnector`].
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default receive poll interval for [`TcpConnector`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// TCP connector for a fixed host and port.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
    poll_interval: Duration,
}

impl TcpConnector {
    /// Create a connector for `host:port` with default timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: CONNECT_TIMEOUT,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Override the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the receive poll interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Connector for TcpConnector {
    type Conn = TcpConnection;

    fn connect(&self) -> Result<TcpConnection> {
        let addr_str = format!("{}:{}", self.host, self.port);
        let addr = addr_str
            .to_socket_addrs()
            .map_err(|_| TransportError::Resolve(addr_str.clone()))?
            .next()
            .ok_or_else(|| TransportError::Resolve(addr_str.clone()))?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|source| {
            TransportError::Connect {
                addr: addr_str.clone(),
                source,
            }
        })?;
        stream
            .set_read_timeout(Some(self.poll_interval))
            .map_err(TransportError::Receive)?;
        stream.set_nodelay(true).ok();
        Ok(TcpConnection { stream })
    }
}

/// One TCP connection; closed when dropped.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
}

impl Connection for TcpConnection {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).map_err(TransportError::Send)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream.read(buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(0)
            }
            Err(err) => Err(TransportError::Receive(err)),
        }
    }
}
