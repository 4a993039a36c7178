//! Byte relay between two established connections.
//!
//! A session is two mirrored [`relay`] loops. They never talk to each other:
//! when one direction ends it closes the connection it was writing to, and the
//! other direction sees that as a failed read or write on its next attempt.

use std::io;
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use socket2::SockRef;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

pub const DEFAULT_BUFFER_SIZE: usize = 1024;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Bytes read per iteration.
    pub buffer_size: usize,
    /// Read deadline, re-armed before every read.
    pub idle_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// TCP connection shared by both directions of a session. Each direction
/// only reads from one side and only writes to the other.
#[derive(Debug, Clone)]
pub struct Connection {
    stream: Arc<TcpStream>,
    peer: Option<SocketAddr>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            stream: Arc::new(stream),
            peer,
        }
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            self.stream.readable().await?;
            match self.stream.try_read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn write_all(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            self.stream.writable().await?;
            match self.stream.try_write(buf) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Shut down both halves of the socket.
    ///
    /// Wakes any task blocked reading or writing this connection: pending
    /// reads return end of stream, writes fail. Calling it again is a no-op.
    /// The descriptor itself is released when the last clone is dropped.
    pub fn close(&self) {
        // ENOTCONN once already shut down or reset by the peer
        let _ = SockRef::from(self.stream.as_ref()).shutdown(Shutdown::Both);
    }
}

/// Closes the wrapped connection on drop, including when the relay future is
/// cancelled mid-loop.
struct CloseOnDrop<'a>(&'a Connection);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Why a relay direction stopped.
#[derive(Debug)]
pub enum Termination {
    /// Source reached end of stream, or was closed locally.
    Closed,
    /// Nothing arrived from the source within the idle timeout.
    IdleTimeout,
    ReadError(io::Error),
    WriteError(io::Error),
}

impl Termination {
    pub fn is_idle_timeout(&self) -> bool {
        matches!(self, Termination::IdleTimeout)
    }
}

#[derive(Debug)]
pub struct RelayReport {
    /// Bytes written to the destination.
    pub bytes: u64,
    pub termination: Termination,
}

/// Copy `src` into `dst` until either fails or `src` goes quiet for
/// `config.idle_timeout`. Always closes `dst` on the way out.
pub async fn relay(src: &Connection, dst: &Connection, config: RelayConfig) -> RelayReport {
    let _close = CloseOnDrop(dst);
    let mut buf = vec![0u8; config.buffer_size];
    let mut bytes = 0u64;

    let termination = loop {
        let read = match timeout(config.idle_timeout, src.read(&mut buf)).await {
            Ok(read) => read,
            Err(_) => break Termination::IdleTimeout,
        };
        match read {
            Ok(0) => break Termination::Closed,
            Ok(n) => {
                if let Err(e) = dst.write_all(&buf[..n]).await {
                    warn!(peer = ?dst.peer_addr(), "write: {}", e);
                    break Termination::WriteError(e);
                }
                bytes += n as u64;
            }
            Err(e) => break Termination::ReadError(e),
        }
    };

    debug!(
        from = ?src.peer_addr(),
        to = ?dst.peer_addr(),
        bytes,
        ?termination,
        "relay finished"
    );
    RelayReport { bytes, termination }
}

/// Reports for both directions of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    /// `a` to `b`.
    pub forward: RelayReport,
    /// `b` to `a`.
    pub backward: RelayReport,
}

/// Bridge two connections until either side closes or idles out.
///
/// `b -> a` runs on a spawned task, `a -> b` on the caller's. Returns once
/// both directions have stopped.
pub async fn bridge(a: TcpStream, b: TcpStream, config: RelayConfig) -> SessionReport {
    let a = Connection::new(a);
    let b = Connection::new(b);

    let (a2, b2) = (a.clone(), b.clone());
    let backward = tokio::spawn(async move { relay(&b2, &a2, config).await });

    let forward = relay(&a, &b, config).await;
    let backward = match backward.await {
        Ok(report) => report,
        Err(e) => {
            // the task's drop guard already closed `a`
            RelayReport {
                bytes: 0,
                termination: Termination::ReadError(io::Error::new(io::ErrorKind::Other, e)),
            }
        }
    };

    SessionReport { forward, backward }
}
