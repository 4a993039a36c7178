//! Relay server: the far end of the tunnel.
//!
//! Each inbound connection starts with a bare SOCKS5 address block replayed
//! by the agent. The server dials that destination and relays bytes until
//! either side goes away.

use std::io;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use proto::relay::SessionReport;
use proto::{bridge, read_address, Error, RelayConfig};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

pub const DEFAULT_PORT: u16 = 9023;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` to listen on.
    pub listen: String,
    pub relay: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: proto::join_host_port("0.0.0.0", DEFAULT_PORT),
            relay: RelayConfig::default(),
        }
    }
}

pub struct RelayServer {
    listener: TcpListener,
    relay: RelayConfig,
}

impl RelayServer {
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen)
            .await
            .with_context(|| format!("listen on {}", config.listen))?;
        Ok(Self::from_listener(listener, config.relay))
    }

    pub fn from_listener(listener: TcpListener, relay: RelayConfig) -> Self {
        Self { listener, relay }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until accepting fails. Sessions never report back
    /// here; an accept error ends the server.
    pub async fn serve(self) -> Result<()> {
        info!("Relay server listening on {}", self.listener.local_addr()?);

        loop {
            let (conn, peer) = self.listener.accept().await.context("accept")?;
            debug!("accepted {}", peer);

            let relay = self.relay;
            tokio::spawn(async move {
                match handle_connection(conn, relay).await {
                    Ok(report) => debug!(
                        %peer,
                        up = report.forward.bytes,
                        down = report.backward.bytes,
                        "session closed"
                    ),
                    Err(e) => log_session_error(peer, &e),
                }
            });
        }
    }
}

/// Decode the destination off `conn`, dial it, and relay until the session
/// ends. Errors leave `conn` to be closed by drop, without any reply.
pub async fn handle_connection(
    mut conn: TcpStream,
    relay: RelayConfig,
) -> proto::Result<SessionReport> {
    let request = read_address(&mut conn).await?;
    debug!(
        raw = %hex::encode(request.raw.as_bytes()),
        host = %request.address,
        "decoded address block"
    );

    let target = request.address.host_port();
    info!("connecting {}", target);
    let remote = TcpStream::connect(&target)
        .await
        .map_err(|e| Error::dial(target, e))?;

    Ok(bridge(conn, remote, relay).await)
}

fn log_session_error(peer: SocketAddr, e: &Error) {
    match e {
        e if e.is_resource_exhausted() => error!(%peer, "dial error: {}", e),
        Error::Dial { .. } => warn!(%peer, "error connecting: {}", e),
        Error::Protocol(_) => warn!(%peer, "get request error: {}", e),
        Error::Network(_) => debug!(%peer, "read request: {}", e),
    }
}
