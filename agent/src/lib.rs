//! Local SOCKS5 side of the tunnel.
//!
//! The agent answers a minimal SOCKS5 handshake, decodes the CONNECT
//! request, and opens a fresh connection to the relay server whose first
//! bytes are the request's verbatim address block. There is no other
//! handshake on that hop.

use std::io;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use proto::relay::SessionReport;
use proto::{bridge, read_request, Error, RawAddress, RelayConfig};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

pub mod socks;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:1090";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Local SOCKS5 listen address.
    pub listen: String,
    /// Relay server `host:port`.
    pub server: String,
    pub relay: RelayConfig,
}

impl AgentConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            server: server.into(),
            relay: RelayConfig::default(),
        }
    }
}

pub struct Agent {
    listener: TcpListener,
    server: String,
    relay: RelayConfig,
}

impl Agent {
    pub async fn bind(config: &AgentConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen)
            .await
            .with_context(|| format!("listen on {}", config.listen))?;
        Ok(Self::from_listener(listener, config.server.clone(), config.relay))
    }

    pub fn from_listener(listener: TcpListener, server: String, relay: RelayConfig) -> Self {
        Self {
            listener,
            server,
            relay,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept SOCKS5 clients until accepting fails.
    pub async fn serve(self) -> Result<()> {
        info!(
            "SOCKS5 proxy listening on {}, relay server {}",
            self.listener.local_addr()?,
            self.server
        );

        loop {
            let (client, peer) = self.listener.accept().await.context("accept")?;
            debug!("SOCKS5 connection from {}", peer);

            let server = self.server.clone();
            let relay = self.relay;
            tokio::spawn(async move {
                match handle_client(client, &server, relay).await {
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

/// Run one client through handshake, request, relay hop setup and relay.
/// Any failure before the relay drops the client without a SOCKS5 error
/// reply.
pub async fn handle_client(
    mut client: TcpStream,
    server: &str,
    relay: RelayConfig,
) -> proto::Result<SessionReport> {
    socks::accept_greeting(&mut client).await?;

    let request = read_request(&mut client).await?;
    debug!(
        raw = %hex::encode(request.raw.as_bytes()),
        host = %request.address,
        "decoded request"
    );

    let upstream = connect_to_server(&request.raw, server).await?;
    socks::send_connect_reply(&mut client).await?;

    Ok(bridge(client, upstream, relay).await)
}

/// Dial the relay server and replay the address block as the first bytes.
async fn connect_to_server(raw: &RawAddress, server: &str) -> proto::Result<TcpStream> {
    let mut upstream = TcpStream::connect(server)
        .await
        .map_err(|e| Error::dial(server, e))?;
    upstream.write_all(raw.as_bytes()).await?;
    Ok(upstream)
}

fn log_session_error(peer: SocketAddr, e: &Error) {
    match e {
        e if e.is_resource_exhausted() => error!(%peer, "dial error: {}", e),
        Error::Dial { .. } => warn!(%peer, "connect to server: {}", e),
        Error::Protocol(_) => warn!(%peer, "get request error: {}", e),
        Error::Network(_) => debug!(%peer, "client: {}", e),
    }
}
