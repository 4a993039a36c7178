use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use proto::RelayConfig;
use runnel_server::{RelayServer, ServerConfig, DEFAULT_PORT};
use tracing::info;

/// Far end of the runnel tunnel: decodes the replayed address block and
/// relays to the destination.
#[derive(Parser, Debug)]
#[command(name = "runnel-server", version)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    ip: String,

    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Seconds a relay direction may stay silent before the session is closed
    #[arg(long, default_value_t = 30)]
    idle_timeout: u64,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> ServerConfig {
        ServerConfig {
            listen: proto::join_host_port(&self.ip, self.port),
            relay: RelayConfig {
                idle_timeout: Duration::from_secs(self.idle_timeout),
                ..RelayConfig::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    proto::logging::init(args.log_file.as_deref())?;

    let config = args.config();
    info!("ip: {} port: {}", args.ip, args.port);

    let server = RelayServer::bind(&config).await?;
    server.serve().await
}
