use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use proto::RelayConfig;
use runnel_agent::{Agent, AgentConfig, DEFAULT_LISTEN};
use tracing::info;

/// Local SOCKS5 endpoint of the runnel tunnel.
#[derive(Parser, Debug)]
#[command(name = "runnel-agent", version)]
struct Args {
    /// Relay server ip
    #[arg(long, default_value = "localhost")]
    ip: String,

    /// Relay server port
    #[arg(long, default_value_t = 1024)]
    port: u16,

    /// Local SOCKS5 listen address
    #[arg(long, default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Seconds a relay direction may stay silent before the session is closed
    #[arg(long, default_value_t = 30)]
    idle_timeout: u64,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> AgentConfig {
        AgentConfig {
            listen: self.listen.clone(),
            server: proto::join_host_port(&self.ip, self.port),
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

    let agent = Agent::bind(&config).await?;
    agent.serve().await
}
