//! # Monitor Binary Entry Point
//!
//! ```bash
//! cargo run --bin monitor -- --config config/monitor.toml
//! ```
//!
//! Listens for heartbeats on UDP 6000 and queries on TCP 6001 by default.

use clap::Parser;

use micro_cdn::common::config::load_or_default;
use micro_cdn::common::logging::init_logger;
use micro_cdn::monitor::{MonitorConfig, MonitorServer};
use micro_cdn::Shutdown;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (TOML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the heartbeat timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger("MONITOR");

    let args = Args::parse();
    let mut config: MonitorConfig = load_or_default(args.config.as_deref())?;
    if let Some(secs) = args.timeout_secs {
        config.set_heartbeat_timeout_secs(secs);
    }

    let server = MonitorServer::bind(config).await?;
    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("🛑 Shutting down...");
            trigger.trigger();
        }
    });

    server.run(shutdown).await;
    Ok(())
}
