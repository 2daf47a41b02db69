//! # Index Server Binary Entry Point
//!
//! ```bash
//! cargo run --bin index_server -- --config config/index.toml
//! ```
//!
//! The server will:
//! 1. Load configuration (or use defaults: port 5000, Monitor at 127.0.0.1:6001)
//! 2. Bind the query port and the notification listener (port + 1)
//! 3. Subscribe to the Monitor's failure notifications
//! 4. Serve until Ctrl-C

use clap::Parser;

use micro_cdn::common::config::load_or_default;
use micro_cdn::common::logging::init_logger;
use micro_cdn::index::{IndexConfig, IndexServer};
use micro_cdn::Shutdown;

/// Command-line arguments for the index server binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (TOML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the listen address, e.g. 0.0.0.0:5000
    #[arg(long)]
    listen: Option<String>,

    /// Override the Monitor query address, e.g. 127.0.0.1:6001
    #[arg(long)]
    monitor: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger("INDEX");

    let args = Args::parse();
    let mut config: IndexConfig = load_or_default(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.listen_address = listen;
    }
    if let Some(monitor) = args.monitor {
        config.monitor_address = monitor;
    }

    let server = IndexServer::bind(config).await?;
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
