//! # Content Server Binary Entry Point
//!
//! ```bash
//! cargo run --bin content_server -- --id CS1 --tcp-port 7001 --udp-port 7002
//! cargo run --bin content_server -- --config config/cs2.toml
//! ```
//!
//! Command-line flags override values from the configuration file.

use clap::Parser;
use std::path::PathBuf;

use micro_cdn::common::config::load_or_default;
use micro_cdn::common::logging::init_logger;
use micro_cdn::content::{ContentConfig, ContentServer};
use micro_cdn::Shutdown;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (TOML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Server ID, e.g. CS1
    #[arg(long)]
    id: Option<String>,

    /// Transfer service port
    #[arg(long)]
    tcp_port: Option<u16>,

    /// Heartbeat socket port
    #[arg(long)]
    udp_port: Option<u16>,

    /// Directory containing files to serve (default: files_<id>)
    #[arg(long)]
    files_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger("CONTENT");

    let args = Args::parse();
    let mut config: ContentConfig = load_or_default(args.config.as_deref())?;
    if let Some(id) = args.id {
        config.server_id = id;
    }
    if let Some(port) = args.tcp_port {
        config.listen_address = format!("0.0.0.0:{}", port);
    }
    if let Some(port) = args.udp_port {
        config.udp_port = port;
    }
    if args.files_dir.is_some() {
        config.files_dir = args.files_dir;
    }

    let server = ContentServer::bind(config).await?;
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
