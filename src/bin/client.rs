//! # Client Binary Entry Point
//!
//! ```bash
//! cargo run --bin client -- get shared_file.txt
//! cargo run --bin client -- list
//! cargo run --bin client -- servers
//! ```
//!
//! `get` exits with status 1 when the file could not be located or the
//! download was incomplete.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use micro_cdn::client::CdnClient;
use micro_cdn::common::logging::init_logger;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Index Server address
    #[arg(long, default_value = "127.0.0.1:5000")]
    index: String,

    /// Download directory
    #[arg(long, default_value = "downloads")]
    output_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a file
    Get { file_name: String },
    /// List available files
    List,
    /// List registered servers
    Servers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger("CLIENT");

    let args = Args::parse();
    let client = CdnClient::new(args.index);

    match args.command {
        Command::Get { file_name } => {
            if !client.fetch(&file_name, &args.output_dir).await {
                std::process::exit(1);
            }
        }
        Command::List => {
            println!("Available files:");
            for file in client.list_files().await? {
                println!("  {} ({} bytes)", file.name, file.size);
            }
        }
        Command::Servers => {
            println!("Registered servers:");
            for server in client.list_servers().await? {
                println!(
                    "  {}: {}:{} (load={}, status={})",
                    server.server_id, server.ip, server.port, server.load, server.status
                );
            }
        }
    }
    Ok(())
}
