//! One-shot catalog publication to the Index Server:
//!
//! ```text
//! CS -> IDX  REGISTER <id> <tcp_port> <udp_port>
//! IDX -> CS  OK REGISTERED
//! CS -> IDX  ADD_FILE <id> <name> <size>     (per file, no reply)
//! CS -> IDX  DONE_FILES
//! IDX -> CS  OK FILES_ADDED
//! ```

use anyhow::{bail, Result};
use log::info;
use std::time::Duration;

use super::catalog::Catalog;
use crate::common::connection::LineConnection;
use crate::common::protocol::{IndexRequest, OK_FILES_ADDED, OK_REGISTERED};

pub struct Registration<'a> {
    pub server_id: &'a str,
    pub tcp_port: u16,
    pub udp_port: u16,
    pub catalog: &'a Catalog,
}

pub async fn register_with_index(
    index_address: &str,
    limit: Duration,
    registration: &Registration<'_>,
) -> Result<()> {
    let mut conn = LineConnection::connect(index_address, limit).await?;

    let register = IndexRequest::Register {
        server_id: registration.server_id.to_string(),
        tcp_port: registration.tcp_port,
        udp_port: registration.udp_port,
    };
    conn.write_line(&register.to_string()).await?;
    expect_reply(&mut conn, limit, OK_REGISTERED).await?;
    info!("✅ Registration response: {}", OK_REGISTERED);

    for (name, size) in registration.catalog.entries() {
        let add = IndexRequest::AddFile {
            server_id: registration.server_id.to_string(),
            file_name: name.to_string(),
            size,
        };
        conn.write_line(&add.to_string()).await?;
    }
    conn.write_line(&IndexRequest::DoneFiles.to_string()).await?;
    expect_reply(&mut conn, limit, OK_FILES_ADDED).await?;
    info!(
        "📚 Published {} file(s) to Index Server",
        registration.catalog.len()
    );
    Ok(())
}

async fn expect_reply(conn: &mut LineConnection, limit: Duration, expected: &str) -> Result<()> {
    match conn.read_line_timeout(limit).await? {
        Some(reply) if reply == expected => Ok(()),
        Some(reply) => bail!("expected {:?}, Index Server said {:?}", expected, reply),
        None => bail!("Index Server closed the connection before {:?}", expected),
    }
}
