//! Index Server's side of the Index ↔ Monitor link: pulling the health
//! report used before every selection, and subscribing to failure notices.

use anyhow::{bail, Result};
use log::{debug, warn};
use std::time::Duration;

use crate::common::connection::LineConnection;
use crate::common::protocol::{MonitorRequest, ServerLine, OK_INDEX_REGISTERED};

#[derive(Debug, Clone)]
pub struct MonitorClient {
    address: String,
    timeout: Duration,
}

impl MonitorClient {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Fetch the Monitor's current view of every content server.
    /// Malformed lines are skipped.
    pub async fn list_servers(&self) -> Result<Vec<ServerLine>> {
        let mut conn = LineConnection::connect(&self.address, self.timeout).await?;
        conn.write_line(&MonitorRequest::ListServers.to_string())
            .await?;
        let lines = conn.read_listing(self.timeout).await?;

        let mut report = Vec::with_capacity(lines.len());
        for line in lines {
            match ServerLine::parse(&line) {
                Ok(server) => report.push(server),
                Err(e) => warn!("⚠️  Ignoring monitor line {:?}: {}", line, e),
            }
        }
        debug!("📋 Monitor reported {} server(s)", report.len());
        Ok(report)
    }

    /// Ask the Monitor to deliver `SERVER_DOWN` notices to `ip:port`.
    pub async fn register_index(&self, ip: &str, port: u16) -> Result<()> {
        let mut conn = LineConnection::connect(&self.address, self.timeout).await?;
        let request = MonitorRequest::RegisterIndex {
            ip: ip.to_string(),
            port,
        };
        conn.write_line(&request.to_string()).await?;
        match conn.read_line_timeout(self.timeout).await? {
            Some(reply) if reply == OK_INDEX_REGISTERED => Ok(()),
            Some(reply) => bail!("monitor rejected registration: {}", reply),
            None => bail!("monitor closed the connection during registration"),
        }
    }
}
