//! # CDN Client
//!
//! Retrieves files through the two-hop chain:
//!
//! 1. **Locate**: ask the Index Server `GET <file>`, get back the least-loaded
//!    alive content server
//! 2. **Download**: connect to that server, `GET <file>`, read `OK <size>`
//!    then exactly `size` bytes
//!
//! There is no automatic retry across the hops; a failed lookup or download
//! is reported and the caller decides whether to ask again.

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::common::connection::LineConnection;
use crate::common::protocol::{
    parse_transfer_header, ContentRequest, FileLine, IndexRequest, Location, ServerLine,
    ERR_FILE_NOT_FOUND, WELCOME,
};

/// Why a download from a content server failed.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("content server does not have the file")]
    NotFound,
    #[error("content server answered {0:?}")]
    Rejected(String),
    #[error("received {received} of {expected} bytes")]
    Partial { expected: u64, received: u64 },
}

#[derive(Debug, Clone)]
pub struct CdnClient {
    index_address: String,
    index_timeout: Duration,
    content_timeout: Duration,
}

impl CdnClient {
    pub fn new(index_address: impl Into<String>) -> Self {
        Self {
            index_address: index_address.into(),
            index_timeout: Duration::from_secs(10),
            content_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeouts(mut self, index: Duration, content: Duration) -> Self {
        self.index_timeout = index;
        self.content_timeout = content;
        self
    }

    async fn index_connection(&self) -> Result<LineConnection> {
        LineConnection::connect(&self.index_address, self.index_timeout)
            .await
            .context("contacting Index Server")
    }

    async fn request(&self, conn: &mut LineConnection, request: &IndexRequest) -> Result<String> {
        conn.write_line(&request.to_string()).await?;
        match conn.read_line_timeout(self.index_timeout).await? {
            Some(reply) => Ok(reply),
            None => bail!("Index Server closed the connection"),
        }
    }

    /// `HELLO` handshake; returns the greeting.
    pub async fn hello(&self) -> Result<String> {
        let mut conn = self.index_connection().await?;
        let greeting = self.request(&mut conn, &IndexRequest::Hello).await?;
        if greeting != WELCOME {
            warn!("⚠️  Unexpected greeting: {}", greeting);
        }
        Ok(greeting)
    }

    /// Ask the Index Server where `file_name` lives.
    ///
    /// # Returns
    /// - `Ok(Some(location))`: an alive server holds the file
    /// - `Ok(None)`: `ERROR FILE_NOT_FOUND`
    /// - `Err`: index unreachable or any other reply
    pub async fn locate(&self, file_name: &str) -> Result<Option<Location>> {
        let mut conn = self.index_connection().await?;
        let hello = self.request(&mut conn, &IndexRequest::Hello).await?;
        info!("Index Server says: {}", hello);

        let reply = self
            .request(
                &mut conn,
                &IndexRequest::Get {
                    file_name: file_name.to_string(),
                },
            )
            .await?;
        if reply == ERR_FILE_NOT_FOUND {
            return Ok(None);
        }
        Location::parse(&reply)
            .map(Some)
            .with_context(|| format!("unexpected Index Server reply {:?}", reply))
    }

    /// Download `file_name` from `location` into `dest`.
    ///
    /// A short body fails with [`TransferError::Partial`]; the partial file
    /// is left on disk for inspection.
    pub async fn download(&self, location: &Location, file_name: &str, dest: &Path) -> Result<u64> {
        let address = location.address();
        let mut conn = LineConnection::connect(&address, self.content_timeout)
            .await
            .with_context(|| format!("contacting content server {}", location.server_id))?;
        info!(
            "Connected to Content Server {} at {}",
            location.server_id, address
        );

        let request = ContentRequest::Get {
            file_name: file_name.to_string(),
        };
        conn.write_line(&request.to_string()).await?;

        let header = conn
            .read_line_timeout(self.content_timeout)
            .await?
            .unwrap_or_default();
        if header == ERR_FILE_NOT_FOUND {
            return Err(TransferError::NotFound.into());
        }
        let expected = parse_transfer_header(&header)
            .map_err(|_| TransferError::Rejected(header.clone()))?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = File::create(dest)
            .await
            .with_context(|| format!("creating {}", dest.display()))?;

        let body = conn.reader_mut().take(expected);
        let received = tokio::time::timeout(self.content_timeout, copy_body(body, &mut file))
            .await
            .context("download timed out")??;
        file.flush().await?;

        if received != expected {
            return Err(TransferError::Partial { expected, received }.into());
        }
        info!(
            "Successfully downloaded: {} ({} bytes)",
            dest.display(),
            received
        );
        Ok(received)
    }

    /// Locate then download into `output_dir/<file_name>`.
    ///
    /// Returns whether the file arrived complete; the reason for a failure
    /// is logged.
    pub async fn fetch(&self, file_name: &str, output_dir: &Path) -> bool {
        info!("Requesting file: {}", file_name);
        let location = match self.locate(file_name).await {
            Ok(Some(location)) => location,
            Ok(None) => {
                error!("❌ Could not locate file {}: not found", file_name);
                return false;
            }
            Err(e) => {
                error!("❌ Could not locate file {}: {:#}", file_name, e);
                return false;
            }
        };
        info!(
            "File located on server {} ({}), size: {} bytes",
            location.server_id,
            location.address(),
            location.size
        );

        let dest: PathBuf = output_dir.join(file_name);
        match self.download(&location, file_name, &dest).await {
            Ok(_) => true,
            Err(e) => {
                error!("❌ Download of {} failed: {:#}", file_name, e);
                false
            }
        }
    }

    pub async fn list_files(&self) -> Result<Vec<FileLine>> {
        let mut conn = self.index_connection().await?;
        conn.write_line(&IndexRequest::ListFiles.to_string())
            .await?;
        let lines = conn.read_listing(self.index_timeout).await?;
        Ok(lines
            .iter()
            .filter_map(|line| FileLine::parse(line).ok())
            .collect())
    }

    pub async fn list_servers(&self) -> Result<Vec<ServerLine>> {
        let mut conn = self.index_connection().await?;
        conn.write_line(&IndexRequest::ListServers.to_string())
            .await?;
        let lines = conn.read_listing(self.index_timeout).await?;
        Ok(lines
            .iter()
            .filter_map(|line| ServerLine::parse(line).ok())
            .collect())
    }
}

async fn copy_body<R>(mut body: R, file: &mut File) -> Result<u64>
where
    R: tokio::io::AsyncRead + Unpin,
{
    Ok(tokio::io::copy(&mut body, file).await?)
}
