//! Transfer service: exactly one request per connection.
//!
//! ```text
//! C -> CS  GET <name>
//! CS -> C  OK <size>\n<size raw bytes>     then close
//!          ERROR FILE_NOT_FOUND | ERROR INVALID_FORMAT | ERROR UNKNOWN_COMMAND
//! ```

use anyhow::Result;
use log::{info, warn};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::catalog::Catalog;
use crate::common::connection::LineConnection;
use crate::common::protocol::{ContentRequest, ERR_FILE_NOT_FOUND};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The peer closed without sending a request
    Idle,
    Sent { file_name: String, bytes: u64 },
    NotFound { file_name: String },
    Rejected,
}

/// Answer the single request on `conn`. The caller closes the connection.
pub async fn serve_transfer(
    conn: &mut LineConnection,
    catalog: &Catalog,
    limit: Duration,
) -> Result<TransferOutcome> {
    let Some(line) = conn.read_line_timeout(limit).await? else {
        return Ok(TransferOutcome::Idle);
    };
    info!("📨 Client request: {}", line);

    let file_name = match ContentRequest::parse(&line) {
        Ok(ContentRequest::Get { file_name }) => file_name,
        Err(e) => {
            conn.write_line(e.response()).await?;
            return Ok(TransferOutcome::Rejected);
        }
    };

    let Some(path) = catalog.path(&file_name) else {
        info!("🔍 File not found: {}", file_name);
        conn.write_line(ERR_FILE_NOT_FOUND).await?;
        return Ok(TransferOutcome::NotFound { file_name });
    };

    let mut file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            warn!("⚠️  Catalogued file {} unreadable: {}", path.display(), e);
            conn.write_line(ERR_FILE_NOT_FOUND).await?;
            return Ok(TransferOutcome::NotFound { file_name });
        }
    };
    // Advertise what is on disk now, so the header always matches the body.
    let size = file.metadata().await?.len();

    conn.write_line(&format!("OK {}", size)).await?;
    let stream = conn.stream_mut();
    let bytes = tokio::time::timeout(
        limit,
        tokio::io::copy(&mut (&mut file).take(size), stream),
    )
    .await??;
    stream.flush().await?;

    info!("📤 Sent file: {} ({} bytes)", file_name, bytes);
    Ok(TransferOutcome::Sent { file_name, bytes })
}
