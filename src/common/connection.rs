//! # Line-Framed TCP Connection
//!
//! Wraps a TCP stream for the CDN's text protocol:
//! ```text
//! COMMAND arg1 arg2\n
//! ```
//! Reads are buffered, so after a header line the remaining raw bytes (a file
//! body) must be read through [`LineConnection::reader_mut`], never the bare
//! socket.

use anyhow::{anyhow, bail, Context, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::protocol::END;

/// Longest accepted line, guards against a peer that never sends `\n`.
const MAX_LINE_BYTES: u64 = 64 * 1024;

pub struct LineConnection {
    reader: BufReader<TcpStream>,
    peer: String,
}

impl LineConnection {
    pub fn new(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            reader: BufReader::new(stream),
            peer,
        }
    }

    /// Open a connection, failing if the peer does not accept within `limit`.
    pub async fn connect(address: &str, limit: Duration) -> Result<Self> {
        let stream = timeout(limit, TcpStream::connect(address))
            .await
            .map_err(|_| anyhow!("connect to {} timed out", address))?
            .with_context(|| format!("connecting to {}", address))?;
        Ok(Self::new(stream))
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn peer_ip(&self) -> Option<String> {
        self.reader
            .get_ref()
            .peer_addr()
            .ok()
            .map(|a| a.ip().to_string())
    }

    /// Read one line without its terminator.
    ///
    /// # Returns
    /// - `Ok(Some(line))`: a line (possibly empty)
    /// - `Ok(None)`: the peer closed the connection
    /// - `Err`: I/O error, invalid UTF-8, or an oversized line
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = (&mut self.reader)
            .take(MAX_LINE_BYTES)
            .read_line(&mut line)
            .await?;
        if n == 0 {
            return Ok(None);
        }
        if !line.ends_with('\n') && n as u64 >= MAX_LINE_BYTES {
            bail!("line from {} exceeds {} bytes", self.peer, MAX_LINE_BYTES);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// [`read_line`](Self::read_line) bounded by `limit`.
    pub async fn read_line_timeout(&mut self, limit: Duration) -> Result<Option<String>> {
        timeout(limit, self.read_line())
            .await
            .map_err(|_| anyhow!("read from {} timed out", self.peer))?
    }

    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;
        Ok(())
    }

    /// Send a listing: one line per item followed by `END`.
    pub async fn write_listing<I, T>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: std::fmt::Display,
    {
        let mut body = String::new();
        for item in items {
            body.push_str(&item.to_string());
            body.push('\n');
        }
        body.push_str(END);
        body.push('\n');

        let stream = self.reader.get_mut();
        stream.write_all(body.as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Collect the lines of a listing up to (not including) `END`. `limit`
    /// bounds the whole listing, not each line.
    pub async fn read_listing(&mut self, limit: Duration) -> Result<Vec<String>> {
        let peer = self.peer.clone();
        timeout(limit, self.collect_listing())
            .await
            .map_err(|_| anyhow!("listing from {} timed out", peer))?
    }

    async fn collect_listing(&mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            match self.read_line().await? {
                Some(line) if line.trim() == END => return Ok(lines),
                Some(line) => lines.push(line),
                None => bail!("{} closed the connection before END", self.peer),
            }
        }
    }

    /// Buffered reader for raw bytes following a header line.
    pub fn reader_mut(&mut self) -> &mut BufReader<TcpStream> {
        &mut self.reader
    }

    /// Underlying socket for raw writes.
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        self.reader.get_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (LineConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let client = TcpStream::connect(&addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (LineConnection::new(server), client)
    }

    #[tokio::test]
    async fn reads_lines_and_strips_crlf() {
        let (mut conn, mut client) = pair().await;
        client.write_all(b"HELLO\r\nGET a.txt\n").await.unwrap();
        drop(client);

        assert_eq!(conn.read_line().await.unwrap().as_deref(), Some("HELLO"));
        assert_eq!(conn.read_line().await.unwrap().as_deref(), Some("GET a.txt"));
        assert_eq!(conn.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_times_out_on_silent_peer() {
        let (mut conn, _client) = pair().await;
        let result = conn.read_line_timeout(Duration::from_millis(50)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn listing_round_trips_through_end_marker() {
        let (mut server, client) = pair().await;
        let mut client = LineConnection::new(client);

        server.write_listing(["FILE a 1", "FILE b 2"]).await.unwrap();
        let lines = client.read_listing(Duration::from_secs(1)).await.unwrap();
        assert_eq!(lines, vec!["FILE a 1", "FILE b 2"]);
    }

    #[tokio::test]
    async fn slow_listing_times_out_as_a_whole() {
        let (mut conn, mut client) = pair().await;
        tokio::spawn(async move {
            for i in 0..20 {
                let line = format!("SERVER CS{} 127.0.0.1 7001 0 alive\n", i);
                if client.write_all(line.as_bytes()).await.is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            let _ = client.write_all(b"END\n").await;
        });

        let started = std::time::Instant::now();
        let result = conn.read_listing(Duration::from_millis(200)).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_millis(600));
    }
}
