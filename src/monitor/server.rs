//! # Monitor Server
//!
//! Tracks content-server liveness. Three tasks share one [`MonitorStore`]:
//!
//! - **Heartbeat listener** (UDP): one datagram per heartbeat, no reply
//! - **Liveness checker**: ages out silent servers and pushes `SERVER_DOWN`
//! - **Query service** (TCP): `LIST_SERVERS`, `REGISTER_INDEX`, `PING`,
//!   several commands per connection

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};

use super::config::MonitorConfig;
use super::liveness::LivenessChecker;
use super::store::{HeartbeatOutcome, MonitorStore};
use crate::common::connection::LineConnection;
use crate::common::protocol::{Heartbeat, MonitorRequest, OK_INDEX_REGISTERED, PONG};
use crate::common::shutdown::Shutdown;

/// Largest heartbeat datagram accepted.
const MAX_DATAGRAM: usize = 1024;

pub struct MonitorServer {
    config: MonitorConfig,
    store: Arc<MonitorStore>,
    udp: UdpSocket,
    tcp: TcpListener,
}

impl MonitorServer {
    pub async fn bind(config: MonitorConfig) -> Result<Arc<Self>> {
        let udp = UdpSocket::bind(&config.udp_address)
            .await
            .with_context(|| format!("binding heartbeat socket {}", config.udp_address))?;
        let tcp = TcpListener::bind(&config.tcp_address)
            .await
            .with_context(|| format!("binding query listener {}", config.tcp_address))?;

        Ok(Arc::new(Self {
            config,
            store: Arc::new(MonitorStore::new()),
            udp,
            tcp,
        }))
    }

    pub fn udp_addr(&self) -> Result<SocketAddr> {
        Ok(self.udp.local_addr()?)
    }

    pub fn tcp_addr(&self) -> Result<SocketAddr> {
        Ok(self.tcp.local_addr()?)
    }

    pub fn store(&self) -> Arc<MonitorStore> {
        self.store.clone()
    }

    pub async fn run(self: Arc<Self>, shutdown: Shutdown) {
        info!(
            "🚀 Monitor up: heartbeats on {}, queries on {}, timeout {:?}",
            self.udp_addr().map(|a| a.to_string()).unwrap_or_default(),
            self.tcp_addr().map(|a| a.to_string()).unwrap_or_default(),
            self.config.heartbeat_timeout()
        );

        let checker = LivenessChecker::new(
            self.store.clone(),
            self.config.check_interval(),
            self.config.heartbeat_timeout(),
            self.config.notify_timeout(),
        );

        tokio::select! {
            _ = self.clone().receive_heartbeats(shutdown.clone()) => {},
            _ = checker.run(shutdown.clone()) => {},
            _ = self.clone().accept_queries(shutdown.clone()) => {},
        }
        info!("👋 Monitor stopped");
    }

    // ========================================================================
    // HEARTBEATS (UDP)
    // ========================================================================

    async fn receive_heartbeats(self: Arc<Self>, shutdown: Shutdown) {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = tokio::select! {
                received = self.udp.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        error!("❌ Heartbeat receive error: {}", e);
                        continue;
                    }
                },
                _ = shutdown.wait() => break,
            };

            let text = String::from_utf8_lossy(&buf[..len]);
            match Heartbeat::parse(text.trim()) {
                Ok(heartbeat) => self.record_heartbeat(&heartbeat).await,
                Err(e) => warn!("⚠️  Bad heartbeat from {}: {}", from, e),
            }
        }
    }

    async fn record_heartbeat(&self, heartbeat: &Heartbeat) {
        match self.store.on_heartbeat(heartbeat).await {
            HeartbeatOutcome::Recovered => {
                info!("🎉 Server {} came back online!", heartbeat.server_id)
            }
            HeartbeatOutcome::Joined => info!(
                "👋 First heartbeat from {} ({}:{})",
                heartbeat.server_id, heartbeat.ip, heartbeat.tcp_port
            ),
            HeartbeatOutcome::Refreshed => debug!(
                "💓 Heartbeat from {}: load={}, files={}",
                heartbeat.server_id, heartbeat.load, heartbeat.num_files
            ),
        }
    }

    // ========================================================================
    // QUERIES (TCP)
    // ========================================================================

    async fn accept_queries(self: Arc<Self>, shutdown: Shutdown) {
        loop {
            tokio::select! {
                accepted = self.tcp.accept() => match accepted {
                    Ok((socket, addr)) => {
                        debug!("🔗 TCP connection from {}", addr);
                        let server = self.clone();
                        tokio::spawn(async move {
                            let mut conn = LineConnection::new(socket);
                            if let Err(e) = server.serve_queries(&mut conn).await {
                                warn!("⚠️  Session with {} ended: {:#}", conn.peer(), e);
                            }
                            debug!("🔌 TCP connection from {} closed", addr);
                        });
                    }
                    Err(e) => error!("❌ Accept error: {}", e),
                },
                _ = shutdown.wait() => break,
            }
        }
    }

    async fn serve_queries(&self, conn: &mut LineConnection) -> Result<()> {
        while let Some(line) = conn.read_line_timeout(self.config.session_timeout()).await? {
            debug!("📨 Received: {}", line);
            let request = match MonitorRequest::parse(&line) {
                Ok(request) => request,
                Err(e) => {
                    conn.write_line(e.response()).await?;
                    continue;
                }
            };

            match request {
                MonitorRequest::ListServers => {
                    let servers = self.store.list_servers().await;
                    conn.write_listing(servers.iter().map(|r| r.to_line()))
                        .await?;
                }
                MonitorRequest::RegisterIndex { ip, port } => {
                    self.store.register_notification_target(&ip, port).await;
                    info!("🤝 Index Server registered at {}:{}", ip, port);
                    conn.write_line(OK_INDEX_REGISTERED).await?;
                }
                MonitorRequest::Ping => conn.write_line(PONG).await?,
            }
        }
        Ok(())
    }
}
