//! # Content Server Lifecycle
//!
//! 1. Build the catalog from storage (seeding placeholders if empty)
//! 2. Bind the transfer listener and the heartbeat socket
//! 3. Publish identity and catalog to the Index Server (failure is logged;
//!    the server keeps running, reachable directly but not via the index)
//! 4. Emit heartbeats and serve transfers until shutdown

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};

use super::catalog::Catalog;
use super::config::ContentConfig;
use super::heartbeat::HeartbeatEmitter;
use super::metrics::ConnectionTracker;
use super::registration::{register_with_index, Registration};
use super::transfer::{serve_transfer, TransferOutcome};
use crate::common::connection::LineConnection;
use crate::common::shutdown::Shutdown;

pub struct ContentServer {
    config: ContentConfig,
    catalog: Arc<Catalog>,
    tracker: ConnectionTracker,
    listener: TcpListener,
    heartbeat: HeartbeatEmitter,
}

impl ContentServer {
    pub async fn bind(config: ContentConfig) -> Result<Arc<Self>> {
        info!(
            "🚀 Starting Content Server {} (files in {})",
            config.server_id,
            config.files_dir().display()
        );
        let catalog = Catalog::load(&config.files_dir(), &config.server_id, config.seed_samples)
            .await?;

        let listener = TcpListener::bind(&config.listen_address)
            .await
            .with_context(|| format!("binding {}", config.listen_address))?;
        let tcp_port = listener.local_addr()?.port();

        let udp_address = format!("0.0.0.0:{}", config.udp_port);
        let socket = UdpSocket::bind(&udp_address)
            .await
            .with_context(|| format!("binding heartbeat socket {}", udp_address))?;

        let tracker = ConnectionTracker::new();
        let heartbeat = HeartbeatEmitter::new(
            socket,
            &config.monitor_address,
            &config.server_id,
            &config.advertise_host,
            tcp_port,
            catalog.len() as u32,
            tracker.clone(),
            config.heartbeat_interval(),
        );

        Ok(Arc::new(Self {
            config,
            catalog: Arc::new(catalog),
            tracker,
            listener,
            heartbeat,
        }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.clone()
    }

    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Publish the catalog to the Index Server.
    pub async fn register(&self) -> Result<()> {
        let registration = Registration {
            server_id: &self.config.server_id,
            tcp_port: self.local_addr()?.port(),
            udp_port: self.heartbeat.local_port()?,
            catalog: &self.catalog,
        };
        register_with_index(
            &self.config.index_address,
            self.config.index_timeout(),
            &registration,
        )
        .await
    }

    pub async fn run(self: Arc<Self>, shutdown: Shutdown) {
        if let Err(e) = self.register().await {
            error!(
                "❌ Failed to register with Index Server at {}: {:#}",
                self.config.index_address, e
            );
            warn!("⚠️  Serving without index registration");
        }

        info!(
            "📡 Content Server {} serving on {}",
            self.config.server_id,
            self.local_addr().map(|a| a.to_string()).unwrap_or_default()
        );

        tokio::select! {
            _ = self.heartbeat.run(shutdown.clone()) => {},
            _ = self.clone().accept_transfers(shutdown.clone()) => {},
        }

        info!(
            "👋 Content Server {} stopped ({} transfer(s) served, {} failed)",
            self.config.server_id,
            self.tracker.served(),
            self.tracker.failed()
        );
    }

    async fn accept_transfers(self: Arc<Self>, shutdown: Shutdown) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, addr)) => {
                        let server = self.clone();
                        tokio::spawn(async move {
                            let _active = server.tracker.enter();
                            debug!("🔗 Client connected from {}", addr);
                            server.handle_client(LineConnection::new(socket)).await;
                            debug!("🔌 Client disconnected from {}", addr);
                        });
                    }
                    Err(e) => error!("❌ Accept error: {}", e),
                },
                _ = shutdown.wait() => break,
            }
        }
    }

    async fn handle_client(&self, mut conn: LineConnection) {
        match serve_transfer(&mut conn, &self.catalog, self.config.request_timeout()).await {
            Ok(TransferOutcome::Sent { .. }) => self.tracker.record_served(),
            Ok(_) => {}
            Err(e) => {
                self.tracker.record_failed();
                warn!("⚠️  Transfer to {} failed: {:#}", conn.peer(), e);
            }
        }
    }
}
