//! # Index Server
//!
//! Locates files for clients. Three concerns run side by side:
//!
//! ### 1. Shared query/registration port
//! - The first line of each connection decides its role: `REGISTER` opens a
//!   content-server registration session, anything else a client session.
//!   The line is handed to the chosen session, so nothing is lost.
//!
//! ### 2. Lookup with health refresh
//! - Every `GET` first pulls `LIST_SERVERS` from the Monitor (outside the
//!   registry lock), then merges and selects under one guard.
//! - An unreachable Monitor only means selection runs on stale data.
//!
//! ### 3. Failure notifications
//! - A second listener accepts one-shot `SERVER_DOWN` notices and marks the
//!   server dead.

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::config::IndexConfig;
use super::monitor_client::MonitorClient;
use super::registry::{RegistryStore, Selection};
use crate::common::connection::LineConnection;
use crate::common::protocol::{
    opens_registration, IndexRequest, ServerDown, ERR_FILE_NOT_FOUND, ERR_UNKNOWN_COMMAND, OK,
    OK_FILES_ADDED, OK_REGISTERED, WELCOME,
};
use crate::common::shutdown::Shutdown;

pub struct IndexServer {
    config: IndexConfig,
    registry: Arc<RegistryStore>,
    monitor: MonitorClient,
    listener: TcpListener,
    notify_listener: TcpListener,
}

impl IndexServer {
    /// Bind both listeners. Nothing is served until [`IndexServer::run`].
    pub async fn bind(config: IndexConfig) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(&config.listen_address)
            .await
            .with_context(|| format!("binding {}", config.listen_address))?;
        let notify_address = config.notify_address()?;
        let notify_listener = TcpListener::bind(&notify_address)
            .await
            .with_context(|| format!("binding notification listener {}", notify_address))?;
        let monitor = MonitorClient::new(&config.monitor_address, config.monitor_timeout());

        Ok(Arc::new(Self {
            config,
            registry: Arc::new(RegistryStore::new()),
            monitor,
            listener,
            notify_listener,
        }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn notify_addr(&self) -> Result<SocketAddr> {
        Ok(self.notify_listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<RegistryStore> {
        self.registry.clone()
    }

    /// Serve until `shutdown` fires.
    pub async fn run(self: Arc<Self>, shutdown: Shutdown) {
        info!(
            "🚀 Index Server listening on {} (notifications on {})",
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_default(),
            self.notify_addr()
                .map(|a| a.to_string())
                .unwrap_or_default()
        );

        // Subscribing may wait on a slow Monitor; queries are served meanwhile.
        if self.config.register_with_monitor {
            let server = self.clone();
            tokio::spawn(async move { server.subscribe_to_monitor().await });
        }

        let query_task = self.clone().accept_queries(shutdown.clone());
        let notify_task = self.clone().accept_notifications(shutdown.clone());

        tokio::select! {
            _ = query_task => {},
            _ = notify_task => {},
            _ = shutdown.wait() => {},
        }
        info!("👋 Index Server stopped");
    }

    /// Lookup used by `GET`: refresh from the Monitor, then pick the
    /// least-loaded alive host.
    pub async fn select_best(&self, file_name: &str) -> Option<Selection> {
        let report = match self.monitor.list_servers().await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(
                    "⚠️  Could not reach Monitor at {}: {:#}",
                    self.monitor.address(),
                    e
                );
                None
            }
        };
        self.registry
            .refresh_and_select(report.as_deref(), file_name)
            .await
    }

    async fn subscribe_to_monitor(&self) {
        let port = match self.notify_addr() {
            Ok(addr) => addr.port(),
            Err(e) => {
                error!("❌ Notification listener has no address: {}", e);
                return;
            }
        };
        match self
            .monitor
            .register_index(&self.config.advertise_host, port)
            .await
        {
            Ok(()) => info!(
                "🤝 Registered for failure notifications at {}:{}",
                self.config.advertise_host, port
            ),
            Err(e) => warn!("⚠️  Could not register with Monitor: {:#}", e),
        }
    }

    // ========================================================================
    // SHARED PORT: clients and registering content servers
    // ========================================================================

    async fn accept_queries(self: Arc<Self>, shutdown: Shutdown) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, addr)) => {
                        debug!("🔗 Connection from {}", addr);
                        let server = self.clone();
                        tokio::spawn(async move {
                            server.handle_connection(LineConnection::new(socket)).await;
                        });
                    }
                    Err(e) => error!("❌ Accept error: {}", e),
                },
                _ = shutdown.wait() => break,
            }
        }
    }

    async fn handle_connection(&self, mut conn: LineConnection) {
        let first = match conn.read_line_timeout(self.config.dispatch_timeout()).await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                warn!("⚠️  Dropping connection from {}: {:#}", conn.peer(), e);
                return;
            }
        };

        let peer = conn.peer().to_string();
        let result = if opens_registration(&first) {
            info!("📥 Content Server connection from {}", peer);
            self.registration_session(&mut conn, first).await
        } else {
            debug!("👤 Client connection from {}", peer);
            self.client_session(&mut conn, first).await
        };

        if let Err(e) = result {
            warn!("⚠️  Session with {} ended: {:#}", peer, e);
        }
        debug!("🔌 Connection from {} closed", peer);
    }

    async fn client_session(&self, conn: &mut LineConnection, first: String) -> Result<()> {
        let mut line = first;
        loop {
            debug!("📨 Client request: {}", line);
            self.answer_client(conn, &line).await?;

            line = match conn.read_line_timeout(self.config.client_timeout()).await? {
                Some(line) => line,
                None => return Ok(()),
            };
        }
    }

    async fn answer_client(&self, conn: &mut LineConnection, line: &str) -> Result<()> {
        let request = match IndexRequest::parse(line) {
            Ok(request) => request,
            Err(e) => {
                debug!("❓ {} from {}", e, conn.peer());
                return conn.write_line(e.response()).await;
            }
        };

        match request {
            IndexRequest::Hello => conn.write_line(WELCOME).await,
            IndexRequest::Get { file_name } => match self.select_best(&file_name).await {
                Some(selection) => {
                    let location = selection.location();
                    info!(
                        "📌 {} -> {} at {} (load {})",
                        file_name,
                        location.server_id,
                        location.address(),
                        selection.server.load
                    );
                    conn.write_line(&location.to_string()).await
                }
                None => {
                    info!("🔍 File not found: {}", file_name);
                    conn.write_line(ERR_FILE_NOT_FOUND).await
                }
            },
            IndexRequest::ListFiles => {
                let files = self.registry.list_files().await;
                conn.write_listing(files).await
            }
            IndexRequest::ListServers => {
                let servers = self.registry.list_servers().await;
                conn.write_listing(servers.iter().map(|s| s.to_line())).await
            }
            IndexRequest::Register { .. }
            | IndexRequest::AddFile { .. }
            | IndexRequest::DoneFiles
            | IndexRequest::UpdateLoad { .. } => conn.write_line(ERR_UNKNOWN_COMMAND).await,
        }
    }

    async fn registration_session(&self, conn: &mut LineConnection, first: String) -> Result<()> {
        let ip = conn.peer_ip().unwrap_or_else(|| "127.0.0.1".to_string());
        let mut current: Option<String> = None;
        let mut line = first;

        loop {
            debug!("📨 Received: {}", line);
            match IndexRequest::parse(&line) {
                Ok(IndexRequest::Register {
                    server_id,
                    tcp_port,
                    udp_port,
                }) => {
                    self.registry
                        .register(&server_id, &ip, tcp_port, udp_port)
                        .await;
                    info!(
                        "✅ Registered Content Server {} at {}:{}",
                        server_id, ip, tcp_port
                    );
                    current = Some(server_id);
                    conn.write_line(OK_REGISTERED).await?;
                }
                Ok(IndexRequest::AddFile {
                    server_id,
                    file_name,
                    size,
                }) => {
                    if self.registry.add_file(&server_id, &file_name, size).await {
                        info!(
                            "📄 Added file: {} ({} bytes) from {}",
                            file_name, size, server_id
                        );
                    }
                }
                Ok(IndexRequest::DoneFiles) => {
                    info!(
                        "📚 File registration complete for {}",
                        current.as_deref().unwrap_or("unregistered server")
                    );
                    conn.write_line(OK_FILES_ADDED).await?;
                }
                Ok(IndexRequest::UpdateLoad { server_id, load }) => {
                    if self.registry.update_load(&server_id, load).await {
                        debug!("📊 Load of {} is now {}", server_id, load);
                    }
                    conn.write_line(OK).await?;
                }
                Ok(_) => conn.write_line(ERR_UNKNOWN_COMMAND).await?,
                // ADD_FILE has no reply; answering a bad one would be read as
                // the DONE_FILES acknowledgement.
                Err(e) if line.split_whitespace().next() == Some("ADD_FILE") => {
                    warn!("⚠️  Ignoring {}: {:?}", e, line);
                }
                Err(e) => conn.write_line(e.response()).await?,
            }

            line = match conn.read_line_timeout(self.config.client_timeout()).await? {
                Some(line) => line,
                None => return Ok(()),
            };
        }
    }

    // ========================================================================
    // FAILURE NOTIFICATIONS from the Monitor
    // ========================================================================

    async fn accept_notifications(self: Arc<Self>, shutdown: Shutdown) {
        loop {
            tokio::select! {
                accepted = self.notify_listener.accept() => match accepted {
                    Ok((socket, _)) => {
                        let server = self.clone();
                        tokio::spawn(async move {
                            let mut conn = LineConnection::new(socket);
                            if let Err(e) = server.handle_notification(&mut conn).await {
                                warn!("⚠️  Bad notification from {}: {:#}", conn.peer(), e);
                            }
                        });
                    }
                    Err(e) => error!("❌ Notification accept error: {}", e),
                },
                _ = shutdown.wait() => break,
            }
        }
    }

    async fn handle_notification(&self, conn: &mut LineConnection) -> Result<()> {
        let Some(line) = conn
            .read_line_timeout(self.config.monitor_timeout())
            .await?
        else {
            return Ok(());
        };
        info!("🔔 Monitor notification: {}", line);

        let notice = ServerDown::parse(&line)?;
        if self.registry.mark_dead(&notice.server_id).await {
            warn!(
                "💀 Marked server {} as DEAD based on Monitor notification",
                notice.server_id
            );
        } else {
            debug!("Notification for unknown server {}", notice.server_id);
        }
        Ok(())
    }
}
