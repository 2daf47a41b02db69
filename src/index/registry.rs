//! # Registry Store
//!
//! The Index Server's in-memory catalog: which content servers exist, how
//! loaded they are, and which of them host each file.
//!
//! All state sits behind one lock. Callers never see the maps, only the
//! operations below, so every mutation is serialized against every other and
//! a health merge followed by a selection runs as one unit
//! ([`RegistryStore::refresh_and_select`]).

use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::common::protocol::{current_timestamp, FileLine, Location, ServerLine, ServerStatus};

/// Index-side view of one content server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRecord {
    pub server_id: String,
    pub ip: String,
    pub tcp_port: u16,
    pub udp_port: u16,
    /// Last known active-connection count
    pub load: u32,
    /// Unix timestamp of the last registration, refresh or load update
    pub last_update: u64,
    pub status: ServerStatus,
}

impl ServerRecord {
    pub fn to_line(&self) -> ServerLine {
        ServerLine {
            server_id: self.server_id.clone(),
            ip: self.ip.clone(),
            port: self.tcp_port,
            load: self.load,
            status: self.status,
        }
    }
}

/// A server offering a file, with the size it advertised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHost {
    pub server_id: String,
    pub size: u64,
}

/// Outcome of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub server: ServerRecord,
    pub size: u64,
}

impl Selection {
    pub fn location(&self) -> Location {
        Location {
            ip: self.server.ip.clone(),
            port: self.server.tcp_port,
            server_id: self.server.server_id.clone(),
            size: self.size,
        }
    }
}

#[derive(Debug, Default)]
struct Registry {
    servers: BTreeMap<String, ServerRecord>,
    files: BTreeMap<String, Vec<FileHost>>,
}

impl Registry {
    /// Apply a Monitor `LIST_SERVERS` report to the servers already known.
    fn merge(&mut self, report: &[ServerLine]) {
        let now = current_timestamp();
        for line in report {
            if let Some(record) = self.servers.get_mut(&line.server_id) {
                record.load = line.load;
                record.status = line.status;
                record.last_update = now;
            }
        }
    }

    fn select(&self, file_name: &str) -> Option<Selection> {
        self.files
            .get(file_name)?
            .iter()
            .filter_map(|host| {
                self.servers
                    .get(&host.server_id)
                    .filter(|server| server.status == ServerStatus::Alive)
                    .map(|server| (server, host.size))
            })
            .min_by_key(|(server, _)| server.load)
            .map(|(server, size)| Selection {
                server: server.clone(),
                size,
            })
    }
}

#[derive(Debug, Default)]
pub struct RegistryStore {
    inner: RwLock<Registry>,
}

impl RegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a server record. Re-registration resets load to 0
    /// and status to alive.
    pub async fn register(&self, server_id: &str, ip: &str, tcp_port: u16, udp_port: u16) {
        let record = ServerRecord {
            server_id: server_id.to_string(),
            ip: ip.to_string(),
            tcp_port,
            udp_port,
            load: 0,
            last_update: current_timestamp(),
            status: ServerStatus::Alive,
        };
        self.inner
            .write()
            .await
            .servers
            .insert(server_id.to_string(), record);
    }

    /// Record that `server_id` hosts `file_name`. Returns false when that
    /// server already has an entry for the file.
    pub async fn add_file(&self, server_id: &str, file_name: &str, size: u64) -> bool {
        let mut registry = self.inner.write().await;
        let hosts = registry.files.entry(file_name.to_string()).or_default();
        if hosts.iter().any(|h| h.server_id == server_id) {
            return false;
        }
        hosts.push(FileHost {
            server_id: server_id.to_string(),
            size,
        });
        true
    }

    /// Overwrite the load of a known server. Unknown ids are ignored.
    pub async fn update_load(&self, server_id: &str, load: u32) -> bool {
        let mut registry = self.inner.write().await;
        match registry.servers.get_mut(server_id) {
            Some(record) => {
                record.load = load;
                record.last_update = current_timestamp();
                true
            }
            None => false,
        }
    }

    /// Flip a known server to dead. Returns false if the id is unknown.
    pub async fn mark_dead(&self, server_id: &str) -> bool {
        let mut registry = self.inner.write().await;
        match registry.servers.get_mut(server_id) {
            Some(record) => {
                record.status = ServerStatus::Dead;
                true
            }
            None => false,
        }
    }

    /// Merge `report` (when the Monitor answered) and select under a single
    /// write guard, so no registration or failure notice lands in between.
    pub async fn refresh_and_select(
        &self,
        report: Option<&[ServerLine]>,
        file_name: &str,
    ) -> Option<Selection> {
        let mut registry = self.inner.write().await;
        if let Some(report) = report {
            registry.merge(report);
        }
        registry.select(file_name)
    }

    /// One line per file that has at least one alive host, with that
    /// host's advertised size.
    pub async fn list_files(&self) -> Vec<FileLine> {
        let registry = self.inner.read().await;
        registry
            .files
            .iter()
            .filter_map(|(name, hosts)| {
                hosts
                    .iter()
                    .find(|h| {
                        registry
                            .servers
                            .get(&h.server_id)
                            .is_some_and(|s| s.status == ServerStatus::Alive)
                    })
                    .map(|h| FileLine {
                        name: name.clone(),
                        size: h.size,
                    })
            })
            .collect()
    }

    pub async fn list_servers(&self) -> Vec<ServerRecord> {
        self.inner.read().await.servers.values().cloned().collect()
    }

    pub async fn server(&self, server_id: &str) -> Option<ServerRecord> {
        self.inner.read().await.servers.get(server_id).cloned()
    }

    pub async fn hosts(&self, file_name: &str) -> Vec<FileHost> {
        self.inner
            .read()
            .await
            .files
            .get(file_name)
            .cloned()
            .unwrap_or_default()
    }
}
