//! # Monitor Store
//!
//! Heartbeat state per content server plus the single notification target.
//!
//! Per-server state machine:
//! ```text
//!            first heartbeat
//!   (none) ------------------> alive
//!   alive  --(timeout elapsed)--> dead     (one notification)
//!   dead   --(heartbeat)-------> alive     (logged, no notification)
//! ```

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::common::protocol::{Heartbeat, ServerLine, ServerStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatRecord {
    pub server_id: String,
    pub ip: String,
    pub tcp_port: u16,
    pub load: u32,
    pub num_files: u32,
    pub last_seen: Instant,
    pub status: ServerStatus,
}

impl HeartbeatRecord {
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

/// What a heartbeat did to the server's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// First heartbeat ever seen for this id
    Joined,
    /// Server was alive and stays alive
    Refreshed,
    /// Server was dead and came back online
    Recovered,
}

/// Where `SERVER_DOWN` notices go. At most one; a new registration replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTarget {
    pub ip: String,
    pub port: u16,
}

impl NotificationTarget {
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Default)]
pub struct MonitorStore {
    servers: RwLock<BTreeMap<String, HeartbeatRecord>>,
    target: RwLock<Option<NotificationTarget>>,
}

impl MonitorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn on_heartbeat(&self, heartbeat: &Heartbeat) -> HeartbeatOutcome {
        self.on_heartbeat_at(heartbeat, Instant::now()).await
    }

    /// Upsert the record as alive with `last_seen = now`.
    pub async fn on_heartbeat_at(&self, heartbeat: &Heartbeat, now: Instant) -> HeartbeatOutcome {
        let mut servers = self.servers.write().await;
        let outcome = match servers.get(&heartbeat.server_id).map(|r| r.status) {
            None => HeartbeatOutcome::Joined,
            Some(ServerStatus::Alive) => HeartbeatOutcome::Refreshed,
            Some(ServerStatus::Dead) => HeartbeatOutcome::Recovered,
        };
        servers.insert(
            heartbeat.server_id.clone(),
            HeartbeatRecord {
                server_id: heartbeat.server_id.clone(),
                ip: heartbeat.ip.clone(),
                tcp_port: heartbeat.tcp_port,
                load: heartbeat.load,
                num_files: heartbeat.num_files,
                last_seen: now,
                status: ServerStatus::Alive,
            },
        );
        outcome
    }

    /// Flip every alive server silent for longer than `timeout` to dead.
    ///
    /// Returns the ids that transitioned in this call, each paired with how
    /// long it had been silent. A server already dead is never returned again.
    pub async fn expire_stale(&self, now: Instant, timeout: Duration) -> Vec<(String, Duration)> {
        let mut servers = self.servers.write().await;
        let mut expired = Vec::new();
        for (server_id, record) in servers.iter_mut() {
            if record.status != ServerStatus::Alive {
                continue;
            }
            let silent = now.saturating_duration_since(record.last_seen);
            if silent > timeout {
                record.status = ServerStatus::Dead;
                expired.push((server_id.clone(), silent));
            }
        }
        expired
    }

    pub async fn register_notification_target(&self, ip: &str, port: u16) {
        *self.target.write().await = Some(NotificationTarget {
            ip: ip.to_string(),
            port,
        });
    }

    pub async fn notification_target(&self) -> Option<NotificationTarget> {
        self.target.read().await.clone()
    }

    pub async fn list_servers(&self) -> Vec<HeartbeatRecord> {
        self.servers.read().await.values().cloned().collect()
    }

    pub async fn server(&self, server_id: &str) -> Option<HeartbeatRecord> {
        self.servers.read().await.get(server_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(8);

    fn heartbeat(id: &str, load: u32) -> Heartbeat {
        Heartbeat {
            server_id: id.to_string(),
            ip: "127.0.0.1".to_string(),
            tcp_port: 7001,
            load,
            num_files: 3,
        }
    }

    #[tokio::test]
    async fn first_heartbeat_creates_alive_record() {
        let store = MonitorStore::new();
        assert!(store.server("CS1").await.is_none());

        let outcome = store.on_heartbeat(&heartbeat("CS1", 2)).await;
        assert_eq!(outcome, HeartbeatOutcome::Joined);

        let record = store.server("CS1").await.unwrap();
        assert_eq!(record.status, ServerStatus::Alive);
        assert_eq!(record.load, 2);
        assert_eq!(record.num_files, 3);
    }

    #[tokio::test]
    async fn silent_server_expires_exactly_once() {
        let store = MonitorStore::new();
        let start = Instant::now();
        store.on_heartbeat_at(&heartbeat("CS1", 0), start).await;

        assert!(store
            .expire_stale(start + Duration::from_secs(5), TIMEOUT)
            .await
            .is_empty());

        let expired = store
            .expire_stale(start + Duration::from_secs(9), TIMEOUT)
            .await;
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, "CS1");
        assert_eq!(
            store.server("CS1").await.unwrap().status,
            ServerStatus::Dead
        );

        let again = store
            .expire_stale(start + Duration::from_secs(20), TIMEOUT)
            .await;
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn exactly_timeout_is_not_yet_dead() {
        let store = MonitorStore::new();
        let start = Instant::now();
        store.on_heartbeat_at(&heartbeat("CS1", 0), start).await;

        assert!(store.expire_stale(start + TIMEOUT, TIMEOUT).await.is_empty());
    }

    #[tokio::test]
    async fn heartbeat_after_death_recovers() {
        let store = MonitorStore::new();
        let start = Instant::now();
        store.on_heartbeat_at(&heartbeat("CS1", 0), start).await;
        store
            .expire_stale(start + Duration::from_secs(9), TIMEOUT)
            .await;

        let outcome = store
            .on_heartbeat_at(&heartbeat("CS1", 4), start + Duration::from_secs(10))
            .await;
        assert_eq!(outcome, HeartbeatOutcome::Recovered);
        let record = store.server("CS1").await.unwrap();
        assert_eq!(record.status, ServerStatus::Alive);
        assert_eq!(record.load, 4);

        // A recovered server can fail again and is reported again.
        let expired = store
            .expire_stale(start + Duration::from_secs(19), TIMEOUT)
            .await;
        assert_eq!(expired.len(), 1);
    }

    #[tokio::test]
    async fn only_silent_servers_expire() {
        let store = MonitorStore::new();
        let start = Instant::now();
        store.on_heartbeat_at(&heartbeat("old", 0), start).await;
        store
            .on_heartbeat_at(&heartbeat("fresh", 0), start + Duration::from_secs(6))
            .await;

        let expired = store
            .expire_stale(start + Duration::from_secs(10), TIMEOUT)
            .await;
        let ids: Vec<_> = expired.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["old".to_string()]);
    }

    #[tokio::test]
    async fn notification_target_is_last_writer_wins() {
        let store = MonitorStore::new();
        assert!(store.notification_target().await.is_none());

        store.register_notification_target("10.0.0.1", 5001).await;
        store.register_notification_target("10.0.0.2", 6001).await;

        let target = store.notification_target().await.unwrap();
        assert_eq!(target.address(), "10.0.0.2:6001");
    }

    #[tokio::test]
    async fn listing_reflects_status() {
        let store = MonitorStore::new();
        let start = Instant::now();
        store.on_heartbeat_at(&heartbeat("A", 1), start).await;
        store
            .on_heartbeat_at(&heartbeat("B", 2), start + Duration::from_secs(5))
            .await;
        store
            .expire_stale(start + Duration::from_secs(9), TIMEOUT)
            .await;

        let lines: Vec<String> = store
            .list_servers()
            .await
            .iter()
            .map(|r| r.to_line().to_string())
            .collect();
        assert_eq!(
            lines,
            vec![
                "SERVER A 127.0.0.1 7001 1 dead".to_string(),
                "SERVER B 127.0.0.1 7001 2 alive".to_string(),
            ]
        );
    }
}
