use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::common::config::millis;

/// Content Server configuration loaded from TOML.
///
/// # Example TOML
///
/// ```toml
/// server_id = "CS1"
/// listen_address = "0.0.0.0:7001"
/// udp_port = 7002
/// files_dir = "files_CS1"
/// index_address = "127.0.0.1:5000"
/// monitor_address = "127.0.0.1:6000"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub server_id: String,
    /// Transfer service listener
    pub listen_address: String,
    /// Local port the heartbeat socket binds to, reported in `REGISTER`
    pub udp_port: u16,
    /// Address put in heartbeats
    pub advertise_host: String,
    /// Storage directory; defaults to `files_<server_id>`
    pub files_dir: Option<PathBuf>,
    pub index_address: String,
    pub monitor_address: String,
    pub heartbeat_interval_ms: u64,
    /// Write placeholder files when storage is empty
    pub seed_samples: bool,
    /// Bound on reading a request and on streaming one file
    pub request_timeout_ms: u64,
    /// Bound on each step of the registration handshake
    pub index_timeout_ms: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            server_id: "CS1".to_string(),
            listen_address: "0.0.0.0:7001".to_string(),
            udp_port: 7002,
            advertise_host: "127.0.0.1".to_string(),
            files_dir: None,
            index_address: "127.0.0.1:5000".to_string(),
            monitor_address: "127.0.0.1:6000".to_string(),
            heartbeat_interval_ms: 3_000,
            seed_samples: true,
            request_timeout_ms: 30_000,
            index_timeout_ms: 5_000,
        }
    }
}

impl ContentConfig {
    pub fn files_dir(&self) -> PathBuf {
        self.files_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("files_{}", self.server_id)))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        millis(self.heartbeat_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        millis(self.request_timeout_ms)
    }

    pub fn index_timeout(&self) -> Duration {
        millis(self.index_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_dir_defaults_to_server_id() {
        let config = ContentConfig {
            server_id: "CS7".into(),
            ..ContentConfig::default()
        };
        assert_eq!(config.files_dir(), PathBuf::from("files_CS7"));
    }
}
