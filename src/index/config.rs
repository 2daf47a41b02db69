use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::common::config::millis;

/// Index Server configuration loaded from TOML.
///
/// # Example TOML
///
/// ```toml
/// listen_address = "0.0.0.0:5000"
/// advertise_host = "127.0.0.1"
/// monitor_address = "127.0.0.1:6001"
/// monitor_timeout_ms = 5000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Shared port for client queries and content-server registration
    pub listen_address: String,
    /// Failure-notification listener; defaults to the listen port + 1
    pub notify_address: Option<String>,
    /// Host the Monitor should dial back for `SERVER_DOWN`
    pub advertise_host: String,
    /// Monitor TCP query port
    pub monitor_address: String,
    pub monitor_timeout_ms: u64,
    /// Idle bound on a client or registration session
    pub client_timeout_ms: u64,
    /// Bound on reading the first line of a new connection
    pub dispatch_timeout_ms: u64,
    pub register_with_monitor: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:5000".to_string(),
            notify_address: None,
            advertise_host: "127.0.0.1".to_string(),
            monitor_address: "127.0.0.1:6001".to_string(),
            monitor_timeout_ms: 5_000,
            client_timeout_ms: 300_000,
            dispatch_timeout_ms: 5_000,
            register_with_monitor: true,
        }
    }
}

impl IndexConfig {
    pub fn notify_address(&self) -> Result<String> {
        if let Some(address) = &self.notify_address {
            return Ok(address.clone());
        }
        let listen: SocketAddr = self
            .listen_address
            .parse()
            .with_context(|| format!("invalid listen_address {}", self.listen_address))?;
        if listen.port() == 0 {
            bail!(
                "listen_address {} uses an ephemeral port; set notify_address explicitly",
                self.listen_address
            );
        }
        let port = listen
            .port()
            .checked_add(1)
            .context("listen port has no successor for the notification listener")?;
        Ok(SocketAddr::new(listen.ip(), port).to_string())
    }

    pub fn monitor_timeout(&self) -> Duration {
        millis(self.monitor_timeout_ms)
    }

    pub fn client_timeout(&self) -> Duration {
        millis(self.client_timeout_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        millis(self.dispatch_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_port_follows_listen_port() {
        let config = IndexConfig::default();
        assert_eq!(config.notify_address().unwrap(), "0.0.0.0:5001");
    }

    #[test]
    fn explicit_notify_address_wins() {
        let config = IndexConfig {
            notify_address: Some("127.0.0.1:0".into()),
            ..IndexConfig::default()
        };
        assert_eq!(config.notify_address().unwrap(), "127.0.0.1:0");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: IndexConfig = toml::from_str("listen_address = \"127.0.0.1:9000\"").unwrap();
        assert_eq!(config.notify_address().unwrap(), "127.0.0.1:9001");
        assert_eq!(config.monitor_address, "127.0.0.1:6001");
    }

    #[test]
    fn ephemeral_listen_port_needs_explicit_notify_address() {
        let config = IndexConfig {
            listen_address: "127.0.0.1:0".into(),
            ..IndexConfig::default()
        };
        let err = config.notify_address().unwrap_err();
        assert!(err.to_string().contains("notify_address"));
    }
}
