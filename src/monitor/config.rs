use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::common::config::millis;

/// Monitor configuration loaded from TOML.
///
/// # Example TOML
///
/// ```toml
/// udp_address = "0.0.0.0:6000"
/// tcp_address = "0.0.0.0:6001"
/// check_interval_ms = 2000
/// heartbeat_timeout_ms = 8000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Heartbeat datagrams arrive here
    pub udp_address: String,
    /// `LIST_SERVERS` / `REGISTER_INDEX` / `PING`
    pub tcp_address: String,
    /// Period of the liveness sweep
    pub check_interval_ms: u64,
    /// Silence after which a server is declared dead
    pub heartbeat_timeout_ms: u64,
    /// Bound on delivering one `SERVER_DOWN`
    pub notify_timeout_ms: u64,
    /// Idle bound on a query session
    pub session_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            udp_address: "0.0.0.0:6000".to_string(),
            tcp_address: "0.0.0.0:6001".to_string(),
            check_interval_ms: 2_000,
            heartbeat_timeout_ms: 8_000,
            notify_timeout_ms: 5_000,
            session_timeout_ms: 60_000,
        }
    }
}

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        millis(self.check_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        millis(self.heartbeat_timeout_ms)
    }

    pub fn notify_timeout(&self) -> Duration {
        millis(self.notify_timeout_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        millis(self.session_timeout_ms)
    }

    /// Set the heartbeat timeout from whole seconds, saturating on overflow.
    pub fn set_heartbeat_timeout_secs(&mut self, secs: u64) {
        self.heartbeat_timeout_ms = secs.saturating_mul(1000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_override_in_seconds() {
        let mut config = MonitorConfig::default();
        config.set_heartbeat_timeout_secs(3);
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(3));

        config.set_heartbeat_timeout_secs(u64::MAX);
        assert_eq!(config.heartbeat_timeout_ms, u64::MAX);
    }
}
