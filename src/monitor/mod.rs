//! # Monitor
//!
//! - [`store`]: heartbeat records and the notification target
//! - [`liveness`]: timeout sweep and `SERVER_DOWN` delivery
//! - [`server`]: UDP heartbeat listener and TCP query service

pub mod config;
pub mod liveness;
pub mod server;
pub mod store;

pub use config::MonitorConfig;
pub use liveness::{notify_failure, LivenessChecker};
pub use server::MonitorServer;
pub use store::{HeartbeatOutcome, HeartbeatRecord, MonitorStore, NotificationTarget};
