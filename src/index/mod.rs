//! # Index Server
//!
//! - [`registry`]: the file/server catalog and least-load selection
//! - [`monitor_client`]: health pulls and failure-notification subscription
//! - [`server`]: TCP front end (queries, registration, notifications)

pub mod config;
pub mod monitor_client;
pub mod registry;
pub mod server;

pub use config::IndexConfig;
pub use monitor_client::MonitorClient;
pub use registry::{FileHost, RegistryStore, Selection, ServerRecord};
pub use server::IndexServer;
