//! # Content Server
//!
//! - [`catalog`]: files served, built from local storage
//! - [`registration`]: catalog publication to the Index Server
//! - [`heartbeat`]: periodic load reports to the Monitor
//! - [`metrics`]: active-connection count (the reported load)
//! - [`transfer`]: `GET` handling, one request per connection
//! - [`server`]: lifecycle tying the above together

pub mod catalog;
pub mod config;
pub mod heartbeat;
pub mod metrics;
pub mod registration;
pub mod server;
pub mod transfer;

pub use catalog::Catalog;
pub use config::ContentConfig;
pub use heartbeat::HeartbeatEmitter;
pub use metrics::ConnectionTracker;
pub use server::ContentServer;
pub use transfer::TransferOutcome;
