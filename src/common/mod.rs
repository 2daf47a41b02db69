//! # Common Components
//!
//! Shared utilities used by all three daemons and the client.
//!
//! ## Modules
//!
//! - [`protocol`]: line-oriented wire grammar for every link in the CDN
//! - [`connection`]: newline-framed TCP connection with bounded reads
//! - [`config`]: TOML configuration loading
//! - [`logging`]: `env_logger` setup shared by the binaries
//! - [`shutdown`]: termination signal observed by accept and periodic loops

pub mod config;
pub mod connection;
pub mod logging;
pub mod protocol;
pub mod shutdown;

pub use connection::LineConnection;
pub use shutdown::Shutdown;
