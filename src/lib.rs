//! # Micro-CDN
//!
//! A miniature content-delivery network made of three daemons and a client:
//!
//! ```text
//!  Content Server --REGISTER/ADD_FILE--> Index Server <--GET-- Client
//!        |                                   ^   ^               |
//!        |--HEARTBEAT (UDP)--> Monitor ------|   |               |
//!        |                      (LIST_SERVERS, SERVER_DOWN)      |
//!        <------------------------- GET <file> ------------------'
//! ```
//!
//! - [`index`]: file → host registry and least-loaded selection
//! - [`monitor`]: heartbeat tracking and failure notification
//! - [`content`]: storage, registration, heartbeats and file transfer
//! - [`client`]: locate-then-download consumer
//! - [`common`]: wire protocol, connection framing, config, logging

pub mod client;
pub mod common;
pub mod content;
pub mod index;
pub mod monitor;

pub use common::Shutdown;
