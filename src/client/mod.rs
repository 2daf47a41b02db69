//! # Client
//!
//! Consumer of the index and content wire protocols: locate a file through
//! the Index Server, then fetch its bytes directly from the chosen Content
//! Server.

pub mod client;

pub use client::{CdnClient, TransferError};
