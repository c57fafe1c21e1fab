//! Typed HTTP clients for the cluster control-plane APIs.
//!
//! The orchestrator talks to PD for store/member management during
//! upgrades and scale-in, and to the binlog components to request
//! graceful offline. Every client is constructed with a list of
//! candidate endpoints, a per-call timeout and an optional TLS
//! configuration; requests try each endpoint in order until one
//! succeeds or all fail.

pub mod binlog;
pub mod client;
pub mod error;
pub mod pd;

pub use binlog::BinlogClient;
pub use client::{HttpClient, TlsConfig};
pub use error::{ApiError, Result};
pub use pd::PdClient;
