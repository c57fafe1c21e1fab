//! Client for requesting binlog component offline.
//!
//! Pump and Drainer are taken offline through their own HTTP surface
//! rather than systemd, so in-flight binlogs drain first. The request is
//! fire-and-forget: the component finishes draining in the background
//! and the caller only marks the instance offline in metadata.

use std::time::Duration;

use tracing::info;

use crate::client::{HttpClient, TlsConfig};
use crate::error::Result;

/// Client for the binlog offline API.
pub struct BinlogClient {
    http: HttpClient,
}

impl BinlogClient {
    /// Builds a client over the given `host:port` endpoints.
    pub fn new(
        endpoints: Vec<String>,
        timeout: Duration,
        tls: Option<&TlsConfig>,
    ) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(endpoints, timeout, tls)?,
        })
    }

    /// Requests graceful offline of the pump at `addr`.
    pub fn offline_pump(&self, addr: &str) -> Result<()> {
        info!(pump = %addr, "Requesting pump offline");
        self.http
            .post_json("state/close", &serde_json::json!({ "nodeID": addr }))
    }

    /// Requests graceful offline of the drainer at `addr`.
    pub fn offline_drainer(&self, addr: &str) -> Result<()> {
        info!(drainer = %addr, "Requesting drainer offline");
        self.http
            .post_json("state/close", &serde_json::json!({ "nodeID": addr }))
    }
}
