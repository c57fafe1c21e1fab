//! Client for the PD placement driver API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::{HttpClient, TlsConfig};
use crate::error::{ApiError, Result};

const HEALTH_URI: &str = "pd/health";
const STORES_URI: &str = "pd/api/v1/stores";
const STORE_URI: &str = "pd/api/v1/store";
const MEMBERS_URI: &str = "pd/api/v1/members";
const LEADER_URI: &str = "pd/api/v1/leader";
const LEADER_RESIGN_URI: &str = "pd/api/v1/leader/resign";
const SCHEDULERS_URI: &str = "pd/api/v1/schedulers";

/// Health entry for one PD member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Member name.
    pub name: String,
    /// Member id.
    #[serde(default)]
    pub member_id: u64,
    /// Whether the member is currently healthy.
    pub health: bool,
}

/// A PD member, as returned by the leader and members endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Member name.
    pub name: String,
    /// Member id.
    #[serde(default)]
    pub member_id: u64,
    /// Client URLs of the member.
    #[serde(default)]
    pub client_urls: Vec<String>,
}

/// The store object inside a stores listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    /// Store id.
    pub id: u64,
    /// `host:port` address of the store.
    pub address: String,
    /// Human-readable state, e.g. `Up`, `Offline`, `Tombstone`.
    #[serde(default)]
    pub state_name: String,
}

/// Status counters of a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStatus {
    /// Number of region leaders currently on the store.
    #[serde(default)]
    pub leader_count: u64,
}

/// One entry of the stores listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreInfo {
    /// The store itself.
    pub store: Store,
    /// Its status counters.
    #[serde(default)]
    pub status: StoreStatus,
}

/// The stores listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoresInfo {
    /// Number of stores.
    #[serde(default)]
    pub count: usize,
    /// The stores.
    #[serde(default)]
    pub stores: Vec<StoreInfo>,
}

/// Client of the PD API, walking its endpoint list on failure.
pub struct PdClient {
    http: HttpClient,
}

impl PdClient {
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

    /// Queries the health of all members.
    pub fn get_health(&self) -> Result<Vec<Health>> {
        self.http.get_json(HEALTH_URI)
    }

    /// Queries the stores listing.
    pub fn get_stores(&self) -> Result<StoresInfo> {
        self.http.get_json(STORES_URI)
    }

    /// Queries the current leader.
    pub fn get_leader(&self) -> Result<Member> {
        let leader: Member = self.http.get_json(LEADER_URI)?;
        if leader.name.is_empty() {
            return Err(ApiError::NoLeader);
        }
        Ok(leader)
    }

    /// Asks the current leader to resign so another member takes over.
    pub fn evict_pd_leader(&self) -> Result<()> {
        info!("Requesting PD leader resignation");
        self.http.post_empty(LEADER_RESIGN_URI)
    }

    /// Finds the store registered under `address`.
    pub fn store_by_address(&self, address: &str) -> Result<Store> {
        let stores = self.get_stores()?;
        stores
            .stores
            .into_iter()
            .map(|s| s.store)
            .find(|s| s.address == address)
            .ok_or_else(|| ApiError::StoreNotFound(address.to_string()))
    }

    /// Schedules leader eviction for the store at `address`.
    pub fn evict_store_leader(&self, address: &str) -> Result<()> {
        let store = self.store_by_address(address)?;
        info!(store = store.id, address = %address, "Scheduling store leader eviction");
        self.http.post_json(
            SCHEDULERS_URI,
            &serde_json::json!({
                "name": "evict-leader-scheduler",
                "store_id": store.id,
            }),
        )
    }

    /// Removes a previously scheduled leader eviction for `address`.
    pub fn remove_evict_store_leader(&self, address: &str) -> Result<()> {
        let store = self.store_by_address(address)?;
        self.http
            .delete(&format!("{}/evict-leader-scheduler-{}", SCHEDULERS_URI, store.id))
    }

    /// Requests deletion of the store at `address`.
    ///
    /// PD flips the store to `Offline` and migrates regions away in the
    /// background; the caller must not tear the node down synchronously.
    pub fn del_store(&self, address: &str) -> Result<()> {
        let store = self.store_by_address(address)?;
        info!(store = store.id, address = %address, "Requesting store deletion");
        self.http.delete(&format!("{}/{}", STORE_URI, store.id))
    }

    /// Requests deletion of the PD member `name`.
    pub fn del_pd(&self, name: &str) -> Result<()> {
        info!(member = %name, "Requesting PD member deletion");
        self.http.delete(&format!("{}/name/{}", MEMBERS_URI, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stores_payload_decodes() {
        let body = r#"{
            "count": 2,
            "stores": [
                {"store": {"id": 1, "address": "10.0.0.1:20160", "state_name": "Up"},
                 "status": {"leader_count": 12}},
                {"store": {"id": 4, "address": "10.0.0.2:20160", "state_name": "Offline"}}
            ]
        }"#;
        let info: StoresInfo = serde_json::from_str(body).unwrap();
        assert_eq!(info.count, 2);
        assert_eq!(info.stores[0].store.address, "10.0.0.1:20160");
        assert_eq!(info.stores[0].status.leader_count, 12);
        assert_eq!(info.stores[1].store.state_name, "Offline");
        assert_eq!(info.stores[1].status.leader_count, 0);
    }

    #[test]
    fn test_health_payload_decodes() {
        let body = r#"[{"name": "pd-10.0.0.1-2379", "member_id": 7, "health": true}]"#;
        let healths: Vec<Health> = serde_json::from_str(body).unwrap();
        assert!(healths[0].health);
        assert_eq!(healths[0].name, "pd-10.0.0.1-2379");
    }
}
