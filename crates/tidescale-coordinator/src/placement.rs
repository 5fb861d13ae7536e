//! Placement driver client: per-store shard (region) counts.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use tidescale_core::{BoxFuture, CollabResult, CollaboratorError, ShardBalanceSource, ShardCounts};

use crate::transport::HttpClient;

const STORES_PATH: &str = "/pd/api/v1/stores";
const TOMBSTONE: &str = "Tombstone";

#[derive(Debug, Deserialize)]
struct StoresResponse {
    #[serde(default)]
    stores: Vec<StoreInfo>,
}

#[derive(Debug, Deserialize)]
struct StoreInfo {
    store: StoreMeta,
    #[serde(default)]
    status: StoreStatus,
}

#[derive(Debug, Deserialize)]
struct StoreMeta {
    id: u64,
    #[serde(default)]
    state_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct StoreStatus {
    #[serde(default)]
    region_count: u64,
}

/// Extract store id to region count from a stores listing.
///
/// Tombstoned stores are skipped; they no longer hold data.
pub fn parse_store_status(body: &[u8]) -> CollabResult<ShardCounts> {
    let resp: StoresResponse = serde_json::from_slice(body)
        .map_err(|e| CollaboratorError::Decode(format!("{STORES_PATH}: {e}")))?;
    Ok(into_counts(resp))
}

fn into_counts(resp: StoresResponse) -> ShardCounts {
    resp.stores
        .into_iter()
        .filter(|s| s.store.state_name != TOMBSTONE)
        .map(|s| (s.store.id.to_string(), s.status.region_count))
        .collect()
}

/// Client for the placement driver's store API.
#[derive(Debug, Clone)]
pub struct PlacementClient {
    http: HttpClient,
}

impl PlacementClient {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: HttpClient::new(address, timeout),
        }
    }

    pub async fn fetch_shard_counts(&self) -> CollabResult<ShardCounts> {
        let resp: StoresResponse = self.http.get_json(STORES_PATH).await?;
        let counts = into_counts(resp);
        debug!(stores = counts.len(), "fetched shard counts");
        Ok(counts)
    }
}

impl ShardBalanceSource for PlacementClient {
    fn shard_counts(&self) -> BoxFuture<'_, CollabResult<ShardCounts>> {
        Box::pin(self.fetch_shard_counts())
    }
}
