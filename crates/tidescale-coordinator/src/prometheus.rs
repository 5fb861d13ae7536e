//! Prometheus instant-query client for per-store used bytes.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use tidescale_core::{BoxFuture, CollabResult, CollaboratorError, StoreSize, StoreSizeSource};

use crate::transport::HttpClient;

const QUERY_PATH: &str = "/api/v1/query";

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: std::collections::BTreeMap<String, String>,
    /// `[unix_ts, "value"]`
    value: (f64, String),
}

/// Runs one fixed instant query returning bytes per `instance`.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    http: HttpClient,
    query: String,
}

impl PrometheusClient {
    pub fn new(address: impl Into<String>, timeout: Duration, query: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(address, timeout),
            query: query.into(),
        }
    }

    pub async fn fetch_store_sizes(&self) -> CollabResult<Vec<StoreSize>> {
        let path = format!("{QUERY_PATH}?query={}", urlencoding::encode(&self.query));
        let resp: QueryResponse = self.http.get_json(&path).await?;
        parse_vector(resp)
    }
}

fn parse_vector(resp: QueryResponse) -> CollabResult<Vec<StoreSize>> {
    if resp.status != "success" {
        return Err(CollaboratorError::Rejected(
            resp.error.unwrap_or_else(|| format!("query status {}", resp.status)),
        ));
    }
    let data = resp
        .data
        .ok_or_else(|| CollaboratorError::Decode("query response without data".into()))?;
    if data.result_type != "vector" {
        return Err(CollaboratorError::Decode(format!(
            "expected vector result, got {}",
            data.result_type
        )));
    }

    let mut sizes = Vec::with_capacity(data.result.len());
    for sample in data.result {
        let instance = sample.metric.get("instance").cloned().unwrap_or_default();
        match sample.value.1.parse::<f64>() {
            Ok(bytes) if bytes.is_finite() => sizes.push(StoreSize { instance, bytes }),
            _ => warn!(%instance, value = %sample.value.1, "unparsable store size, skipping"),
        }
    }
    debug!(stores = sizes.len(), "fetched store sizes");
    Ok(sizes)
}

impl StoreSizeSource for PrometheusClient {
    fn store_sizes(&self) -> BoxFuture<'_, CollabResult<Vec<StoreSize>>> {
        Box::pin(self.fetch_store_sizes())
    }
}
