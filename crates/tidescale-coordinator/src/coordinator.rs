//! Bandwidth coordinator client.
//!
//! The coordinator reports per-node read/write rates and enforces per-node
//! bandwidth limits, either in bulk by label selector or node by node.

use std::collections::BTreeMap;
use std::time::Duration;

use http::Method;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use tidescale_core::{
    BandwidthLimit, BoxFuture, CollabResult, CollaboratorError, MetricsSource, NodeId, NodeRates,
    RawRates,
};

use crate::transport::HttpClient;

const NODE_RATES_PATH: &str = "/util";
const SET_BATCH_LIMIT_PATH: &str = "/setbatchpod";
const SET_NODE_LIMITS_PATH: &str = "/setonepod";

/// One node's rates or limits on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRates {
    pub name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub read: String,
    #[serde(deserialize_with = "string_or_number")]
    pub write: String,
}

#[derive(Debug, Deserialize)]
struct NodeStatusResponse {
    #[serde(default)]
    instances: Vec<InstanceRates>,
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct BatchLimitRequest<'a> {
    namespace: &'a str,
    tag: &'a str,
    val: &'a str,
    read: &'a str,
    write: &'a str,
}

#[derive(Debug, Serialize)]
struct NodeLimitsRequest<'a> {
    namespace: &'a str,
    requests: &'a [InstanceRates],
}

#[derive(Debug, Deserialize)]
struct LimitResponse {
    code: i32,
    #[serde(default)]
    message: String,
}

/// Client for the bandwidth coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    http: HttpClient,
}

impl CoordinatorClient {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: HttpClient::new(address, timeout),
        }
    }

    /// Current read/write rates for every storage node.
    pub async fn fetch_node_rates(&self) -> CollabResult<NodeRates> {
        let status: NodeStatusResponse = self.http.get_json(NODE_RATES_PATH).await?;
        if status.code != 0 {
            return Err(CollaboratorError::Rejected(format!(
                "node status code {}: {}",
                status.code, status.message
            )));
        }
        let rates: NodeRates = status
            .instances
            .into_iter()
            .map(|i| (i.name, RawRates::new(i.read, i.write)))
            .collect();
        debug!(nodes = rates.len(), "fetched node rates");
        Ok(rates)
    }

    /// Apply one limit to every node matching `tag=val`.
    pub async fn set_batch_limit(
        &self,
        namespace: &str,
        tag: &str,
        val: &str,
        limit: &BandwidthLimit,
    ) -> CollabResult<()> {
        let request = BatchLimitRequest {
            namespace,
            tag,
            val,
            read: &limit.read,
            write: &limit.write,
        };
        let resp: LimitResponse = self
            .http
            .send_json(Method::POST, SET_BATCH_LIMIT_PATH, &request)
            .await?;
        check_limit_response("batch", resp)?;
        info!(%tag, %val, read = %limit.read, write = %limit.write, "batch limit applied");
        Ok(())
    }

    /// Apply an individual limit to each named node.
    pub async fn set_node_limits(
        &self,
        namespace: &str,
        limits: &BTreeMap<NodeId, BandwidthLimit>,
    ) -> CollabResult<()> {
        let requests: Vec<InstanceRates> = limits
            .iter()
            .map(|(name, limit)| InstanceRates {
                name: name.clone(),
                read: limit.read.clone(),
                write: limit.write.clone(),
            })
            .collect();
        let request = NodeLimitsRequest {
            namespace,
            requests: &requests,
        };
        let resp: LimitResponse = self
            .http
            .send_json(Method::POST, SET_NODE_LIMITS_PATH, &request)
            .await?;
        check_limit_response("per-node", resp)?;
        info!(nodes = requests.len(), "per-node limits applied");
        Ok(())
    }
}

impl MetricsSource for CoordinatorClient {
    fn node_rates(&self) -> BoxFuture<'_, CollabResult<NodeRates>> {
        Box::pin(self.fetch_node_rates())
    }
}

fn check_limit_response(kind: &str, resp: LimitResponse) -> CollabResult<()> {
    if resp.code != 0 {
        return Err(CollaboratorError::Rejected(format!(
            "{kind} limit code {}: {}",
            resp.code, resp.message
        )));
    }
    Ok(())
}

/// Accept `"12.5"` or `12.5` for a rate field.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected rate string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use crate::testing::serve;

    type Captured = Arc<Mutex<Vec<Value>>>;

    async fn capture(State(captured): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
        captured.lock().unwrap().push(body);
        Json(json!({"code": 0, "message": "ok"}))
    }

    fn client(address: String) -> CoordinatorClient {
        CoordinatorClient::new(address, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn fetch_node_rates_maps_instances() {
        let router = Router::new().route(
            NODE_RATES_PATH,
            get(|| async {
                Json(json!({
                    "instances": [
                        {"name": "tikv-0", "read": "12.5", "write": "3"},
                        {"name": "tikv-1", "read": 7, "write": "n/a"}
                    ],
                    "code": 0,
                    "message": ""
                }))
            }),
        );
        let rates = client(serve(router).await).fetch_node_rates().await.unwrap();

        assert_eq!(rates.len(), 2);
        assert_eq!(rates["tikv-0"], RawRates::new("12.5", "3"));
        assert_eq!(rates["tikv-1"], RawRates::new("7", "n/a"));
    }

    #[tokio::test]
    async fn nonzero_status_code_is_rejected() {
        let router = Router::new().route(
            NODE_RATES_PATH,
            get(|| async { Json(json!({"instances": [], "code": 3, "message": "busy"})) }),
        );
        let err = client(serve(router).await)
            .fetch_node_rates()
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Rejected(msg) if msg.contains("busy")));
    }

    #[tokio::test]
    async fn set_batch_limit_posts_selector_and_limit() {
        let captured = Captured::default();
        let router = Router::new()
            .route(SET_BATCH_LIMIT_PATH, post(capture))
            .with_state(captured.clone());
        let coordinator = client(serve(router).await);

        coordinator
            .set_batch_limit(
                "default",
                "app.kubernetes.io/component",
                "tikv",
                &BandwidthLimit::from_mbps(90.0),
            )
            .await
            .unwrap();

        let bodies = captured.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["tag"], "app.kubernetes.io/component");
        assert_eq!(bodies[0]["val"], "tikv");
        assert_eq!(bodies[0]["read"], "90");
        assert_eq!(bodies[0]["write"], "90");
    }

    #[tokio::test]
    async fn set_batch_limit_rejection_surfaces() {
        let router = Router::new().route(
            SET_BATCH_LIMIT_PATH,
            post(|| async { Json(json!({"code": 1, "message": "no such label"})) }),
        );
        let err = client(serve(router).await)
            .set_batch_limit("default", "app", "none", &BandwidthLimit::from_mbps(10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Rejected(_)));
    }

    #[tokio::test]
    async fn set_node_limits_sends_each_node() {
        let captured = Captured::default();
        let router = Router::new()
            .route(SET_NODE_LIMITS_PATH, post(capture))
            .with_state(captured.clone());
        let coordinator = client(serve(router).await);

        let mut limits = BTreeMap::new();
        limits.insert("tikv-0".to_string(), BandwidthLimit::from_mbps(10.0));
        limits.insert("tikv-1".to_string(), BandwidthLimit::from_mbps(20.0));
        coordinator.set_node_limits("default", &limits).await.unwrap();

        let bodies = captured.lock().unwrap();
        assert_eq!(bodies[0]["namespace"], "default");
        assert_eq!(bodies[0]["requests"][0]["name"], "tikv-0");
        assert_eq!(bodies[0]["requests"][1]["read"], "20");
    }

    #[tokio::test]
    async fn metrics_source_trait_delegates() {
        let router = Router::new().route(
            NODE_RATES_PATH,
            get(|| async {
                Json(json!({"instances": [{"name": "a", "read": "1", "write": "2"}], "code": 0}))
            }),
        );
        let source: Arc<dyn MetricsSource> = Arc::new(client(serve(router).await));
        assert_eq!(source.node_rates().await.unwrap().len(), 1);
    }
}
