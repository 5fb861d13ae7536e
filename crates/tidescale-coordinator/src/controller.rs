//! The engine's [`ClusterController`]: scale-out through the cluster API,
//! bandwidth limits through the coordinator.

use tidescale_core::{BandwidthLimit, BoxFuture, ClusterController, CollabResult};

use crate::coordinator::CoordinatorClient;
use crate::kube::KubeScaler;

#[derive(Debug, Clone)]
pub struct ScaleController {
    kube: KubeScaler,
    coordinator: CoordinatorClient,
}

impl ScaleController {
    pub fn new(kube: KubeScaler, coordinator: CoordinatorClient) -> Self {
        Self { kube, coordinator }
    }
}

impl ClusterController for ScaleController {
    fn scale_out<'a>(
        &'a self,
        namespace: &'a str,
        cluster_name: &'a str,
        increment: u32,
    ) -> BoxFuture<'a, CollabResult<()>> {
        Box::pin(async move {
            self.kube
                .scale_out(namespace, cluster_name, increment)
                .await
                .map(|_| ())
        })
    }

    fn set_bandwidth_limit<'a>(
        &'a self,
        namespace: &'a str,
        selector_key: &'a str,
        selector_value: &'a str,
        limit: &'a BandwidthLimit,
    ) -> BoxFuture<'a, CollabResult<()>> {
        Box::pin(
            self.coordinator
                .set_batch_limit(namespace, selector_key, selector_value, limit),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::extract::State;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use crate::testing::serve;

    #[derive(Clone, Default)]
    struct Cluster {
        object: Arc<Mutex<Value>>,
        limits: Arc<Mutex<Vec<Value>>>,
    }

    async fn read(State(c): State<Cluster>) -> Json<Value> {
        Json(c.object.lock().unwrap().clone())
    }

    async fn write(State(c): State<Cluster>, Json(body): Json<Value>) -> Json<Value> {
        *c.object.lock().unwrap() = body.clone();
        Json(body)
    }

    async fn limit(State(c): State<Cluster>, Json(body): Json<Value>) -> Json<Value> {
        c.limits.lock().unwrap().push(body);
        Json(json!({"code": 0}))
    }

    #[tokio::test]
    async fn routes_each_call_to_its_backend() {
        let cluster = Cluster::default();
        *cluster.object.lock().unwrap() = json!({"spec": {"tikv": {"replicas": 4}}});

        let kube_router = Router::new()
            .route(
                "/apis/pingcap.com/v1alpha1/namespaces/default/tidbclusters/demo",
                get(read).put(write),
            )
            .with_state(cluster.clone());
        let coord_router = Router::new()
            .route("/setbatchpod", post(limit))
            .with_state(cluster.clone());

        let timeout = Duration::from_secs(2);
        let controller: Arc<dyn ClusterController> = Arc::new(ScaleController::new(
            KubeScaler::new(
                serve(kube_router).await,
                timeout,
                "pingcap.com",
                "v1alpha1",
                "tidbclusters",
                "/spec/tikv/replicas",
            ),
            CoordinatorClient::new(serve(coord_router).await, timeout),
        ));

        controller.scale_out("default", "demo", 2).await.unwrap();
        controller
            .set_bandwidth_limit("default", "app", "tikv", &BandwidthLimit::from_mbps(45.7))
            .await
            .unwrap();

        assert_eq!(cluster.object.lock().unwrap()["spec"]["tikv"]["replicas"], 6);
        let limits = cluster.limits.lock().unwrap();
        assert_eq!(limits.len(), 1);
        assert_eq!(limits[0]["read"], "45");
    }
}
