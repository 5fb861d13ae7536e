//! Minimal JSON-over-HTTP/1.1 client shared by every collaborator client.
//!
//! Opens a TCP connection per request, drives the hyper connection in the
//! background, and maps every failure onto [`CollaboratorError`].

use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request};
use http_body_util::{BodyExt, Full};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use tidescale_core::{CollabResult, CollaboratorError};

const USER_AGENT: &str = "tidescale/0.1";

/// Client bound to one `host:port`.
#[derive(Debug, Clone)]
pub struct HttpClient {
    address: String,
    timeout: Duration,
}

impl HttpClient {
    /// `address` is `host:port`; a leading `http://` is tolerated.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        let address = address.into();
        let address = address
            .strip_prefix("http://")
            .unwrap_or(&address)
            .trim_end_matches('/')
            .to_string();
        Self { address, timeout }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// GET `path` and decode the JSON response.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> CollabResult<T> {
        let body = self.send(Method::GET, path, None).await?;
        decode(path, &body)
    }

    /// Send `body` as JSON with `method` and decode the JSON response.
    pub async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> CollabResult<T> {
        let payload =
            serde_json::to_vec(body).map_err(|e| CollaboratorError::Transport(e.to_string()))?;
        let body = self.send(method, path, Some(payload)).await?;
        decode(path, &body)
    }

    async fn send(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> CollabResult<Bytes> {
        let uri = format!("http://{}{path}", self.address);

        let result = tokio::time::timeout(self.timeout, async {
            let stream = tokio::net::TcpStream::connect(&self.address)
                .await
                .map_err(|e| CollaboratorError::Connect {
                    address: self.address.clone(),
                    reason: e.to_string(),
                })?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!(error = %e, "collaborator connection closed with error");
                }
            });

            let mut builder = Request::builder()
                .method(method.clone())
                .uri(path)
                .header("host", self.address.as_str())
                .header("user-agent", USER_AGENT)
                .header("accept", "application/json");
            let body = match body {
                Some(bytes) => {
                    builder = builder.header("content-type", "application/json");
                    Full::new(Bytes::from(bytes))
                }
                None => Full::new(Bytes::new()),
            };
            let req = builder
                .body(body)
                .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| CollaboratorError::Transport(e.to_string()))?;
            let status = resp.status();
            let bytes = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| CollaboratorError::Transport(e.to_string()))?
                .to_bytes();

            if !status.is_success() {
                return Err(CollaboratorError::Status {
                    uri: uri.clone(),
                    status: status.as_u16(),
                });
            }
            debug!(%method, %uri, status = status.as_u16(), "collaborator call ok");
            Ok(bytes)
        })
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(_) => Err(CollaboratorError::Timeout(uri)),
        }
    }
}

fn decode<T: DeserializeOwned>(path: &str, body: &[u8]) -> CollabResult<T> {
    serde_json::from_slice(body).map_err(|e| CollaboratorError::Decode(format!("{path}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    #[test]
    fn strips_scheme_and_trailing_slash() {
        let client = HttpClient::new("http://10.0.0.1:8888/", Duration::from_secs(1));
        assert_eq!(client.address(), "10.0.0.1:8888");
    }

    #[tokio::test]
    async fn get_json_decodes_body() {
        let router = Router::new().route("/ping", get(|| async { r#"{"ok":true}"# }));
        let address = serve(router).await;

        let client = HttpClient::new(address, Duration::from_secs(2));
        let value: serde_json::Value = client.get_json("/ping").await.unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let router = Router::new().route(
            "/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let address = serve(router).await;

        let client = HttpClient::new(address, Duration::from_secs(2));
        let err = client
            .get_json::<serde_json::Value>("/broken")
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn garbage_body_is_a_decode_error() {
        let router = Router::new().route("/text", get(|| async { "not json" }));
        let address = serve(router).await;

        let client = HttpClient::new(address, Duration::from_secs(2));
        let err = client.get_json::<serde_json::Value>("/text").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Decode(_)));
    }

    #[tokio::test]
    async fn closed_port_is_a_connect_error() {
        let client = HttpClient::new("127.0.0.1:1", Duration::from_millis(500));
        let err = client.get_json::<serde_json::Value>("/").await.unwrap_err();
        assert!(matches!(
            err,
            CollaboratorError::Connect { .. } | CollaboratorError::Timeout(_)
        ));
    }
}
