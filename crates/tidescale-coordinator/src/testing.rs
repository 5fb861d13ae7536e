//! Test helpers: a throwaway HTTP server on a random local port.

use axum::Router;

/// Serve `router` on `127.0.0.1:0` and return its `host:port`.
pub(crate) async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    address.to_string()
}
