//! HTTP server for the Prometheus metrics endpoint.
//!
//! Serves `/metrics` for Prometheus scraping from a background tokio task.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::metrics::MetricRegistry;

/// Handler for GET /metrics - returns the registry in Prometheus text format.
async fn metrics_handler(State(registry): State<Arc<MetricRegistry>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        registry.gather_text(),
    )
}

/// Router exposing `registry` at `/metrics`.
pub fn router(registry: Arc<MetricRegistry>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry)
}

/// Run the metrics endpoint on `addr`.
///
/// This is a long-running task that should be spawned in the background.
/// Bind and serve errors are logged, not returned.
pub async fn serve(registry: Arc<MetricRegistry>, addr: SocketAddr) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind metrics endpoint");
            return;
        }
    };
    tracing::info!(%addr, "Prometheus HTTP server listening");

    if let Err(e) = axum::serve(listener, router(registry)).await {
        tracing::error!(error = %e, "Metrics endpoint error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricsConfig;
    use crate::metrics::{ConnectionMetrics, MetricsFacade};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_metrics_handler_exports_text() {
        let facade = MetricsFacade::new(MetricsConfig::default()).unwrap();
        let server = facade.create_http_server_metrics("127.0.0.1:8080".parse().ok()).unwrap();
        server.end_request(server.begin_request("GET", "/"), 200);

        let response = metrics_handler(State(Arc::clone(facade.registry())))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            prometheus::TEXT_FORMAT
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains(r#"http_servers_responses{code="200",local="127.0.0.1:8080"} 1"#));
        assert!(text.contains("runtime_worker_pool_size 20"));
    }
}
