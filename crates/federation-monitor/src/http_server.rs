//! HTTP server for the status tree, the tree page and Prometheus metrics.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use federation::{StatusTree, SweepMetrics, TreeNode};
use prometheus_client::encoding::text::encode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
struct AppState {
    tree: Arc<StatusTree>,
    metrics: Arc<SweepMetrics>,
}

/// Serves `/tree`, `/` and `/metrics`
pub struct TreeServer {
    state: AppState,
    listen_addr: String,
}

impl TreeServer {
    pub fn new(tree: Arc<StatusTree>, metrics: Arc<SweepMetrics>, listen_addr: String) -> Self {
        Self {
            state: AppState { tree, metrics },
            listen_addr,
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/", get(index_handler))
            .route("/tree", get(tree_handler))
            .route("/metrics", get(metrics_handler))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(self.state.clone())
    }

    /// Run the HTTP server
    pub async fn run(self) -> std::io::Result<()> {
        let app = self.router();

        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!(listen_addr = %self.listen_addr, "HTTP server listening");

        axum::serve(listener, app).await
    }
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn tree_handler(State(state): State<AppState>) -> Json<TreeNode> {
    Json(state.tree.snapshot().await)
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    let mut buffer = String::new();
    if let Err(e) = encode(&mut buffer, &state.metrics.registry) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}
