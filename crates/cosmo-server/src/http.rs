//! HTTP listener: the transport-layer callback plus operational endpoints.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::docs::{api_docs, api_docs_yaml};
use crate::errors::ReceiveError;
use crate::health::health;
use crate::inbound::receive;
use crate::registry::ConnectionRegistry;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub earth: Arc<ConnectionRegistry>,
    pub mars: Arc<ConnectionRegistry>,
    pub start_time: Instant,
    pub metrics: PrometheusHandle,
}

/// Build the HTTP router.
pub fn http_router(state: HttpState) -> Router {
    Router::new()
        .route("/receive", post(receive))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/api-docs.json", get(api_docs))
        .route("/api-docs.yaml", get(api_docs_yaml))
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn metrics_handler(State(state): State<HttpState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "handler panicked");
    ReceiveError::Internal(detail.to_owned()).into_response()
}
