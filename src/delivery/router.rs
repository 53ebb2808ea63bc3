use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::core::config::{AppConfig, DeliveryConfig};
use crate::source::RemoteClient;

use super::handlers;
use super::middleware::RequestIdLayer;

// ---------------------------------------------------------------------------
// Stream bridge router
// ---------------------------------------------------------------------------

/// Application state shared across all handlers.
///
/// The remote client is injected here once at startup; handlers never reach
/// for a global.
pub struct AppState<R> {
    pub remote: Arc<R>,
    pub config: AppConfig,
    pub start_time: Instant,
    /// Absent when metrics are disabled; `/metrics` then answers 503.
    pub metrics_handle: Option<PrometheusHandle>,
}

impl<R> AppState<R> {
    pub fn new(remote: Arc<R>, config: AppConfig, metrics_handle: Option<PrometheusHandle>) -> Self {
        Self {
            remote,
            config,
            start_time: Instant::now(),
            metrics_handle,
        }
    }
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            config: self.config.clone(),
            start_time: self.start_time,
            metrics_handle: self.metrics_handle.clone(),
        }
    }
}

/// Build the full Axum router with all routes.
///
/// - `GET  /`: liveness text
/// - `GET  /healthz`: liveness probe
/// - `GET  /metrics`: Prometheus metrics
/// - `GET|HEAD /stream/{container_id}/{object_id}`: ranged media stream
/// - `GET  /links/{container_id}/{object_id}`: share links for a file
pub fn build_router<R: RemoteClient>(state: AppState<R>, delivery_config: &DeliveryConfig) -> Router {
    tracing::info!(
        cors_origins = ?delivery_config.cors_allowed_origins,
        chunk_size_bytes = state.config.streaming.chunk_size_bytes,
        "delivery configuration loaded"
    );

    let cors = CorsLayer::new()
        .allow_origin(allow_origin(&delivery_config.cors_allowed_origins))
        .allow_methods([http::Method::GET, http::Method::HEAD, http::Method::OPTIONS])
        .allow_headers([http::header::RANGE])
        .expose_headers([
            http::header::CONTENT_LENGTH,
            http::header::CONTENT_RANGE,
            http::header::ACCEPT_RANGES,
        ])
        .max_age(std::time::Duration::from_secs(86400));

    Router::new()
        .route("/", get(handlers::home))
        .route("/healthz", get(handlers::healthz::<R>))
        .route("/metrics", get(handlers::metrics_handler::<R>))
        .route(
            "/stream/{container_id}/{object_id}",
            get(handlers::stream_media::<R>),
        )
        .route(
            "/links/{container_id}/{object_id}",
            get(handlers::share_links::<R>),
        )
        .layer(cors)
        .layer(RequestIdLayer)
        .with_state(state)
}

fn allow_origin(origins: &[String]) -> AllowOrigin {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return AllowOrigin::from(Any);
    }
    let parsed: Vec<http::HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    AllowOrigin::list(parsed)
}
