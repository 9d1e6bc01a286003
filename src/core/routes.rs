// HTTP routes configuration

use crate::core::state::AppState;
use crate::handlers::{access, announce, fallback, health, metrics, scrape};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Public endpoints
        .route("/announce", get(announce::announce_handler))
        .route("/scrape", get(scrape::scrape_handler))
        .route("/health", get(health::health_handler))

        // Admin endpoints (require API key)
        .route("/metrics", get(metrics::metrics_handler))
        .route("/access/allow", get(access::allow_handler))
        .route("/access/deny", get(access::deny_handler))
        .route("/access/remove", get(access::remove_handler))
        .route("/access/list", get(access::list_handler))

        // 404 fallback for all unmatched routes
        .fallback(fallback::fallback_handler)

        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                    .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
            ),
        )
        .with_state(state)
}
