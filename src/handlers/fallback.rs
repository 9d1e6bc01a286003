use axum::{
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tracing::debug;

/// Anything outside the routed endpoints
pub async fn fallback_handler(uri: Uri) -> Response {
    debug!(path = %uri.path(), "No route matched");

    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "Not Found. Valid endpoints: /announce, /scrape, /health",
    )
        .into_response()
}
