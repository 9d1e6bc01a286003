// Metrics endpoint

use crate::core::error::AdminError;
use crate::core::state::AppState;
use crate::models::admin::ApiKeyQuery;
use crate::utils::auth::authorize_admin;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::warn;

/// Returns JSON with all tracker statistics including:
/// - Total announces, successful/failed counts, success rate
/// - Scrapes, UDP packets, blocked and rate-limited requests
/// - Accounted traffic and evicted peers
/// - Active peers and swarms, uptime and requests per second
///
/// Requires the admin API key.
pub async fn metrics_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ApiKeyQuery>,
) -> Result<Response, AdminError> {
    authorize_admin(state.config.access.admin_api_key.as_deref(), &params.api_key).inspect_err(
        |_| warn!("Unauthorized metrics access attempt"),
    )?;

    let snapshot = state.metrics.get_snapshot(state.swarm_store.as_ref());

    Ok((StatusCode::OK, Json(snapshot)).into_response())
}
