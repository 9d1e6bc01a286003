use crate::bencode::response::build_scrape_response;
use crate::core::error::TrackerError;
use crate::core::state::AppState;
use crate::engine::scrape::scrape;
use crate::models::peer::InfoHash;
use crate::validation::params::scrape_info_hashes;
use axum::{
    extract::{ConnectInfo, RawQuery, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Scrape handler
///
/// GET /scrape?info_hash=...&info_hash=...
///
/// Values that do not decode to a 20-byte hash are skipped; the rest are
/// answered in request order.
#[instrument(skip(state, raw_query))]
pub async fn scrape_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, TrackerError> {
    let query = raw_query.unwrap_or_default();

    let info_hashes: Vec<InfoHash> = scrape_info_hashes(&query)
        .into_iter()
        .filter_map(|(raw, decoded)| match decoded {
            Ok(info_hash) => Some(info_hash),
            Err(e) => {
                warn!(addr = %addr, info_hash = %raw, error = %e, "Skipping undecodable info_hash");
                None
            }
        })
        .collect();

    let files = scrape(&state, addr.ip(), &info_hashes).await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        build_scrape_response(&files),
    )
        .into_response())
}
