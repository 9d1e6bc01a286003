use crate::bencode::response::build_announce_response;
use crate::core::error::TrackerError;
use crate::core::state::AppState;
use crate::engine::announce::{announce, AnnounceRequest};
use crate::utils::hex::url_decode;
use crate::validation::params::AnnounceParams;
use axum::{
    extract::{ConnectInfo, RawQuery, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Announce handler
///
/// GET /announce
///
/// # Flow
/// 1. Parse and validate query parameters (400 on failure)
/// 2. Resolve the address the peer is registered at
/// 3. Hand off to the engine: admission, swarm update, peer selection
/// 4. Encode the compact bencode response
#[instrument(skip(state, raw_query))]
pub async fn announce_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, TrackerError> {
    let query = raw_query.unwrap_or_default();
    let params = AnnounceParams::from_query(&query);

    let prepared = params
        .validate()
        .map_err(TrackerError::from)
        .and_then(|validated| {
            let ip = peer_address(params.ip, addr.ip(), state.config.tracker.accept_ip_param)?;
            Ok((validated, ip))
        });

    let (validated, ip) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            state.metrics.increment_announces();
            state.metrics.increment_failed();
            debug!(addr = %addr, error = %e, "Rejected malformed announce");
            return Err(e);
        }
    };

    let outcome = announce(
        &state,
        AnnounceRequest {
            info_hash: validated.info_hash,
            peer_id: validated.peer_id,
            remote_ip: addr.ip(),
            ip,
            port: validated.port,
            uploaded: validated.uploaded,
            downloaded: validated.downloaded,
            left: validated.left,
            event: validated.event,
            numwant: validated.numwant,
        },
    )
    .await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        build_announce_response(&outcome.peers, outcome.interval),
    )
        .into_response())
}

/// A supplied `ip` must always parse; it only overrides the socket address when enabled
fn peer_address(
    param: Option<&str>,
    socket_ip: IpAddr,
    accept_param: bool,
) -> Result<IpAddr, TrackerError> {
    let Some(raw) = param.filter(|v| !v.is_empty()) else {
        return Ok(socket_ip);
    };

    let decoded = url_decode(raw)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| TrackerError::InvalidAddress(raw.to_string()))?;

    let ip = decoded
        .parse::<IpAddr>()
        .map_err(|_| TrackerError::InvalidAddress(decoded.clone()))?;

    Ok(if accept_param { ip } else { socket_ip })
}
