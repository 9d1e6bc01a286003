use crate::core::error::AdminError;
use crate::core::state::AppState;
use crate::engine::bounded;
use crate::models::admin::{AccessEntryQuery, AccessListResponse, ApiKeyQuery, SuccessResponse};
use crate::stores::access_list::ListKind;
use crate::utils::auth::authorize_admin;
use crate::wal::wal::{append, WalOperation};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Put an IP on the allow list, taking it off the deny list
///
/// GET /access/allow?api_key=<key>&ip=<ip>
pub async fn allow_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AccessEntryQuery>,
) -> Result<Response, AdminError> {
    let ip = authorize_entry(&state, &params, "allow")?;

    bounded(
        "access_insert",
        state.config.server.request_timeout(),
        state.access.lists().insert(ListKind::Allow, ip),
    )
    .await?;

    log_change(&state, WalOperation::Allow { ip }).await;
    info!(ip = %ip, "IP address allowed");

    Ok(success("IP address allowed successfully"))
}

/// Put an IP on the deny list, taking it off the allow list
///
/// GET /access/deny?api_key=<key>&ip=<ip>
pub async fn deny_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AccessEntryQuery>,
) -> Result<Response, AdminError> {
    let ip = authorize_entry(&state, &params, "deny")?;

    bounded(
        "access_insert",
        state.config.server.request_timeout(),
        state.access.lists().insert(ListKind::Deny, ip),
    )
    .await?;

    log_change(&state, WalOperation::Deny { ip }).await;
    info!(ip = %ip, "IP address denied");

    Ok(success("IP address denied successfully"))
}

/// Drop an IP from both lists
///
/// GET /access/remove?api_key=<key>&ip=<ip>
pub async fn remove_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AccessEntryQuery>,
) -> Result<Response, AdminError> {
    let ip = authorize_entry(&state, &params, "remove")?;

    bounded(
        "access_remove",
        state.config.server.request_timeout(),
        state.access.lists().remove(ip),
    )
    .await?;

    log_change(&state, WalOperation::RemoveAccess { ip }).await;
    info!(ip = %ip, "IP address removed from access lists");

    Ok(success("IP address removed successfully"))
}

/// GET /access/list?api_key=<key>
pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ApiKeyQuery>,
) -> Result<Response, AdminError> {
    authorize_admin(state.config.access.admin_api_key.as_deref(), &params.api_key)
        .inspect_err(|_| warn!("Unauthorized access list attempt"))?;

    let timeout = state.config.server.request_timeout();
    let lists = state.access.lists();

    let mut allowed = bounded("access_list", timeout, lists.list(ListKind::Allow)).await?;
    let mut denied = bounded("access_list", timeout, lists.list(ListKind::Deny)).await?;
    allowed.sort();
    denied.sort();

    Ok((
        StatusCode::OK,
        Json(AccessListResponse {
            success: true,
            allowed: allowed.iter().map(IpAddr::to_string).collect(),
            denied: denied.iter().map(IpAddr::to_string).collect(),
        }),
    )
        .into_response())
}

fn authorize_entry(
    state: &AppState,
    params: &AccessEntryQuery,
    action: &'static str,
) -> Result<IpAddr, AdminError> {
    authorize_admin(state.config.access.admin_api_key.as_deref(), &params.api_key)
        .inspect_err(|_| warn!(action, "Unauthorized access list change attempt"))?;

    params
        .ip
        .parse()
        .map_err(|e| AdminError::InvalidIpAddress(format!("{}: {}", params.ip, e)))
}

async fn log_change(state: &AppState, operation: WalOperation) {
    let line = operation.to_string();
    if let Err(e) = append(&state.wal, operation).await {
        // Lists are already updated; only durability across restarts is lost
        warn!(operation = %line, error = %e, "Failed to log access list change to WAL");
    }
}

fn success(message: &str) -> Response {
    (
        StatusCode::OK,
        Json(SuccessResponse {
            success: true,
            message: message.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;
    use crate::handlers::test_support::{app, get};

    fn config_with_key() -> crate::core::config::Config {
        let mut config = test_config();
        config.access.admin_api_key = Some("secret".to_string());
        config
    }

    #[tokio::test]
    async fn test_allow_then_deny_moves_ip() {
        let (state, _dir) = test_state(config_with_key());
        let ip: IpAddr = "203.0.113.7".parse().unwrap();

        let (status, _, _) = get(
            app(Arc::clone(&state)),
            "/access/allow?api_key=secret&ip=203.0.113.7",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.access.is_allowed(ip).await.unwrap());

        let (status, _, _) = get(
            app(Arc::clone(&state)),
            "/access/deny?api_key=secret&ip=203.0.113.7",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!state.access.is_allowed(ip).await.unwrap());
    }

    #[tokio::test]
    async fn test_changes_are_logged_to_wal() {
        let (state, _dir) = test_state(config_with_key());

        get(app(Arc::clone(&state)), "/access/allow?api_key=secret&ip=10.9.9.9").await;
        get(app(Arc::clone(&state)), "/access/deny?api_key=secret&ip=10.9.9.8").await;
        get(app(Arc::clone(&state)), "/access/remove?api_key=secret&ip=10.9.9.9").await;

        let ops = state.wal.replay().unwrap();
        assert_eq!(
            ops,
            vec![
                WalOperation::Allow { ip: "10.9.9.9".parse().unwrap() },
                WalOperation::Deny { ip: "10.9.9.8".parse().unwrap() },
                WalOperation::RemoveAccess { ip: "10.9.9.9".parse().unwrap() },
            ]
        );
    }

    #[tokio::test]
    async fn test_list_reports_both_lists() {
        let mut config = config_with_key();
        config.access.allowed_ips = vec!["10.0.0.2".to_string(), "10.0.0.1".to_string()];
        config.access.denied_ips = vec!["192.0.2.1".to_string()];
        let (state, _dir) = test_state(config);

        let (status, content_type, body) = get(app(state), "/access/list?api_key=secret").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "application/json");

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["allowed"], serde_json::json!(["10.0.0.1", "10.0.0.2"]));
        assert_eq!(json["denied"], serde_json::json!(["192.0.2.1"]));
    }

    #[tokio::test]
    async fn test_invalid_ip_is_bad_request() {
        let (state, _dir) = test_state(config_with_key());

        let (status, _, body) = get(app(state), "/access/allow?api_key=secret&ip=nope").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_wrong_key_is_unauthorized() {
        let (state, _dir) = test_state(config_with_key());

        let (status, _, _) = get(
            app(Arc::clone(&state)),
            "/access/deny?api_key=guess&ip=10.0.0.1",
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(state.wal.replay().unwrap().is_empty());
    }
}
