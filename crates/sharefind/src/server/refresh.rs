use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::server::error::{ApiError, ApiErrorResponse};
use crate::server::ServerState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct RefreshQuery {
    /// Refresh only this share; every share when omitted.
    pub server: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub started: bool,
    pub server: Option<String>,
    pub message: String,
}

/// Starts a forced rescan in the background and returns immediately.
#[utoipa::path(
    post,
    path = "/api/refresh",
    tag = "scan",
    params(RefreshQuery),
    responses(
        (status = 200, body = RefreshResponse),
        (status = 401, body = ApiErrorResponse),
        (status = 404, body = ApiErrorResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub(crate) async fn refresh(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<RefreshQuery>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let server = params.server.filter(|server| !server.trim().is_empty());
    state.service.spawn_refresh(server.clone())?;
    let message = match &server {
        Some(name) => format!("Started refresh for server: {name}"),
        None => "Started refresh for all servers".to_string(),
    };
    tracing::info!("{}", message);
    Ok(Json(RefreshResponse {
        started: true,
        server,
        message,
    }))
}
