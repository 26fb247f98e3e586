use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use shareindex::{ShareDescriptor, ShareStatus, StatusSummary};

use crate::server::error::{ApiError, ApiErrorResponse};
use crate::server::ServerState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiShareStatus {
    pub files_count: usize,
    pub last_scan: Option<DateTime<Utc>>,
    /// `idle`, `enumerating`, or `scanning <directory>`.
    pub phase: String,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub last_scan_time: Option<DateTime<Utc>>,
    pub scanning_in_progress: bool,
    pub total_files: usize,
    pub shares: BTreeMap<String, ApiShareStatus>,
    pub cache_connected: bool,
}

impl From<ShareStatus> for ApiShareStatus {
    fn from(status: ShareStatus) -> Self {
        Self {
            files_count: status.files_count,
            last_scan: status.last_scan,
            phase: status.phase,
            last_error: status.last_error,
        }
    }
}

impl From<StatusSummary> for StatusResponse {
    fn from(summary: StatusSummary) -> Self {
        Self {
            last_scan_time: summary.last_scan_time,
            scanning_in_progress: summary.scanning_in_progress,
            total_files: summary.total_files,
            shares: summary
                .shares
                .into_iter()
                .map(|(name, status)| (name, status.into()))
                .collect(),
            cache_connected: summary.cache_connected,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub display_name: String,
    pub path: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServersResponse {
    pub servers: Vec<ServerInfo>,
    pub count: usize,
}

impl From<ShareDescriptor> for ServerInfo {
    fn from(share: ShareDescriptor) -> Self {
        Self {
            name: share.name,
            display_name: share.display_name,
            path: share.path,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/status",
    tag = "status",
    responses(
        (status = 200, body = StatusResponse),
        (status = 401, body = ApiErrorResponse),
    )
)]
pub(crate) async fn status(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(state.service.status_summary().await.into()))
}

#[utoipa::path(
    get,
    path = "/api/servers",
    tag = "status",
    responses(
        (status = 200, body = ServersResponse),
        (status = 401, body = ApiErrorResponse),
    )
)]
pub(crate) async fn list_servers(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<ServersResponse>, ApiError> {
    let servers: Vec<ServerInfo> = state
        .service
        .list_servers()
        .into_iter()
        .map(ServerInfo::from)
        .collect();
    Ok(Json(ServersResponse {
        count: servers.len(),
        servers,
    }))
}
