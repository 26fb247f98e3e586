use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use shareindex::{BuildTypeFilter, FileEntry, SearchPage, SearchQuery};

use crate::server::error::{ApiError, ApiErrorResponse};
use crate::server::ServerState;

/// Largest page a single search may request.
const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// `|`-separated terms; every term must appear in the file name.
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub server: Option<String>,
    /// `release`, `debug`, or `combine`.
    #[serde(default = "default_build_type", alias = "build_type")]
    pub build_type: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_build_type() -> String {
    "release".to_string()
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiFileEntry {
    pub relative_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub created_time: DateTime<Utc>,
    pub server_prefix: String,
    pub build_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_time_ms: Option<u64>,
}

impl From<FileEntry> for ApiFileEntry {
    fn from(entry: FileEntry) -> Self {
        Self {
            relative_path: entry.relative_path,
            file_name: entry.file_name,
            file_size: entry.file_size,
            created_time: entry.created_time,
            server_prefix: entry.server_prefix,
            build_type: entry.build_type.as_str().to_string(),
            digest: entry.digest,
            download_time_ms: entry.download_time_ms,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub total: usize,
    pub items: Vec<ApiFileEntry>,
    pub limit: usize,
    pub offset: usize,
}

impl From<SearchPage> for SearchResponse {
    fn from(page: SearchPage) -> Self {
        Self {
            total: page.total,
            items: page.items.into_iter().map(ApiFileEntry::from).collect(),
            limit: page.limit,
            offset: page.offset,
        }
    }
}

impl SearchRequest {
    fn into_query(self) -> Result<SearchQuery, ApiError> {
        let build_type = BuildTypeFilter::parse(&self.build_type).ok_or_else(|| {
            ApiError::from(shareindex::ShareIndexError::InvalidInput(format!(
                "unknown build type: {}",
                self.build_type
            )))
        })?;
        Ok(SearchQuery {
            keyword: self.keyword,
            share: self.server.filter(|server| !server.trim().is_empty()),
            build_type,
            limit: self.limit.min(MAX_LIMIT),
            offset: self.offset,
        })
    }
}

#[utoipa::path(
    post,
    path = "/api/search",
    tag = "search",
    request_body = SearchRequest,
    responses(
        (status = 200, body = SearchResponse),
        (status = 400, body = ApiErrorResponse),
        (status = 401, body = ApiErrorResponse),
        (status = 404, body = ApiErrorResponse),
        (status = 503, body = ApiErrorResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub(crate) async fn search(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = payload.into_query()?;
    let page = state.service.search(&query).await?;
    tracing::info!(
        "search keyword={} server={} total={}",
        query.keyword,
        query.share.as_deref().unwrap_or("*"),
        page.total
    );
    Ok(Json(page.into()))
}
