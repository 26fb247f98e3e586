use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use shareindex::{ClientClass, DownloadRequest, DownloadStatus};

use crate::server::error::{ApiError, ApiErrorResponse};
use crate::server::ServerState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct FileQuery {
    /// Share-relative path; `\` and `/` separators are both accepted.
    pub path: String,
    /// Share name, e.g. `server_1`.
    pub server: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiFileInfo {
    pub path: String,
    pub size: Option<u64>,
    pub modified_time: Option<DateTime<Utc>>,
    pub exists: bool,
}

#[utoipa::path(
    get,
    path = "/api/download",
    tag = "download",
    params(FileQuery),
    responses(
        (status = 200, description = "Whole file", content_type = "application/vnd.android.package-archive"),
        (status = 206, description = "Requested byte range", content_type = "application/vnd.android.package-archive"),
        (status = 400, body = ApiErrorResponse),
        (status = 401, body = ApiErrorResponse),
        (status = 404, body = ApiErrorResponse),
        (status = 416, body = ApiErrorResponse),
        (status = 501, body = ApiErrorResponse),
        (status = 502, body = ApiErrorResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub(crate) async fn download(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<FileQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let header_str = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let request = DownloadRequest {
        share: params.server,
        relative_path: params.path,
        range: header_str(header::RANGE),
        client: ClientClass::from_user_agent(header_str(header::USER_AGENT).as_deref()),
    };
    let share = request.share.clone();
    let download = state.service.download(request).await?;

    let status = match download.status {
        DownloadStatus::Full => StatusCode::OK,
        DownloadStatus::Partial => StatusCode::PARTIAL_CONTENT,
    };
    let mut builder = axum::http::Response::builder().status(status);
    for (name, value) in download.headers() {
        match HeaderValue::from_str(&value) {
            Ok(value) => builder = builder.header(HeaderName::from_static(name), value),
            Err(_) => tracing::warn!("dropping unencodable header name={} value={}", name, value),
        }
    }

    let file_name = download.file_name.clone();
    let body = download.body.inspect_err(move |error| {
        tracing::warn!(
            "download aborted share={} file={} error={}",
            share,
            file_name,
            error
        );
    });
    builder
        .body(Body::from_stream(body))
        .map_err(|error| ApiError::internal(error.to_string()))
}

#[utoipa::path(
    get,
    path = "/api/file/info",
    tag = "download",
    params(FileQuery),
    responses(
        (status = 200, body = ApiFileInfo),
        (status = 401, body = ApiErrorResponse),
        (status = 404, body = ApiErrorResponse),
        (status = 502, body = ApiErrorResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub(crate) async fn file_info(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<FileQuery>,
) -> Result<Json<ApiFileInfo>, ApiError> {
    let info = state.service.file_info(&params.server, &params.path).await?;
    if !info.exists {
        return Err(ApiError::not_found(format!("File not found: {}", info.path)));
    }
    Ok(Json(ApiFileInfo {
        path: info.path,
        size: info.size,
        modified_time: info.modified_time,
        exists: info.exists,
    }))
}
