use utoipa::OpenApi;

use crate::server::download::ApiFileInfo;
use crate::server::error::{ApiErrorBody, ApiErrorResponse};
use crate::server::refresh::RefreshResponse;
use crate::server::search::{ApiFileEntry, SearchRequest, SearchResponse};
use crate::server::status::{ApiShareStatus, ServerInfo, ServersResponse, StatusResponse};
use crate::server::RootResponse;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sharefind API",
        version = "0.1.0",
        description = "Search and download package files indexed from network shares"
    ),
    paths(
        crate::server::root,
        crate::server::search::search,
        crate::server::refresh::refresh,
        crate::server::download::download,
        crate::server::download::file_info,
        crate::server::status::status,
        crate::server::status::list_servers,
    ),
    components(schemas(
        // Error
        ApiErrorResponse,
        ApiErrorBody,
        // Search
        SearchRequest,
        SearchResponse,
        ApiFileEntry,
        // Download
        ApiFileInfo,
        // Status
        StatusResponse,
        ApiShareStatus,
        ServersResponse,
        ServerInfo,
        // Scan
        RefreshResponse,
        RootResponse,
    )),
    tags(
        (name = "search", description = "Search the package index"),
        (name = "download", description = "Stream package files from shares"),
        (name = "status", description = "Scan and cache status"),
        (name = "scan", description = "Manual rescans"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/",
            "/api/search",
            "/api/refresh",
            "/api/download",
            "/api/file/info",
            "/api/status",
            "/api/servers",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
