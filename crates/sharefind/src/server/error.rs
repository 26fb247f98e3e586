use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use shareindex::ShareIndexError;

/// Standardised API error response body.
///
/// Every error returned by the HTTP layer serialises as:
/// ```json
/// { "ok": false, "error": { "code": "<code>", "message": "<message>" } }
/// ```
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorResponse,
    /// Sent with 416 so clients learn the real size.
    content_range: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiErrorResponse {
    pub ok: bool,
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorResponse {
                ok: false,
                error: ApiErrorBody {
                    code: code.into(),
                    message: message.into(),
                },
            },
            content_range: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.body.error.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(value) = self
            .content_range
            .and_then(|range| HeaderValue::from_str(&range).ok())
        {
            response.headers_mut().insert(header::CONTENT_RANGE, value);
        }
        response
    }
}

impl From<ShareIndexError> for ApiError {
    fn from(err: ShareIndexError) -> Self {
        let status = match &err {
            ShareIndexError::NotFound(_) | ShareIndexError::UnknownShare(_) => {
                StatusCode::NOT_FOUND
            }
            ShareIndexError::AccessDenied(_) => StatusCode::FORBIDDEN,
            ShareIndexError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ShareIndexError::RangeNotSupported(_) => StatusCode::NOT_IMPLEMENTED,
            ShareIndexError::ShareUnreachable(_) | ShareIndexError::TransferInterrupted(_) => {
                StatusCode::BAD_GATEWAY
            }
            ShareIndexError::CacheUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ShareIndexError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ShareIndexError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let content_range = match &err {
            ShareIndexError::RangeNotSatisfiable {
                size: Some(size), ..
            } => Some(format!("bytes */{size}")),
            _ => None,
        };
        let mut api_error = Self::new(status, err.code(), err.to_string());
        api_error.content_range = content_range;
        api_error
    }
}
