use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::server::error::ApiError;
use crate::server::ServerState;

/// Rejects `/api` requests without `Authorization: Bearer <API_TOKEN>`.
pub(crate) async fn require_token(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token_matches = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim() == state.api_token);
    match token_matches {
        Some(true) => Ok(next.run(request).await),
        Some(false) => {
            tracing::warn!("rejected request with invalid token path={}", request.uri().path());
            Err(ApiError::unauthorized("Invalid token"))
        }
        None => Err(ApiError::unauthorized("Missing bearer token")),
    }
}
