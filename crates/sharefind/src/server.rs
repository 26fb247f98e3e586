use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use utoipa::ToSchema;

use shareindex::ShareIndexService;

mod auth;
pub mod download;
pub mod error;
pub mod openapi;
pub mod refresh;
pub mod search;
pub mod status;

pub struct Server {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Server {
    /// Binds `addr` (port 0 picks a free port) and serves until
    /// [`shutdown`](Self::shutdown) or drop.
    pub async fn new(
        service: Arc<ShareIndexService>,
        api_token: String,
        addr: SocketAddr,
    ) -> Result<Self, String> {
        let state = Arc::new(ServerState { service, api_token });
        let app = router(state);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|error| error.to_string())?;
        let addr = listener
            .local_addr()
            .map_err(|error| error.to_string())?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });
        tracing::info!("sharefind listening addr={}", addr);

        Ok(Server {
            addr,
            shutdown: Some(shutdown_tx),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(&mut self) -> Result<(), String> {
        if let Some(sender) = self.shutdown.take() {
            sender
                .send(())
                .map_err(|_| "failed to send server shutdown signal".to_string())
        } else {
            Ok(())
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let api = Router::new()
        .route("/search", post(search::search))
        .route("/refresh", post(refresh::refresh))
        .route("/download", get(download::download))
        .route("/file/info", get(download::file_info))
        .route("/status", get(status::status))
        .route("/servers", get(status::list_servers))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ));
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api", api)
        .with_state(state)
        .layer(cors)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/",
    tag = "status",
    responses((status = 200, body = RootResponse))
)]
pub(crate) async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Sharefind server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn health() -> &'static str {
    "ok"
}

pub(crate) struct ServerState {
    pub(crate) service: Arc<ShareIndexService>,
    pub(crate) api_token: String,
}
