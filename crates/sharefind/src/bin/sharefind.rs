//! Server binary: loads `.env` and the environment, starts the periodic
//! scanner, and serves the API until Ctrl-C.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use sharefind::config::DEFAULT_API_TOKEN;
use sharefind::{AppConfig, Server};
use shareindex::ShareIndexService;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("sharefind: {error}");
            std::process::exit(2);
        }
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.server.log_level.as_str()),
    )
    .init();

    if let Err(error) = run(config).await {
        log::error!("sharefind stopped: {}", error);
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), String> {
    let AppConfig { service, server } = config;
    if server.api_token == DEFAULT_API_TOKEN {
        log::warn!("API_TOKEN is not set; using the default token");
    }
    if service.shares.is_empty() {
        log::warn!("no shares configured; set FILE_SERVER_1 to index a share");
    }
    log::info!(
        "starting sharefind port={} shares={} scan_interval_secs={}",
        server.port,
        service.shares.len(),
        service.scan_interval.as_secs()
    );

    let service = Arc::new(ShareIndexService::from_config(service).map_err(|error| error.to_string())?);
    let cancel = CancellationToken::new();
    let scheduler = service.spawn_scheduler(cancel.clone());

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, server.port));
    let mut http = Server::new(service, server.api_token, addr).await?;

    if let Err(error) = tokio::signal::ctrl_c().await {
        log::warn!("failed to listen for shutdown signal: {}", error);
    }
    log::info!("shutting down");
    cancel.cancel();
    http.shutdown()?;
    let _ = scheduler.await;
    Ok(())
}
