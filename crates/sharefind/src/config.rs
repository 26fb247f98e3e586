//! Environment configuration for the sharefind server.
//!
//! Shares are numbered from 1 with no gaps: `FILE_SERVER_1`,
//! `FILE_SERVER_2`, and so on. Loading stops at the first missing index.

use std::path::PathBuf;
use std::time::Duration;

use shareindex::config::{parse_interval, DEFAULT_SHARE_TIMEOUT};
use shareindex::{CacheBackend, Result, ServiceConfig, ShareConfig, ShareIndexError};

pub const DEFAULT_PORT: u16 = 9301;
pub const DEFAULT_API_TOKEN: &str = "default_token";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Clone)]
pub struct ServerSettings {
    pub port: u16,
    pub api_token: String,
    pub log_level: String,
}

impl std::fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSettings")
            .field("port", &self.port)
            .field("api_token", &"<redacted>")
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            api_token: DEFAULT_API_TOKEN.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub server: ServerSettings,
}

impl AppConfig {
    /// Reads `.env` from the working directory when present, then the
    /// process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut shares = Vec::new();
        for index in 1.. {
            let Some(root) = var(&format!("FILE_SERVER_{index}")) else {
                break;
            };
            let mount_path = match var(&format!("FILE_SERVER_{index}_MOUNT")) {
                Some(mount) => PathBuf::from(mount),
                None if root.starts_with('/') => PathBuf::from(&root),
                None => {
                    return Err(ShareIndexError::Config(format!(
                        "FILE_SERVER_{index}_MOUNT is required for {root}"
                    )))
                }
            };
            shares.push(ShareConfig {
                name: format!("server_{index}"),
                display_name: var(&format!("FILE_SERVER_{index}_NAME"))
                    .unwrap_or_else(|| format!("Server {index}")),
                root,
                mount_path,
                username: var(&format!("FILE_SERVER_{index}_USER")).unwrap_or_default(),
                password: var(&format!("FILE_SERVER_{index}_PASS")).unwrap_or_default(),
            });
        }

        let mut service = ServiceConfig {
            shares,
            ..ServiceConfig::default()
        };
        if let Some(interval) = var("UPDATE_INTERVAL") {
            service.scan_interval = parse_interval(&interval);
        }
        if let Some(dir) = var("CACHE_DIR") {
            service.cache = CacheBackend::File { dir: PathBuf::from(dir) };
        }
        service.share_timeout = match var("SHARE_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number(&raw, "SHARE_TIMEOUT_SECS")?),
            None => DEFAULT_SHARE_TIMEOUT,
        };
        if let Some(raw) = var("PACKAGE_EXTENSIONS") {
            service.package_extensions = parse_extensions(&raw);
        }
        service.validate()?;

        let port = match var("SERVER_PORT") {
            Some(raw) => parse_number(&raw, "SERVER_PORT")?,
            None => DEFAULT_PORT,
        };
        let server = ServerSettings {
            port,
            api_token: var("API_TOKEN").unwrap_or_else(|| DEFAULT_API_TOKEN.to_string()),
            log_level: var("LOG_LEVEL")
                .map(|level| level.to_ascii_lowercase())
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        };

        Ok(Self { service, server })
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| ShareIndexError::Config(format!("{key} must be a number, got {raw}")))
}

/// `".apk, XAPK"` becomes `["apk", "xapk"]`.
fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}
