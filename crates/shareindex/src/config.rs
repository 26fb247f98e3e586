//! Service configuration types and defaults.
//!
//! Loading these from the environment is the binary's job; this module only
//! defines the shape and the parsing helpers shared by every loader.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShareIndexError};
use crate::types::ShareDescriptor;

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_SHARE_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound of bytes consumed by the stream-probe size strategy.
pub const DEFAULT_PROBE_LIMIT: u64 = 8 * 1024 * 1024;
pub const DEFAULT_PACKAGE_EXTENSION: &str = "apk";
pub const PACKAGE_CONTENT_TYPE: &str = "application/vnd.android.package-archive";

/// One remote share.
#[derive(Clone, Serialize, Deserialize)]
pub struct ShareConfig {
    /// Stable logical name (`server_1`, ...).
    pub name: String,
    pub display_name: String,
    /// UNC-style root path, copied into every entry as `server_prefix`.
    pub root: String,
    /// Local mount point through which the share is read.
    pub mount_path: PathBuf,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ShareConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareConfig")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("root", &self.root)
            .field("mount_path", &self.mount_path)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ShareConfig {
    pub fn descriptor(&self) -> ShareDescriptor {
        ShareDescriptor {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            path: self.root.clone(),
        }
    }
}

/// Bounded retry with exponential backoff for transient share failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Where the index cache lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    File { dir: PathBuf },
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub shares: Vec<ShareConfig>,
    pub cache: CacheBackend,
    pub scan_interval: Duration,
    pub share_timeout: Duration,
    pub probe_limit: u64,
    /// Package extensions without the leading dot.
    pub package_extensions: Vec<String>,
    pub retry: RetryPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            shares: Vec::new(),
            cache: CacheBackend::Memory,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            share_timeout: DEFAULT_SHARE_TIMEOUT,
            probe_limit: DEFAULT_PROBE_LIMIT,
            package_extensions: vec![DEFAULT_PACKAGE_EXTENSION.to_string()],
            retry: RetryPolicy::default(),
        }
    }
}

impl ServiceConfig {
    pub fn share(&self, name: &str) -> Option<&ShareConfig> {
        self.shares.iter().find(|share| share.name == name)
    }

    /// Rejects duplicate share names and empty extension lists.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for share in &self.shares {
            if share.name.trim().is_empty() {
                return Err(ShareIndexError::Config("share name must not be empty".into()));
            }
            if !seen.insert(share.name.as_str()) {
                return Err(ShareIndexError::Config(format!(
                    "duplicate share name {}",
                    share.name
                )));
            }
        }
        if self.package_extensions.is_empty() {
            return Err(ShareIndexError::Config(
                "at least one package extension is required".into(),
            ));
        }
        Ok(())
    }
}

/// Parses an interval such as `30s`, `5m`, `1h`, or `2d`.
///
/// Anything unparseable or too large falls back to [`DEFAULT_SCAN_INTERVAL`].
pub fn parse_interval(raw: &str) -> Duration {
    let raw = raw.trim();
    let Some(unit) = raw.chars().last() else {
        return DEFAULT_SCAN_INTERVAL;
    };
    let Ok(value) = raw[..raw.len() - unit.len_utf8()].parse::<u64>() else {
        return DEFAULT_SCAN_INTERVAL;
    };
    let seconds_per_unit = match unit.to_ascii_lowercase() {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86_400,
        _ => return DEFAULT_SCAN_INTERVAL,
    };
    value
        .checked_mul(seconds_per_unit)
        .map_or(DEFAULT_SCAN_INTERVAL, Duration::from_secs)
}
