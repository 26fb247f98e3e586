//! Layered file size resolution.
//!
//! Some share protocols report zero or no size for files that are not empty.
//! Strategies run in order and the first one that knows the size wins:
//!
//! 1. [`StatSize`]: the share's metadata lookup.
//! 2. [`QuerySize`]: the share's alternate size query.
//! 3. [`StreamProbe`]: reads the file up to a byte limit and counts.
//!
//! `NotFound` from any strategy ends resolution with `NotFound`. Other
//! failures fall through to the next strategy.

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::error::{Result, ShareIndexError};
use crate::share::ShareClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedSize {
    Known(u64),
    Unknown,
}

impl ResolvedSize {
    pub fn known(self) -> Option<u64> {
        match self {
            Self::Known(size) => Some(size),
            Self::Unknown => None,
        }
    }
}

#[async_trait]
pub trait SizeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when this strategy cannot tell the size.
    async fn resolve(&self, client: &dyn ShareClient, relative_path: &str) -> Result<Option<u64>>;
}

#[derive(Debug, Default)]
pub struct StatSize;

#[async_trait]
impl SizeStrategy for StatSize {
    fn name(&self) -> &'static str {
        "stat"
    }

    async fn resolve(&self, client: &dyn ShareClient, relative_path: &str) -> Result<Option<u64>> {
        Ok(client.stat_file(relative_path).await?.size)
    }
}

#[derive(Debug, Default)]
pub struct QuerySize;

#[async_trait]
impl SizeStrategy for QuerySize {
    fn name(&self) -> &'static str {
        "query"
    }

    async fn resolve(&self, client: &dyn ShareClient, relative_path: &str) -> Result<Option<u64>> {
        client.query_size(relative_path).await
    }
}

/// Counts bytes up to `limit`; gives up on larger files.
#[derive(Debug)]
pub struct StreamProbe {
    limit: u64,
}

impl StreamProbe {
    pub fn new(limit: u64) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl SizeStrategy for StreamProbe {
    fn name(&self) -> &'static str {
        "probe"
    }

    async fn resolve(&self, client: &dyn ShareClient, relative_path: &str) -> Result<Option<u64>> {
        let mut stream = client.open_read_stream(relative_path, 0).await?;
        let mut total: u64 = 0;
        while let Some(chunk) = stream.next().await {
            total += chunk?.len() as u64;
            if total > self.limit {
                return Ok(None);
            }
        }
        Ok(Some(total))
    }
}

pub fn default_strategies(probe_limit: u64) -> Vec<Box<dyn SizeStrategy>> {
    vec![
        Box::new(StatSize),
        Box::new(QuerySize),
        Box::new(StreamProbe::new(probe_limit)),
    ]
}

pub async fn resolve_size(
    strategies: &[Box<dyn SizeStrategy>],
    client: &dyn ShareClient,
    relative_path: &str,
) -> Result<ResolvedSize> {
    for strategy in strategies {
        match strategy.resolve(client, relative_path).await {
            Ok(Some(size)) => {
                log::debug!(
                    "size resolved path={} strategy={} size={}",
                    relative_path,
                    strategy.name(),
                    size
                );
                return Ok(ResolvedSize::Known(size));
            }
            Ok(None) => {}
            Err(ShareIndexError::NotFound(path)) => return Err(ShareIndexError::NotFound(path)),
            Err(error) => {
                log::debug!(
                    "size strategy failed path={} strategy={} error={}",
                    relative_path,
                    strategy.name(),
                    error
                );
            }
        }
    }
    log::info!("size unknown path={}", relative_path);
    Ok(ResolvedSize::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::share::MemoryShare;
    use chrono::Utc;

    fn share_with(path: &str, len: usize) -> MemoryShare {
        let share = MemoryShare::new();
        share.put_file(path, vec![9u8; len], Utc::now());
        share
    }

    #[tokio::test]
    async fn stat_size_wins_when_reported() {
        let share = share_with("a/app.apk", 1000);
        let size = resolve_size(&default_strategies(10), &share, "a/app.apk")
            .await
            .expect("size");
        assert_eq!(size, ResolvedSize::Known(1000));
    }

    #[tokio::test]
    async fn zero_stat_falls_back_to_query() {
        let share = share_with("a/app.apk", 1000);
        share.set_zero_stat(true);
        let size = resolve_size(&default_strategies(10), &share, "a/app.apk")
            .await
            .expect("size");
        assert_eq!(size, ResolvedSize::Known(1000));
    }

    #[tokio::test]
    async fn probe_counts_small_files() {
        let share = share_with("a/app.apk", 300);
        share.set_zero_stat(true);
        share.set_query_size_unavailable(true);
        let size = resolve_size(&default_strategies(1024), &share, "a/app.apk")
            .await
            .expect("size");
        assert_eq!(size, ResolvedSize::Known(300));
    }

    #[tokio::test]
    async fn probe_gives_up_past_its_limit() {
        let share = share_with("a/app.apk", 300);
        share.set_zero_stat(true);
        share.set_query_size_unavailable(true);
        let size = resolve_size(&default_strategies(100), &share, "a/app.apk")
            .await
            .expect("size");
        assert_eq!(size, ResolvedSize::Unknown);
    }

    #[tokio::test]
    async fn empty_file_resolves_to_zero() {
        let share = share_with("a/empty.apk", 0);
        let size = resolve_size(&default_strategies(100), &share, "a/empty.apk")
            .await
            .expect("size");
        assert_eq!(size, ResolvedSize::Known(0));
    }

    #[tokio::test]
    async fn missing_file_stops_the_chain() {
        let share = MemoryShare::new();
        let result = resolve_size(&default_strategies(100), &share, "a/nope.apk").await;
        assert!(matches!(result, Err(ShareIndexError::NotFound(_))));
    }

    #[tokio::test]
    async fn probe_failures_degrade_to_unknown() {
        let share = share_with("a/app.apk", 300);
        share.set_zero_stat(true);
        share.set_query_size_unavailable(true);
        share.interrupt_after("a/app.apk", 50);
        let size = resolve_size(&default_strategies(1024), &share, "a/app.apk")
            .await
            .expect("size");
        assert_eq!(size, ResolvedSize::Unknown);
    }
}
