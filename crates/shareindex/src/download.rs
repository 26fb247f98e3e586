//! Range-aware download streaming from shares.
//!
//! A download resolves the file size through the strategy chain in
//! [`size`], maps the optional `Range` header onto a start offset and a byte
//! cap, and returns a [`DownloadResponse`] whose body streams directly from
//! the share. Nothing is buffered to disk; dropping the body closes the share
//! read.
//!
//! ## Status selection
//!
//! | range header | size known | result |
//! |---|---|---|
//! | none or malformed | either | 200, full body |
//! | satisfiable | yes | 206, `bytes s-e/size` |
//! | unsatisfiable | yes | `RangeNotSatisfiable` |
//! | `bytes=s-[e]` | no | 206 via offset read, or `RangeNotSupported` |
//!
//! Complete full-body transfers of known size are hashed on the way through
//! and the digest plus transfer time are written back to the cached entry.

mod range;
mod shaping;
mod size;
mod stream;

use std::collections::HashMap;

use crate::cache::SharedCacheStore;
use crate::config::PACKAGE_CONTENT_TYPE;
use crate::error::{Result, ShareIndexError};
use crate::share::{ByteStream, SharedShareClient};
use crate::types::{normalize_relative, top_level_of, EntryBackfill, FileInfo};

pub use range::ByteRange;
pub use shaping::{content_disposition, ClientClass, TransferMode};
pub use size::{
    default_strategies, resolve_size, QuerySize, ResolvedSize, SizeStrategy, StatSize,
    StreamProbe,
};
pub use stream::{digest_tap, limit_stream, DigestSample};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub share: String,
    pub relative_path: String,
    /// Raw `Range` header value.
    pub range: Option<String>,
    pub client: ClientClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Full,
    Partial,
}

impl DownloadStatus {
    pub fn code(self) -> u16 {
        match self {
            Self::Full => 200,
            Self::Partial => 206,
        }
    }
}

pub struct DownloadResponse {
    pub status: DownloadStatus,
    pub file_name: String,
    pub total_size: Option<u64>,
    /// Body length, when it is known up front.
    pub content_length: Option<u64>,
    pub content_range: Option<String>,
    pub content_type: &'static str,
    pub transfer_mode: TransferMode,
    pub body: ByteStream,
}

impl std::fmt::Debug for DownloadResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadResponse")
            .field("status", &self.status)
            .field("file_name", &self.file_name)
            .field("total_size", &self.total_size)
            .field("content_length", &self.content_length)
            .field("content_range", &self.content_range)
            .field("transfer_mode", &self.transfer_mode)
            .finish()
    }
}

impl DownloadResponse {
    /// Response headers, lowercase names.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("content-type", self.content_type.to_string()),
            ("content-disposition", content_disposition(&self.file_name)),
            ("accept-ranges", "bytes".to_string()),
        ];
        if let Some(length) = self.content_length {
            headers.push(("content-length", length.to_string()));
        }
        if let Some(content_range) = &self.content_range {
            headers.push(("content-range", content_range.clone()));
        }
        headers.extend(
            self.transfer_mode
                .headers()
                .iter()
                .map(|(name, value)| (*name, value.to_string())),
        );
        headers
    }
}

/// Where a request's bytes come from and how many of them to send.
struct TransferPlan {
    status: DownloadStatus,
    start: u64,
    length: Option<u64>,
    content_range: Option<String>,
}

pub struct Downloader {
    clients: HashMap<String, SharedShareClient>,
    cache: SharedCacheStore,
    strategies: Vec<Box<dyn SizeStrategy>>,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let strategies: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("Downloader")
            .field("shares", &self.clients.keys().collect::<Vec<_>>())
            .field("strategies", &strategies)
            .finish()
    }
}

impl Downloader {
    pub fn new(
        clients: HashMap<String, SharedShareClient>,
        cache: SharedCacheStore,
        probe_limit: u64,
    ) -> Self {
        Self::with_strategies(clients, cache, default_strategies(probe_limit))
    }

    pub fn with_strategies(
        clients: HashMap<String, SharedShareClient>,
        cache: SharedCacheStore,
        strategies: Vec<Box<dyn SizeStrategy>>,
    ) -> Self {
        Self {
            clients,
            cache,
            strategies,
        }
    }

    fn client(&self, share: &str) -> Result<&SharedShareClient> {
        self.clients
            .get(share)
            .ok_or_else(|| ShareIndexError::UnknownShare(share.to_string()))
    }

    pub async fn download(&self, request: DownloadRequest) -> Result<DownloadResponse> {
        let client = self.client(&request.share)?;
        let path = checked_path(&request.relative_path)?;
        let file_name = path.rsplit('/').next().unwrap_or(&path).to_string();

        let size = resolve_size(&self.strategies, client.as_ref(), &path).await?;
        let range = request.range.as_deref().and_then(ByteRange::parse);
        let plan = plan_transfer(range, request.range.as_deref(), size, client.supports_offset_reads())?;

        log::info!(
            "download share={} path={} range={} size={:?} status={}",
            request.share,
            path,
            request.range.as_deref().unwrap_or("-"),
            size.known(),
            plan.status.code()
        );

        let raw = client.open_read_stream(&path, plan.start).await?;
        let mut body = match plan.length {
            Some(length) => limit_stream(raw, length, size.known().is_some()),
            None => raw,
        };
        if let (DownloadStatus::Full, ResolvedSize::Known(total)) = (plan.status, size) {
            body = self.with_backfill(body, &request.share, &path, total);
        }

        Ok(DownloadResponse {
            status: plan.status,
            file_name,
            total_size: size.known(),
            content_length: plan.length.filter(|_| size.known().is_some()),
            content_range: plan.content_range,
            content_type: PACKAGE_CONTENT_TYPE,
            transfer_mode: request.client.transfer_mode(),
            body,
        })
    }

    /// Metadata for one file. A missing file gives `exists: false`.
    pub async fn file_info(&self, share: &str, relative_path: &str) -> Result<FileInfo> {
        let client = self.client(share)?;
        let path = checked_path(relative_path)?;
        let stat = match client.stat_file(&path).await {
            Ok(stat) => stat,
            Err(ShareIndexError::NotFound(_)) => {
                return Ok(FileInfo {
                    path,
                    size: None,
                    modified_time: None,
                    exists: false,
                })
            }
            Err(error) => return Err(error),
        };
        let size = match stat.size {
            Some(size) => Some(size),
            None => resolve_size(&self.strategies, client.as_ref(), &path)
                .await?
                .known(),
        };
        Ok(FileInfo {
            path,
            size,
            modified_time: stat.modified_time.or(stat.created_time),
            exists: true,
        })
    }

    fn with_backfill(&self, body: ByteStream, share: &str, path: &str, total: u64) -> ByteStream {
        let Some(top_level) = top_level_of(path).map(str::to_string) else {
            return body;
        };
        let cache = self.cache.clone();
        let share = share.to_string();
        let path = path.to_string();
        digest_tap(body, move |sample| {
            if sample.bytes != total {
                return;
            }
            tokio::spawn(async move {
                let backfill = EntryBackfill {
                    digest: Some(sample.digest),
                    download_time_ms: Some(sample.elapsed.as_millis() as u64),
                    content_length: Some(sample.bytes),
                };
                match cache.backfill_entry(&share, &top_level, &path, backfill).await {
                    Ok(true) => log::debug!("digest backfilled share={} path={}", share, path),
                    Ok(false) => log::debug!("digest not backfilled share={} path={} reason=not_cached_or_stale", share, path),
                    Err(error) => log::warn!("digest backfill failed share={} path={} error={}", share, path, error),
                }
            });
        })
    }
}

fn plan_transfer(
    range: Option<ByteRange>,
    raw_range: Option<&str>,
    size: ResolvedSize,
    offset_reads: bool,
) -> Result<TransferPlan> {
    let Some(range) = range else {
        return Ok(TransferPlan {
            status: DownloadStatus::Full,
            start: 0,
            length: size.known(),
            content_range: None,
        });
    };
    let unsatisfiable = || ShareIndexError::RangeNotSatisfiable {
        range: raw_range.unwrap_or_default().to_string(),
        size: size.known(),
    };

    match size {
        ResolvedSize::Known(total) => {
            let (start, end) = range.resolve(total).ok_or_else(unsatisfiable)?;
            Ok(TransferPlan {
                status: DownloadStatus::Partial,
                start,
                length: Some(end - start + 1),
                content_range: Some(format!("bytes {start}-{end}/{total}")),
            })
        }
        // A 206 needs `Content-Range: bytes s-e/*`, so only bounded ranges
        // can be served without a size.
        ResolvedSize::Unknown => match (offset_reads, range) {
            (true, ByteRange::From { start, end: Some(end) }) if end < start => {
                Err(unsatisfiable())
            }
            (true, ByteRange::From { start, end: Some(end) }) => Ok(TransferPlan {
                status: DownloadStatus::Partial,
                start,
                length: Some(end - start + 1),
                content_range: Some(format!("bytes {start}-{end}/*")),
            }),
            (true, _) => Err(ShareIndexError::RangeNotSupported(
                "file size unknown and range has no end".to_string(),
            )),
            (false, _) => Err(ShareIndexError::RangeNotSupported(
                "file size unknown and share cannot seek".to_string(),
            )),
        },
    }
}

/// Normalizes a client-supplied path and rejects traversal.
fn checked_path(raw: &str) -> Result<String> {
    let path = normalize_relative(raw.trim()).trim_end_matches('/').to_string();
    if path.is_empty() {
        return Err(ShareIndexError::InvalidInput("path must not be empty".into()));
    }
    if path.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(ShareIndexError::InvalidInput(format!(
            "path must not contain relative segments: {raw}"
        )));
    }
    Ok(path)
}

#[cfg(test)]
mod tests;
