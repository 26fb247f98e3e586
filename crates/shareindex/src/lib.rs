//! Package-file index over remote network shares.
//!
//! This crate provides the core of the share indexer:
//! - Share clients for mounted shares (and an in-memory share for tests)
//! - Incremental scan of top-level directories into a cache
//! - Multi-keyword search over the cached index
//! - Range-aware download streaming with layered size resolution

pub mod cache;
pub mod classify;
pub mod config;
pub mod download;
pub mod error;
pub mod query;
pub mod scan;
pub mod service;
pub mod share;
pub mod types;

// Re-export main types
pub use cache::{CacheStore, FileCacheStore, MemoryCacheStore, SharedCacheStore};
pub use classify::classify;
pub use config::{CacheBackend, RetryPolicy, ServiceConfig, ShareConfig};
pub use download::{ClientClass, DownloadRequest, DownloadResponse, DownloadStatus, Downloader};
pub use error::{Result, ShareIndexError};
pub use scan::{PassOutcome, PassReport, ScanMode, ScanOrchestrator, ScanRunState, Trigger};
pub use service::ShareIndexService;
pub use share::{MemoryShare, MountedShare, ShareClient, SharedShareClient};
pub use types::{
    BuildType, BuildTypeFilter, FileEntry, FileInfo, SearchPage, SearchQuery, ShareDescriptor,
    ShareStatus, StatusSummary,
};
