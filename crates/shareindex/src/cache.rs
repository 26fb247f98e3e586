//! Cache store for directory indexes and their scan metadata.
//!
//! A directory's index and its [`ScanMeta`] are only ever written together
//! through [`CacheStore::put_directory_index`]; readers see either the old
//! pair or the new pair. Entries are never deleted one by one: a file that
//! disappears from a share drops out when its directory is re-scanned.

pub mod file;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::query::EntryMatcher;
use crate::types::{DirectoryIndex, DirectoryRecord, EntryBackfill, ScanMeta, SearchPage, SearchQuery};

pub use file::FileCacheStore;
pub use memory::MemoryCacheStore;

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_scan_meta(&self, share: &str, top_level: &str) -> Result<Option<ScanMeta>>;

    async fn get_directory_index(
        &self,
        share: &str,
        top_level: &str,
    ) -> Result<Option<DirectoryIndex>>;

    /// The index together with the metadata it was committed with.
    async fn get_directory_record(
        &self,
        share: &str,
        top_level: &str,
    ) -> Result<Option<DirectoryRecord>>;

    /// Atomically replaces the index and metadata of one directory.
    async fn put_directory_index(
        &self,
        share: &str,
        top_level: &str,
        index: DirectoryIndex,
        meta: ScanMeta,
    ) -> Result<()>;

    /// Top-level directories that have a committed record, sorted.
    async fn list_directories(&self, share: &str) -> Result<Vec<String>>;

    /// Writes a digest or duration sample into one entry.
    ///
    /// Replaces the whole record with an updated copy and keeps the metadata.
    /// Returns `false` when the entry is not cached or its size differs from
    /// `backfill.content_length`.
    async fn backfill_entry(
        &self,
        share: &str,
        top_level: &str,
        relative_path: &str,
        backfill: EntryBackfill,
    ) -> Result<bool>;

    /// Fails with `CacheUnavailable` when the backend cannot be reached.
    async fn ping(&self) -> Result<()>;

    /// Evaluates `query` over every cached record of `shares`.
    async fn search_entries(&self, shares: &[String], query: &SearchQuery) -> Result<SearchPage> {
        let matcher = EntryMatcher::new(query);
        let mut indexes = Vec::new();
        for share in shares {
            for top_level in self.list_directories(share).await? {
                if let Some(index) = self.get_directory_index(share, &top_level).await? {
                    indexes.push(index);
                }
            }
        }
        Ok(matcher.page(indexes.iter().flat_map(|index| index.files.iter())))
    }
}

pub type SharedCacheStore = Arc<dyn CacheStore>;

/// Applies `backfill` to the entry at `relative_path`, returning whether it
/// was found with a matching size.
pub(crate) fn apply_backfill(
    index: &mut DirectoryIndex,
    relative_path: &str,
    backfill: &EntryBackfill,
) -> bool {
    let Some(entry) = index
        .files
        .iter_mut()
        .find(|entry| entry.relative_path == relative_path)
    else {
        return false;
    };
    if backfill
        .content_length
        .is_some_and(|length| length != entry.file_size)
    {
        return false;
    }
    if let Some(digest) = &backfill.digest {
        entry.digest = Some(digest.clone());
    }
    if let Some(duration) = backfill.download_time_ms {
        entry.download_time_ms = Some(duration);
    }
    true
}
