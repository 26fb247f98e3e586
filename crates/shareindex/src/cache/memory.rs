//! In-memory cache store.
//!
//! Each directory holds one `Arc<DirectoryRecord>`. A commit swaps that
//! `Arc` under a short write lock, so a reader holding the previous `Arc`
//! keeps a consistent index/metadata pair.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{apply_backfill, CacheStore};
use crate::error::Result;
use crate::types::{DirectoryIndex, DirectoryRecord, EntryBackfill, ScanMeta};

type ShareRecords = BTreeMap<String, Arc<DirectoryRecord>>;

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    shares: RwLock<HashMap<String, ShareRecords>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, share: &str, top_level: &str) -> Option<Arc<DirectoryRecord>> {
        self.shares
            .read()
            .get(share)
            .and_then(|records| records.get(top_level))
            .cloned()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get_scan_meta(&self, share: &str, top_level: &str) -> Result<Option<ScanMeta>> {
        Ok(self.record(share, top_level).map(|record| record.meta))
    }

    async fn get_directory_index(
        &self,
        share: &str,
        top_level: &str,
    ) -> Result<Option<DirectoryIndex>> {
        Ok(self
            .record(share, top_level)
            .map(|record| record.index.clone()))
    }

    async fn get_directory_record(
        &self,
        share: &str,
        top_level: &str,
    ) -> Result<Option<DirectoryRecord>> {
        Ok(self
            .record(share, top_level)
            .map(|record| DirectoryRecord::clone(&record)))
    }

    async fn put_directory_index(
        &self,
        share: &str,
        top_level: &str,
        index: DirectoryIndex,
        meta: ScanMeta,
    ) -> Result<()> {
        let record = Arc::new(DirectoryRecord { index, meta });
        self.shares
            .write()
            .entry(share.to_string())
            .or_default()
            .insert(top_level.to_string(), record);
        Ok(())
    }

    async fn list_directories(&self, share: &str) -> Result<Vec<String>> {
        Ok(self
            .shares
            .read()
            .get(share)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn backfill_entry(
        &self,
        share: &str,
        top_level: &str,
        relative_path: &str,
        backfill: EntryBackfill,
    ) -> Result<bool> {
        let mut shares = self.shares.write();
        let Some(slot) = shares
            .get_mut(share)
            .and_then(|records| records.get_mut(top_level))
        else {
            return Ok(false);
        };
        let mut updated = DirectoryRecord::clone(slot);
        if !apply_backfill(&mut updated.index, relative_path, &backfill) {
            return Ok(false);
        }
        *slot = Arc::new(updated);
        Ok(true)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
