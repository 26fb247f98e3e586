//! Share client: directory listing, metadata, and byte streams for one share.
//!
//! Clients never retry. Every failure surfaces as a typed
//! [`ShareIndexError`](crate::ShareIndexError) and the caller (the scan
//! orchestrator or the download path) decides whether to try again.

pub mod memory;
pub mod mounted;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;

use crate::error::Result;
use crate::types::{FileStat, RawFileRecord};

pub use memory::MemoryShare;
pub use mounted::MountedShare;

/// Bytes read from a share. Ends early with an error if the share drops.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Lazily produced walk results.
pub type RecordStream<'a> = Pin<Box<dyn Stream<Item = Result<RawFileRecord>> + Send + 'a>>;

#[async_trait]
pub trait ShareClient: Send + Sync {
    /// Immediate child directories of the share root.
    async fn list_top_level_directories(&self) -> Result<Vec<String>>;

    /// Immediate subdirectory count of one top-level directory.
    async fn count_subdirectories(&self, top_level: &str) -> Result<usize>;

    /// Every package file below `top_level`, recursively.
    ///
    /// Calling again walks again from scratch.
    fn walk_files<'a>(&'a self, top_level: &'a str) -> RecordStream<'a>;

    /// Fast metadata lookup for one file.
    async fn stat_file(&self, relative_path: &str) -> Result<FileStat>;

    /// Alternate size lookup through a separate code path. `Ok(None)` when
    /// this path cannot tell either.
    async fn query_size(&self, relative_path: &str) -> Result<Option<u64>>;

    /// Opens the file for reading at `start_offset`. Offsets at or past EOF
    /// give an empty stream.
    async fn open_read_stream(&self, relative_path: &str, start_offset: u64)
        -> Result<ByteStream>;

    /// Whether [`open_read_stream`](Self::open_read_stream) honors arbitrary
    /// offsets without knowing the file size.
    fn supports_offset_reads(&self) -> bool {
        true
    }
}

pub type SharedShareClient = Arc<dyn ShareClient>;
