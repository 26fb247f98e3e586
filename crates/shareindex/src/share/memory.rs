//! In-process share used by tests and demos.
//!
//! Supports failure injection (unreachable share, failing directories,
//! zero-size metadata, interrupted streams) and counts walks per directory.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream;
use parking_lot::Mutex;

use super::{ByteStream, RecordStream, ShareClient};
use crate::classify::is_package_file;
use crate::config::DEFAULT_PACKAGE_EXTENSION;
use crate::error::{Result, ShareIndexError};
use crate::types::{normalize_relative, FileStat, RawFileRecord};

const CHUNK_SIZE: usize = 64;

#[derive(Debug, Clone)]
struct MemoryFile {
    content: Bytes,
    created_time: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, MemoryFile>,
    directories: BTreeSet<String>,
    unreachable: bool,
    failing_directories: HashSet<String>,
    zero_stat: bool,
    no_query_size: bool,
    offset_reads: bool,
    interrupt_after: HashMap<String, usize>,
    walks: HashMap<String, usize>,
}

#[derive(Debug)]
pub struct MemoryShare {
    extensions: Vec<String>,
    state: Mutex<MemoryState>,
}

impl Default for MemoryShare {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryShare {
    pub fn new() -> Self {
        Self {
            extensions: vec![DEFAULT_PACKAGE_EXTENSION.to_string()],
            state: Mutex::new(MemoryState {
                offset_reads: true,
                ..MemoryState::default()
            }),
        }
    }

    /// Adds or replaces a file, creating its parent directories.
    pub fn put_file(&self, relative_path: &str, content: impl Into<Bytes>, created: DateTime<Utc>) {
        let path = normalize_relative(relative_path).into_owned();
        let mut state = self.state.lock();
        let segments: Vec<&str> = path.split('/').collect();
        for depth in 1..segments.len() {
            state.directories.insert(segments[..depth].join("/"));
        }
        state.files.insert(
            path.clone(),
            MemoryFile {
                content: content.into(),
                created_time: created,
            },
        );
    }

    /// Adds an empty directory (and its parents).
    pub fn put_directory(&self, relative_path: &str) {
        let path = normalize_relative(relative_path).into_owned();
        let mut state = self.state.lock();
        let segments: Vec<&str> = path.split('/').collect();
        for depth in 1..=segments.len() {
            state.directories.insert(segments[..depth].join("/"));
        }
    }

    /// Removes a file. Its directories stay.
    pub fn remove_file(&self, relative_path: &str) {
        let path = normalize_relative(relative_path).into_owned();
        self.state.lock().files.remove(&path);
    }

    /// Makes every call fail with `ShareUnreachable`.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Makes calls touching `top_level` fail with `ShareUnreachable`.
    pub fn fail_directory(&self, top_level: &str, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.failing_directories.insert(top_level.to_string());
        } else {
            state.failing_directories.remove(top_level);
        }
    }

    /// Makes `stat_file` report no size, as some share protocols do.
    pub fn set_zero_stat(&self, zero: bool) {
        self.state.lock().zero_stat = zero;
    }

    /// Makes `query_size` unable to tell the size.
    pub fn set_query_size_unavailable(&self, unavailable: bool) {
        self.state.lock().no_query_size = unavailable;
    }

    pub fn set_offset_reads(&self, supported: bool) {
        self.state.lock().offset_reads = supported;
    }

    /// Streams of `relative_path` fail after `bytes` bytes.
    pub fn interrupt_after(&self, relative_path: &str, bytes: usize) {
        let path = normalize_relative(relative_path).into_owned();
        self.state.lock().interrupt_after.insert(path, bytes);
    }

    /// How many times `top_level` has been walked.
    pub fn walk_count(&self, top_level: &str) -> usize {
        self.state.lock().walks.get(top_level).copied().unwrap_or(0)
    }

    fn check(&self, state: &MemoryState, relative_path: &str) -> Result<()> {
        if state.unreachable {
            return Err(ShareIndexError::ShareUnreachable("memory share offline".into()));
        }
        let top = normalize_relative(relative_path)
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        if state.failing_directories.contains(&top) {
            return Err(ShareIndexError::ShareUnreachable(format!(
                "memory share failure in {top}"
            )));
        }
        Ok(())
    }

    fn file(&self, relative_path: &str) -> Result<MemoryFile> {
        let state = self.state.lock();
        self.check(&state, relative_path)?;
        state
            .files
            .get(normalize_relative(relative_path).as_ref())
            .cloned()
            .ok_or_else(|| ShareIndexError::NotFound(relative_path.to_string()))
    }
}

fn child_of<'a>(path: &'a str, parent: &str) -> Option<&'a str> {
    let rest = if parent.is_empty() {
        path
    } else {
        path.strip_prefix(parent)?.strip_prefix('/')?
    };
    (!rest.is_empty() && !rest.contains('/')).then_some(rest)
}

#[async_trait]
impl ShareClient for MemoryShare {
    async fn list_top_level_directories(&self) -> Result<Vec<String>> {
        let state = self.state.lock();
        self.check(&state, "")?;
        Ok(state
            .directories
            .iter()
            .filter_map(|dir| child_of(dir, ""))
            .map(str::to_string)
            .collect())
    }

    async fn count_subdirectories(&self, top_level: &str) -> Result<usize> {
        let state = self.state.lock();
        self.check(&state, top_level)?;
        if !state.directories.contains(top_level) {
            return Err(ShareIndexError::NotFound(top_level.to_string()));
        }
        Ok(state
            .directories
            .iter()
            .filter(|dir| child_of(dir, top_level).is_some())
            .count())
    }

    fn walk_files<'a>(&'a self, top_level: &'a str) -> RecordStream<'a> {
        let snapshot = {
            let mut state = self.state.lock();
            *state.walks.entry(top_level.to_string()).or_default() += 1;
            self.check(&state, top_level).map(|()| {
                let prefix = format!("{top_level}/");
                state
                    .files
                    .iter()
                    .filter(|(path, _)| path.starts_with(&prefix))
                    .filter(|(path, _)| {
                        let name = path.rsplit('/').next().unwrap_or_default();
                        is_package_file(name, &self.extensions)
                    })
                    .map(|(path, file)| RawFileRecord {
                        relative_path: path.clone(),
                        size: file.content.len() as u64,
                        created_time: file.created_time,
                    })
                    .collect::<Vec<_>>()
            })
        };
        match snapshot {
            Ok(records) => Box::pin(stream::iter(records.into_iter().map(Ok))),
            Err(error) => Box::pin(stream::iter(std::iter::once(Err(error)))),
        }
    }

    async fn stat_file(&self, relative_path: &str) -> Result<FileStat> {
        let file = self.file(relative_path)?;
        let zero_stat = self.state.lock().zero_stat;
        let size = file.content.len() as u64;
        Ok(FileStat {
            size: Some(size).filter(|size| *size > 0 && !zero_stat),
            created_time: Some(file.created_time),
            modified_time: Some(file.created_time),
        })
    }

    async fn query_size(&self, relative_path: &str) -> Result<Option<u64>> {
        let file = self.file(relative_path)?;
        if self.state.lock().no_query_size {
            return Ok(None);
        }
        Ok(Some(file.content.len() as u64).filter(|size| *size > 0))
    }

    async fn open_read_stream(
        &self,
        relative_path: &str,
        start_offset: u64,
    ) -> Result<ByteStream> {
        let file = self.file(relative_path)?;
        let interrupt_at = self
            .state
            .lock()
            .interrupt_after
            .get(normalize_relative(relative_path).as_ref())
            .copied();
        let len = file.content.len();
        let start = usize::try_from(start_offset).unwrap_or(usize::MAX).min(len);
        let mut items: Vec<Result<Bytes>> = Vec::new();
        let mut position = start;
        while position < len {
            if interrupt_at.is_some_and(|limit| position >= limit) {
                break;
            }
            let end = (position + CHUNK_SIZE).min(len);
            let end = interrupt_at.map_or(end, |limit| end.min(limit.max(position + 1)));
            items.push(Ok(file.content.slice(position..end)));
            position = end;
        }
        if interrupt_at.is_some_and(|limit| limit < len) {
            items.push(Err(ShareIndexError::TransferInterrupted(format!(
                "memory share dropped {relative_path}"
            ))));
        }
        Ok(Box::pin(stream::iter(items)))
    }

    fn supports_offset_reads(&self) -> bool {
        self.state.lock().offset_reads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    fn sample() -> MemoryShare {
        let share = MemoryShare::new();
        let now = Utc::now();
        share.put_file("alpha/1/app-release.apk", vec![1u8; 10], now);
        share.put_file("alpha/2/app-debug.apk", vec![2u8; 5], now);
        share.put_file("alpha/2/readme.txt", vec![3u8; 5], now);
        share.put_directory("beta");
        share
    }

    #[tokio::test]
    async fn lists_and_counts_directories() {
        let share = sample();
        assert_eq!(
            share.list_top_level_directories().await.expect("list"),
            vec!["alpha".to_string(), "beta".to_string()]
        );
        assert_eq!(share.count_subdirectories("alpha").await.expect("count"), 2);
        assert_eq!(share.count_subdirectories("beta").await.expect("count"), 0);
    }

    #[tokio::test]
    async fn walk_filters_and_counts() {
        let share = sample();
        let records: Vec<RawFileRecord> =
            share.walk_files("alpha").try_collect().await.expect("walk");
        assert_eq!(records.len(), 2);
        assert_eq!(share.walk_count("alpha"), 1);
        assert_eq!(share.walk_count("beta"), 0);
    }

    #[tokio::test]
    async fn interrupted_stream_ends_with_error() {
        let share = sample();
        share.interrupt_after("alpha/1/app-release.apk", 4);
        let stream = share
            .open_read_stream("alpha/1/app-release.apk", 0)
            .await
            .expect("open");
        let items: Vec<Result<Bytes>> = futures_util::StreamExt::collect(stream).await;
        assert_eq!(items[0].as_ref().expect("chunk").len(), 4);
        assert!(matches!(
            items.last(),
            Some(Err(ShareIndexError::TransferInterrupted(_)))
        ));
    }

    #[tokio::test]
    async fn failing_directory_only_affects_itself() {
        let share = sample();
        share.fail_directory("alpha", true);
        assert!(share.count_subdirectories("alpha").await.is_err());
        assert!(share.count_subdirectories("beta").await.is_ok());
    }
}
