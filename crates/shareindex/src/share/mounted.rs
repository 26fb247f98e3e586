//! Share client for a share reachable through a local mount point.
//!
//! Every remote call is bounded by the configured timeout; an expired timer
//! is reported as [`ShareIndexError::ShareUnreachable`].

use std::future::Future;
use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use tokio::fs;
use tokio::io::AsyncSeekExt;
use tokio_util::io::ReaderStream;

use super::{ByteStream, RecordStream, ShareClient};
use crate::classify::is_package_file;
use crate::config::ShareConfig;
use crate::error::{Result, ShareIndexError};
use crate::types::{normalize_relative, FileStat, RawFileRecord};

const READ_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct MountedShare {
    name: String,
    mount_path: PathBuf,
    extensions: Vec<String>,
    timeout: Duration,
}

impl MountedShare {
    pub fn new(config: &ShareConfig, extensions: Vec<String>, timeout: Duration) -> Self {
        log::debug!(
            "mounted share name={} root={} mount={} user={}",
            config.name,
            config.root,
            config.mount_path.display(),
            config.username
        );
        Self {
            name: config.name.clone(),
            mount_path: config.mount_path.clone(),
            extensions,
            timeout,
        }
    }

    /// Maps a share-relative path onto the mount, refusing `..` segments.
    fn resolve(&self, relative_path: &str) -> Result<PathBuf> {
        let mut path = self.mount_path.clone();
        for segment in normalize_relative(relative_path).split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(ShareIndexError::InvalidInput(format!(
                        "path escapes share root: {relative_path}"
                    )))
                }
                other => path.push(other),
            }
        }
        Ok(path)
    }

    async fn timed<T, F>(&self, context: &str, operation: F) -> Result<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result.map_err(|error| ShareIndexError::from_share_io(error, context)),
            Err(_) => Err(ShareIndexError::ShareUnreachable(format!(
                "{}: {context}: timed out after {}s",
                self.name,
                self.timeout.as_secs()
            ))),
        }
    }

    async fn child_directories(&self, relative_dir: &str) -> Result<Vec<String>> {
        let dir = self.resolve(relative_dir)?;
        let mut entries = self.timed(relative_dir, fs::read_dir(&dir)).await?;
        let mut names = Vec::new();
        while let Some(entry) = self.timed(relative_dir, entries.next_entry()).await? {
            let file_type = self.timed(relative_dir, entry.file_type()).await?;
            if file_type.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

struct WalkState {
    pending: Vec<String>,
    current: Option<(String, fs::ReadDir)>,
}

#[async_trait]
impl ShareClient for MountedShare {
    async fn list_top_level_directories(&self) -> Result<Vec<String>> {
        self.child_directories("").await
    }

    async fn count_subdirectories(&self, top_level: &str) -> Result<usize> {
        Ok(self.child_directories(top_level).await?.len())
    }

    fn walk_files<'a>(&'a self, top_level: &'a str) -> RecordStream<'a> {
        let state = WalkState {
            pending: vec![normalize_relative(top_level).into_owned()],
            current: None,
        };
        Box::pin(stream::try_unfold(state, move |mut state| async move {
            loop {
                if state.current.is_none() {
                    let Some(next_dir) = state.pending.pop() else {
                        return Ok(None);
                    };
                    let path = self.resolve(&next_dir)?;
                    let entries = self.timed(&next_dir, fs::read_dir(&path)).await?;
                    state.current = Some((next_dir, entries));
                }
                let Some((dir, entries)) = state.current.as_mut() else {
                    continue;
                };
                let Some(entry) = self.timed(dir, entries.next_entry()).await? else {
                    state.current = None;
                    continue;
                };
                let name = entry.file_name().to_string_lossy().into_owned();
                let relative_path = format!("{dir}/{name}");
                let file_type = self.timed(&relative_path, entry.file_type()).await?;
                if file_type.is_dir() {
                    state.pending.push(relative_path);
                } else if file_type.is_file() && is_package_file(&name, &self.extensions) {
                    let metadata = self.timed(&relative_path, entry.metadata()).await?;
                    let record = RawFileRecord {
                        relative_path,
                        size: metadata.len(),
                        created_time: created_or_modified(&metadata).unwrap_or_default(),
                    };
                    return Ok(Some((record, state)));
                }
            }
        }))
    }

    async fn stat_file(&self, relative_path: &str) -> Result<FileStat> {
        let path = self.resolve(relative_path)?;
        let metadata = self.timed(relative_path, fs::metadata(&path)).await?;
        if !metadata.is_file() {
            return Err(ShareIndexError::NotFound(relative_path.to_string()));
        }
        Ok(FileStat {
            size: Some(metadata.len()).filter(|size| *size > 0),
            created_time: created_or_modified(&metadata),
            modified_time: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    async fn query_size(&self, relative_path: &str) -> Result<Option<u64>> {
        let path = self.resolve(relative_path)?;
        let mut file = self.timed(relative_path, fs::File::open(&path)).await?;
        let end = self
            .timed(relative_path, file.seek(SeekFrom::End(0)))
            .await?;
        Ok(Some(end).filter(|size| *size > 0))
    }

    async fn open_read_stream(
        &self,
        relative_path: &str,
        start_offset: u64,
    ) -> Result<ByteStream> {
        let path = self.resolve(relative_path)?;
        let mut file = self.timed(relative_path, fs::File::open(&path)).await?;
        if start_offset > 0 {
            self.timed(relative_path, file.seek(SeekFrom::Start(start_offset)))
                .await?;
        }
        let context = format!("{}:{relative_path}", self.name);
        let stream = ReaderStream::with_capacity(file, READ_CHUNK_SIZE).map(move |chunk| {
            chunk.map_err(|error| {
                ShareIndexError::TransferInterrupted(format!("{context}: {error}"))
            })
        });
        Ok(Box::pin(stream))
    }
}

fn created_or_modified(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .ok()
        .filter(|time| *time > SystemTime::UNIX_EPOCH)
        .map(DateTime::<Utc>::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use tempfile::tempdir;

    fn share_at(path: &std::path::Path) -> MountedShare {
        let config = ShareConfig {
            name: "server_1".into(),
            display_name: "Server 1".into(),
            root: "\\\\host\\builds".into(),
            mount_path: path.to_path_buf(),
            username: String::new(),
            password: String::new(),
        };
        MountedShare::new(&config, vec!["apk".into()], Duration::from_secs(5))
    }

    fn write(root: &std::path::Path, relative: &str, bytes: &[u8]) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, bytes).expect("write");
    }

    async fn read_all(stream: ByteStream) -> Vec<u8> {
        let chunks: Vec<bytes::Bytes> = stream.try_collect().await.expect("stream");
        chunks.concat()
    }

    #[tokio::test]
    async fn lists_top_level_directories_only() {
        let dir = tempdir().expect("tempdir");
        write(dir.path(), "alpha/1/a.apk", b"a");
        write(dir.path(), "beta/readme.txt", b"b");
        write(dir.path(), "loose.apk", b"c");
        let share = share_at(dir.path());

        let names = share.list_top_level_directories().await.expect("list");
        assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[tokio::test]
    async fn counts_immediate_subdirectories() {
        let dir = tempdir().expect("tempdir");
        write(dir.path(), "alpha/1/deep/x.apk", b"a");
        write(dir.path(), "alpha/2/y.apk", b"a");
        write(dir.path(), "alpha/z.apk", b"a");
        let share = share_at(dir.path());

        assert_eq!(share.count_subdirectories("alpha").await.expect("count"), 2);
    }

    #[tokio::test]
    async fn walk_yields_only_package_files_recursively() {
        let dir = tempdir().expect("tempdir");
        write(dir.path(), "alpha/1/app-release.apk", b"12345");
        write(dir.path(), "alpha/1/deep/app-debug.APK", b"1");
        write(dir.path(), "alpha/notes.txt", b"no");
        let share = share_at(dir.path());

        let mut records: Vec<RawFileRecord> =
            share.walk_files("alpha").try_collect().await.expect("walk");
        records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        let paths: Vec<&str> = records.iter().map(|r| r.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["alpha/1/app-release.apk", "alpha/1/deep/app-debug.APK"]);
        assert_eq!(records[0].size, 5);
    }

    #[tokio::test]
    async fn walk_of_missing_directory_fails_with_not_found() {
        let dir = tempdir().expect("tempdir");
        let share = share_at(dir.path());
        let result: Result<Vec<RawFileRecord>> = share.walk_files("missing").try_collect().await;
        assert!(matches!(result, Err(ShareIndexError::NotFound(_))));
    }

    #[tokio::test]
    async fn stat_reports_zero_size_as_unknown() {
        let dir = tempdir().expect("tempdir");
        write(dir.path(), "alpha/empty.apk", b"");
        write(dir.path(), "alpha/full.apk", b"abc");
        let share = share_at(dir.path());

        assert_eq!(share.stat_file("alpha/empty.apk").await.expect("stat").size, None);
        assert_eq!(share.stat_file("alpha/full.apk").await.expect("stat").size, Some(3));
        assert!(matches!(
            share.stat_file("alpha/none.apk").await,
            Err(ShareIndexError::NotFound(_))
        ));
        assert!(matches!(
            share.stat_file("alpha").await,
            Err(ShareIndexError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn query_size_seeks_to_end() {
        let dir = tempdir().expect("tempdir");
        write(dir.path(), "alpha/full.apk", &[7u8; 1000]);
        let share = share_at(dir.path());
        assert_eq!(share.query_size("\\alpha\\full.apk").await.expect("size"), Some(1000));
    }

    #[tokio::test]
    async fn read_stream_honors_offset_and_eof() {
        let dir = tempdir().expect("tempdir");
        let content: Vec<u8> = (0..=255u8).collect();
        write(dir.path(), "alpha/file.apk", &content);
        let share = share_at(dir.path());

        let tail = read_all(share.open_read_stream("alpha/file.apk", 250).await.expect("open")).await;
        assert_eq!(tail, content[250..].to_vec());

        let past_end =
            read_all(share.open_read_stream("alpha/file.apk", 10_000).await.expect("open")).await;
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn parent_segments_are_rejected() {
        let dir = tempdir().expect("tempdir");
        let share = share_at(dir.path());
        assert!(matches!(
            share.stat_file("../etc/passwd").await,
            Err(ShareIndexError::InvalidInput(_))
        ));
    }
}
