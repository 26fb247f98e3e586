//! JSON-file cache store.
//!
//! Layout under the cache directory:
//!
//! ```text
//! <share>/dirs/<top-level>.json   DirectoryIndex (files + last_updated)
//! <share>/meta.json               top-level -> ScanMeta
//! ```
//!
//! Names are percent-encoded so any directory name maps to one file. Every
//! file is written to a temp file and renamed into place. A commit writes the
//! directory record before the meta record and puts the previous directory
//! record back if the meta write fails. Only a crash in between leaves stale
//! metadata, which causes one extra re-scan. The in-process lock makes the
//! pair atomic for readers in this process.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use super::{apply_backfill, CacheStore};
use crate::error::{Result, ShareIndexError};
use crate::types::{DirectoryIndex, DirectoryRecord, EntryBackfill, ScanMeta};

const META_FILENAME: &str = "meta.json";
const DIRS_DIRNAME: &str = "dirs";

type MetaMap = BTreeMap<String, ScanMeta>;

#[derive(Debug)]
pub struct FileCacheStore {
    root: PathBuf,
    commit: RwLock<()>,
}

impl FileCacheStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            commit: RwLock::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn share_dir(&self, share: &str) -> PathBuf {
        self.root.join(encode_name(share))
    }

    fn meta_path(&self, share: &str) -> PathBuf {
        self.share_dir(share).join(META_FILENAME)
    }

    fn index_path(&self, share: &str, top_level: &str) -> PathBuf {
        self.share_dir(share)
            .join(DIRS_DIRNAME)
            .join(format!("{}.json", encode_name(top_level)))
    }

    async fn read_meta_map(&self, share: &str) -> Result<MetaMap> {
        Ok(read_json(&self.meta_path(share)).await?.unwrap_or_default())
    }
}

fn encode_name(name: &str) -> String {
    urlencoding::encode(name).into_owned()
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(ShareIndexError::from_cache_io(
                error,
                &format!("failed to read cache record {}", path.display()),
            ))
        }
    };
    serde_json::from_slice(&bytes).map(Some).map_err(|error| {
        ShareIndexError::CacheUnavailable(format!(
            "failed to parse cache record {}: {error}",
            path.display()
        ))
    })
}

/// Serializes `value` and renames it into place at `path`.
async fn write_json_atomic<T: Serialize>(path: PathBuf, value: &T) -> Result<()> {
    let serialized = serde_json::to_vec(value).map_err(|error| {
        ShareIndexError::CacheUnavailable(format!("cache serialize error: {error}"))
    })?;
    tokio::task::spawn_blocking(move || -> Result<()> {
        let parent = path.parent().ok_or_else(|| {
            ShareIndexError::CacheUnavailable(format!("invalid cache path {}", path.display()))
        })?;
        std::fs::create_dir_all(parent).map_err(|error| {
            ShareIndexError::from_cache_io(
                error,
                &format!("failed to create cache directory {}", parent.display()),
            )
        })?;
        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|error| {
            ShareIndexError::from_cache_io(error, "failed to create cache temp file")
        })?;
        temp.write_all(&serialized).map_err(|error| {
            ShareIndexError::from_cache_io(error, "failed to write cache temp file")
        })?;
        temp.persist(&path).map_err(|error| {
            ShareIndexError::from_cache_io(
                error.error,
                &format!("failed to persist cache record {}", path.display()),
            )
        })?;
        Ok(())
    })
    .await
    .map_err(|error| ShareIndexError::CacheUnavailable(format!("cache write task failed: {error}")))?
}

/// Puts back the directory record a failed commit replaced.
async fn restore_index(path: PathBuf, previous: Option<DirectoryIndex>) {
    let restored = match previous {
        Some(index) => write_json_atomic(path.clone(), &index).await,
        None => match tokio::fs::remove_file(&path).await {
            Err(error) if error.kind() != std::io::ErrorKind::NotFound => Err(
                ShareIndexError::from_cache_io(error, "failed to remove uncommitted record"),
            ),
            _ => Ok(()),
        },
    };
    if let Err(error) = restored {
        log::warn!("cache rollback failed path={} error={}", path.display(), error);
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get_scan_meta(&self, share: &str, top_level: &str) -> Result<Option<ScanMeta>> {
        Ok(self.read_meta_map(share).await?.get(top_level).copied())
    }

    async fn get_directory_index(
        &self,
        share: &str,
        top_level: &str,
    ) -> Result<Option<DirectoryIndex>> {
        read_json(&self.index_path(share, top_level)).await
    }

    async fn get_directory_record(
        &self,
        share: &str,
        top_level: &str,
    ) -> Result<Option<DirectoryRecord>> {
        let _guard = self.commit.read().await;
        let Some(index) = self.get_directory_index(share, top_level).await? else {
            return Ok(None);
        };
        let Some(meta) = self.get_scan_meta(share, top_level).await? else {
            return Ok(None);
        };
        Ok(Some(DirectoryRecord { index, meta }))
    }

    async fn put_directory_index(
        &self,
        share: &str,
        top_level: &str,
        index: DirectoryIndex,
        meta: ScanMeta,
    ) -> Result<()> {
        let _guard = self.commit.write().await;
        let mut metas = self.read_meta_map(share).await?;
        let index_path = self.index_path(share, top_level);
        let previous: Option<DirectoryIndex> = read_json(&index_path).await.ok().flatten();
        write_json_atomic(index_path.clone(), &index).await?;
        metas.insert(top_level.to_string(), meta);
        if let Err(error) = write_json_atomic(self.meta_path(share), &metas).await {
            restore_index(index_path, previous).await;
            return Err(error);
        }
        log::debug!(
            "cache commit share={} dir={} files={} subdirs={}",
            share,
            top_level,
            index.files.len(),
            meta.subdirectory_count
        );
        Ok(())
    }

    async fn list_directories(&self, share: &str) -> Result<Vec<String>> {
        let dir = self.share_dir(share).join(DIRS_DIRNAME);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(ShareIndexError::from_cache_io(
                    error,
                    &format!("failed to list cache directory {}", dir.display()),
                ))
            }
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|error| {
            ShareIndexError::from_cache_io(error, "failed to list cache directory")
        })? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(encoded) = file_name.strip_suffix(".json") else {
                continue;
            };
            if let Ok(decoded) = urlencoding::decode(encoded) {
                names.push(decoded.into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn backfill_entry(
        &self,
        share: &str,
        top_level: &str,
        relative_path: &str,
        backfill: EntryBackfill,
    ) -> Result<bool> {
        let _guard = self.commit.write().await;
        let path = self.index_path(share, top_level);
        let Some(mut index) = read_json::<DirectoryIndex>(&path).await? else {
            return Ok(false);
        };
        if !apply_backfill(&mut index, relative_path, &backfill) {
            return Ok(false);
        }
        write_json_atomic(path, &index).await?;
        Ok(true)
    }

    async fn ping(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|error| {
            ShareIndexError::from_cache_io(
                error,
                &format!("cache directory {} unavailable", self.root.display()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BuildType, FileEntry};
    use chrono::Utc;
    use tempfile::tempdir;

    fn index_of(paths: &[&str]) -> DirectoryIndex {
        let files = paths
            .iter()
            .map(|path| FileEntry {
                relative_path: path.to_string(),
                file_name: path.rsplit('/').next().unwrap_or(path).to_string(),
                file_size: 3,
                created_time: Utc::now(),
                server_prefix: "\\\\host\\share".into(),
                build_type: BuildType::Debug,
                digest: None,
                download_time_ms: None,
            })
            .collect();
        DirectoryIndex::new(files, Utc::now())
    }

    fn meta(count: usize) -> ScanMeta {
        ScanMeta {
            subdirectory_count: count,
            last_scan: Utc::now(),
            file_count: 0,
        }
    }

    #[tokio::test]
    async fn round_trips_records_on_disk() {
        let dir = tempdir().expect("tempdir");
        let store = FileCacheStore::new(dir.path().to_path_buf());
        store
            .put_directory_index("server_1", "proj A", index_of(&["proj A/x.apk"]), meta(7))
            .await
            .expect("put");

        let reopened = FileCacheStore::new(dir.path().to_path_buf());
        let record = reopened
            .get_directory_record("server_1", "proj A")
            .await
            .expect("get")
            .expect("record");
        assert_eq!(record.meta.subdirectory_count, 7);
        assert_eq!(record.index.files[0].relative_path, "proj A/x.apk");
        assert_eq!(
            reopened.list_directories("server_1").await.expect("list"),
            vec!["proj A".to_string()]
        );
    }

    #[tokio::test]
    async fn directory_named_meta_does_not_collide() {
        let dir = tempdir().expect("tempdir");
        let store = FileCacheStore::new(dir.path().to_path_buf());
        store
            .put_directory_index("s", "meta", index_of(&["meta/a.apk"]), meta(1))
            .await
            .expect("put");
        store
            .put_directory_index("s", "other", index_of(&["other/b.apk"]), meta(2))
            .await
            .expect("put");

        assert_eq!(
            store.get_scan_meta("s", "meta").await.expect("meta").map(|m| m.subdirectory_count),
            Some(1)
        );
        assert_eq!(store.list_directories("s").await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn missing_share_is_empty() {
        let dir = tempdir().expect("tempdir");
        let store = FileCacheStore::new(dir.path().join("nested"));
        assert!(store.list_directories("s").await.expect("list").is_empty());
        assert!(store.get_directory_record("s", "d").await.expect("get").is_none());
        store.ping().await.expect("ping creates root");
        assert!(dir.path().join("nested").is_dir());
    }

    #[tokio::test]
    async fn corrupt_record_reports_cache_unavailable() {
        let dir = tempdir().expect("tempdir");
        let store = FileCacheStore::new(dir.path().to_path_buf());
        let meta_path = store.meta_path("s");
        std::fs::create_dir_all(meta_path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&meta_path, b"{not json").expect("write");

        assert!(matches!(
            store.get_scan_meta("s", "d").await,
            Err(ShareIndexError::CacheUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn backfill_rewrites_index_only() {
        let dir = tempdir().expect("tempdir");
        let store = FileCacheStore::new(dir.path().to_path_buf());
        store
            .put_directory_index("s", "d", index_of(&["d/a.apk"]), meta(5))
            .await
            .expect("put");
        let found = store
            .backfill_entry(
                "s",
                "d",
                "d/a.apk",
                EntryBackfill {
                    digest: Some("ff".into()),
                    download_time_ms: None,
                    content_length: None,
                },
            )
            .await
            .expect("backfill");
        assert!(found);
        let record = store.get_directory_record("s", "d").await.expect("get").expect("record");
        assert_eq!(record.index.files[0].digest.as_deref(), Some("ff"));
        assert_eq!(record.meta.subdirectory_count, 5);
    }

    #[tokio::test]
    async fn failed_meta_commit_keeps_the_previous_index() {
        let dir = tempdir().expect("tempdir");
        let store = FileCacheStore::new(dir.path().to_path_buf());
        store
            .put_directory_index("s", "d", index_of(&["d/old.apk"]), meta(1))
            .await
            .expect("put");

        let meta_path = store.meta_path("s");
        std::fs::remove_file(&meta_path).expect("remove meta");
        std::fs::create_dir_all(meta_path.join("blocker")).expect("mkdir");

        assert!(store
            .put_directory_index("s", "d", index_of(&["d/new.apk"]), meta(2))
            .await
            .is_err());
        let index = store
            .get_directory_index("s", "d")
            .await
            .expect("get")
            .expect("index");
        assert_eq!(index.files[0].relative_path, "d/old.apk");
    }

    #[tokio::test]
    async fn restore_index_puts_back_or_removes_the_record() {
        let dir = tempdir().expect("tempdir");
        let store = FileCacheStore::new(dir.path().to_path_buf());
        let path = store.index_path("s", "d");
        write_json_atomic(path.clone(), &index_of(&["d/new.apk"]))
            .await
            .expect("write");

        restore_index(path.clone(), Some(index_of(&["d/old.apk"]))).await;
        let restored: DirectoryIndex = read_json(&path).await.expect("read").expect("index");
        assert_eq!(restored.files[0].relative_path, "d/old.apk");

        restore_index(path.clone(), None).await;
        assert!(!path.exists());
        restore_index(path.clone(), None).await;
    }
}
