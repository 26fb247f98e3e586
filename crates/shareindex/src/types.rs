//! Data model shared by the scan, cache, search, and download layers.
//!
//! The HTTP layer converts these to API payload types for serialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Build flavor inferred from a package's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    Release,
    Debug,
    #[default]
    Unknown,
}

impl BuildType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Debug => "debug",
            Self::Unknown => "unknown",
        }
    }
}

/// Build-type restriction applied to search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildTypeFilter {
    #[default]
    Release,
    Debug,
    /// No restriction.
    Combine,
}

impl BuildTypeFilter {
    pub fn matches(self, build_type: BuildType) -> bool {
        match self {
            Self::Release => build_type == BuildType::Release,
            Self::Debug => build_type == BuildType::Debug,
            Self::Combine => true,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "release" => Some(Self::Release),
            "debug" => Some(Self::Debug),
            "combine" => Some(Self::Combine),
            _ => None,
        }
    }
}

/// One indexed package file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Share-root-relative path, `/`-separated.
    pub relative_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub created_time: DateTime<Utc>,
    /// Root path of the owning share, for client-side path reconstruction.
    pub server_prefix: String,
    pub build_type: BuildType,
    /// Hex SHA-256 of the content, filled in after the first full download.
    #[serde(default)]
    pub digest: Option<String>,
    /// Duration of the last full download in milliseconds.
    #[serde(default)]
    pub download_time_ms: Option<u64>,
}

/// Cached file entries for one top-level directory of one share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryIndex {
    pub files: Vec<FileEntry>,
    pub last_updated: DateTime<Utc>,
}

impl DirectoryIndex {
    pub fn new(files: Vec<FileEntry>, last_updated: DateTime<Utc>) -> Self {
        Self {
            files,
            last_updated,
        }
    }
}

/// Change-detection bookkeeping for one top-level directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanMeta {
    /// Immediate subdirectory count observed by the last completed scan.
    pub subdirectory_count: usize,
    pub last_scan: DateTime<Utc>,
    #[serde(default)]
    pub file_count: usize,
}

/// A directory index together with the metadata committed alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub index: DirectoryIndex,
    pub meta: ScanMeta,
}

/// A file as reported by a share walk, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFileRecord {
    pub relative_path: String,
    pub size: u64,
    pub created_time: DateTime<Utc>,
}

/// Metadata for a single file.
///
/// `size` is `None` when the share reported zero or nothing; that means
/// "unknown", not "empty".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub size: Option<u64>,
    pub created_time: Option<DateTime<Utc>>,
    pub modified_time: Option<DateTime<Utc>>,
}

/// Public description of a configured share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareDescriptor {
    pub name: String,
    pub display_name: String,
    pub path: String,
}

/// Values written back into an existing entry after a download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryBackfill {
    pub digest: Option<String>,
    pub download_time_ms: Option<u64>,
    /// Bytes the digest was computed over. When set, only an entry of
    /// exactly this size is updated.
    pub content_length: Option<u64>,
}

/// A paginated search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// `|`-separated substrings; all must appear in the file name.
    pub keyword: String,
    /// Restrict to one share; `None` searches every share.
    pub share: Option<String>,
    pub build_type: BuildTypeFilter,
    pub limit: usize,
    pub offset: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            share: None,
            build_type: BuildTypeFilter::default(),
            limit: 10,
            offset: 0,
        }
    }
}

/// A page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPage {
    pub total: usize,
    pub items: Vec<FileEntry>,
    pub limit: usize,
    pub offset: usize,
}

/// Per-share line of the status summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareStatus {
    pub files_count: usize,
    pub last_scan: Option<DateTime<Utc>>,
    pub phase: String,
    pub last_error: Option<String>,
}

/// Aggregate status exposed to status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub last_scan_time: Option<DateTime<Utc>>,
    pub scanning_in_progress: bool,
    pub total_files: usize,
    pub shares: std::collections::BTreeMap<String, ShareStatus>,
    pub cache_connected: bool,
}

/// Result of a single-file metadata lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub path: String,
    pub size: Option<u64>,
    pub modified_time: Option<DateTime<Utc>>,
    pub exists: bool,
}

/// Returns the top-level directory a share-relative path belongs to.
pub fn top_level_of(relative_path: &str) -> Option<&str> {
    relative_path
        .trim_start_matches(['/', '\\'])
        .split(['/', '\\'])
        .next()
        .filter(|segment| !segment.is_empty())
}

/// Strips leading separators and converts `\` to `/`.
///
/// Accepts the backslash form that Windows clients send for share paths.
pub fn normalize_relative(relative_path: &str) -> std::borrow::Cow<'_, str> {
    if relative_path.contains('\\') {
        let converted = relative_path.replace('\\', "/");
        std::borrow::Cow::Owned(converted.trim_start_matches('/').to_string())
    } else {
        std::borrow::Cow::Borrowed(relative_path.trim_start_matches('/'))
    }
}
