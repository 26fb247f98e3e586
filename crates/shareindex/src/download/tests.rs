use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};

use crate::cache::{CacheStore, MemoryCacheStore, SharedCacheStore};
use crate::error::ShareIndexError;
use crate::share::{ByteStream, MemoryShare, SharedShareClient};
use crate::types::{BuildType, DirectoryIndex, FileEntry, ScanMeta};

use super::{ClientClass, DownloadRequest, DownloadStatus, Downloader};

const SHARE: &str = "server_1";
const PATH: &str = "builds/v1/app-release.apk";

struct Fixture {
    share: Arc<MemoryShare>,
    cache: Arc<MemoryCacheStore>,
    downloader: Downloader,
    content: Vec<u8>,
}

fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn fixture_with_probe_limit(probe_limit: u64) -> Fixture {
    let share = Arc::new(MemoryShare::new());
    let content = content(1000);
    share.put_file(PATH, content.clone(), Utc::now());
    share.put_file("builds/empty.apk", Vec::<u8>::new(), Utc::now());
    let cache = Arc::new(MemoryCacheStore::new());
    let client: SharedShareClient = share.clone();
    let store: SharedCacheStore = cache.clone();
    let downloader = Downloader::new(
        HashMap::from([(SHARE.to_string(), client)]),
        store,
        probe_limit,
    );
    Fixture {
        share,
        cache,
        downloader,
        content,
    }
}

fn fixture() -> Fixture {
    fixture_with_probe_limit(64 * 1024)
}

fn request(path: &str, range: Option<&str>) -> DownloadRequest {
    DownloadRequest {
        share: SHARE.to_string(),
        relative_path: path.to_string(),
        range: range.map(str::to_string),
        client: ClientClass::Standard,
    }
}

async fn read_body(mut body: ByteStream) -> Result<Vec<u8>, ShareIndexError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    Ok(bytes)
}

async fn seed_cache_entry(cache: &MemoryCacheStore) {
    seed_cache_entry_of_size(cache, 1000).await;
}

async fn seed_cache_entry_of_size(cache: &MemoryCacheStore, file_size: u64) {
    let entry = FileEntry {
        relative_path: PATH.to_string(),
        file_name: "app-release.apk".to_string(),
        file_size,
        created_time: Utc::now(),
        server_prefix: "\\\\host\\builds".to_string(),
        build_type: BuildType::Release,
        digest: None,
        download_time_ms: None,
    };
    cache
        .put_directory_index(
            SHARE,
            "builds",
            DirectoryIndex::new(vec![entry], Utc::now()),
            ScanMeta {
                subdirectory_count: 1,
                last_scan: Utc::now(),
                file_count: 1,
            },
        )
        .await
        .expect("seed");
}

async fn cached_digest(cache: &MemoryCacheStore) -> Option<String> {
    cache
        .get_directory_index(SHARE, "builds")
        .await
        .expect("get")
        .and_then(|index| index.files.into_iter().next())
        .and_then(|entry| entry.digest)
}

#[tokio::test]
async fn range_request_returns_exactly_the_requested_slice() {
    let fixture = fixture();
    let response = fixture
        .downloader
        .download(request(PATH, Some("bytes=100-199")))
        .await
        .expect("download");

    assert_eq!(response.status, DownloadStatus::Partial);
    assert_eq!(response.content_length, Some(100));
    assert_eq!(response.total_size, Some(1000));
    assert_eq!(response.content_range.as_deref(), Some("bytes 100-199/1000"));
    let body = read_body(response.body).await.expect("body");
    assert_eq!(body, fixture.content[100..200]);
}

#[tokio::test]
async fn range_past_the_end_is_unsatisfiable() {
    let fixture = fixture();
    let error = fixture
        .downloader
        .download(request(PATH, Some("bytes=2000-")))
        .await
        .expect_err("unsatisfiable");
    assert!(matches!(
        error,
        ShareIndexError::RangeNotSatisfiable { size: Some(1000), .. }
    ));
}

#[tokio::test]
async fn open_ended_range_clamps_to_the_last_byte() {
    let fixture = fixture();
    let response = fixture
        .downloader
        .download(request(PATH, Some("bytes=990-5000")))
        .await
        .expect("download");
    assert_eq!(response.content_range.as_deref(), Some("bytes 990-999/1000"));
    assert_eq!(read_body(response.body).await.expect("body"), fixture.content[990..]);
}

#[tokio::test]
async fn suffix_range_returns_the_tail() {
    let fixture = fixture();
    let response = fixture
        .downloader
        .download(request(PATH, Some("bytes=-24")))
        .await
        .expect("download");
    assert_eq!(response.content_range.as_deref(), Some("bytes 976-999/1000"));
    assert_eq!(read_body(response.body).await.expect("body"), fixture.content[976..]);
}

#[tokio::test]
async fn no_range_streams_the_whole_file() {
    let fixture = fixture();
    let response = fixture
        .downloader
        .download(request(PATH, None))
        .await
        .expect("download");
    assert_eq!(response.status, DownloadStatus::Full);
    assert_eq!(response.content_length, Some(1000));
    assert!(response.content_range.is_none());
    assert_eq!(read_body(response.body).await.expect("body"), fixture.content);
}

#[tokio::test]
async fn malformed_range_is_ignored() {
    let fixture = fixture();
    for header in ["bytes=0-10,20-30", "pages=1-2", "bytes=x-"] {
        let response = fixture
            .downloader
            .download(request(PATH, Some(header)))
            .await
            .expect("download");
        assert_eq!(response.status, DownloadStatus::Full, "{header}");
        assert_eq!(response.content_length, Some(1000));
    }
}

#[tokio::test]
async fn zero_size_metadata_falls_back_to_another_strategy() {
    let fixture = fixture();
    fixture.share.set_zero_stat(true);
    let response = fixture
        .downloader
        .download(request(PATH, None))
        .await
        .expect("download");
    assert_eq!(response.content_length, Some(1000));
    assert_eq!(response.total_size, Some(1000));
}

#[tokio::test]
async fn unknown_size_ranges_use_offset_reads() {
    let fixture = fixture_with_probe_limit(10);
    fixture.share.set_zero_stat(true);
    fixture.share.set_query_size_unavailable(true);

    let bounded = fixture
        .downloader
        .download(request(PATH, Some("bytes=10-19")))
        .await
        .expect("download");
    assert_eq!(bounded.status, DownloadStatus::Partial);
    assert_eq!(bounded.content_range.as_deref(), Some("bytes 10-19/*"));
    assert!(bounded.content_length.is_none());
    assert_eq!(read_body(bounded.body).await.expect("body"), fixture.content[10..20]);

    for open_ended in ["bytes=10-", "bytes=-10"] {
        let error = fixture
            .downloader
            .download(request(PATH, Some(open_ended)))
            .await
            .expect_err("no end to report");
        assert!(matches!(error, ShareIndexError::RangeNotSupported(_)), "{open_ended}");
    }

    let full = fixture
        .downloader
        .download(request(PATH, None))
        .await
        .expect("download");
    assert_eq!(full.status, DownloadStatus::Full);
    assert!(full.content_length.is_none());
    assert_eq!(read_body(full.body).await.expect("body"), fixture.content);
}

#[tokio::test]
async fn unknown_size_without_offset_reads_rejects_ranges() {
    let fixture = fixture_with_probe_limit(10);
    fixture.share.set_zero_stat(true);
    fixture.share.set_query_size_unavailable(true);
    fixture.share.set_offset_reads(false);

    let error = fixture
        .downloader
        .download(request(PATH, Some("bytes=10-19")))
        .await
        .expect_err("not supported");
    assert!(matches!(error, ShareIndexError::RangeNotSupported(_)));
}

#[tokio::test]
async fn missing_file_is_not_found() {
    let fixture = fixture();
    let error = fixture
        .downloader
        .download(request("builds/v1/missing.apk", None))
        .await
        .expect_err("missing");
    assert!(matches!(error, ShareIndexError::NotFound(_)));
}

#[tokio::test]
async fn share_failure_mid_stream_interrupts_the_transfer() {
    let fixture = fixture();
    seed_cache_entry(&fixture.cache).await;
    fixture.share.interrupt_after(PATH, 300);

    let response = fixture
        .downloader
        .download(request(PATH, None))
        .await
        .expect("headers are sent before the failure");
    let error = read_body(response.body).await.expect_err("interrupted");
    assert!(matches!(error, ShareIndexError::TransferInterrupted(_)));

    tokio::task::yield_now().await;
    assert_eq!(cached_digest(&fixture.cache).await, None);
}

#[tokio::test]
async fn zero_byte_file_is_a_valid_transfer() {
    let fixture = fixture();
    let response = fixture
        .downloader
        .download(request("builds/empty.apk", None))
        .await
        .expect("download");
    assert_eq!(response.status, DownloadStatus::Full);
    assert_eq!(response.content_length, Some(0));
    assert!(read_body(response.body).await.expect("body").is_empty());
}

#[tokio::test]
async fn complete_download_backfills_the_digest() {
    let fixture = fixture();
    seed_cache_entry(&fixture.cache).await;

    let partial = fixture
        .downloader
        .download(request(PATH, Some("bytes=0-9")))
        .await
        .expect("download");
    read_body(partial.body).await.expect("body");
    tokio::task::yield_now().await;
    assert_eq!(cached_digest(&fixture.cache).await, None);

    let response = fixture
        .downloader
        .download(request(PATH, None))
        .await
        .expect("download");
    read_body(response.body).await.expect("body");

    let expected = format!("{:x}", Sha256::digest(&fixture.content));
    let digest = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(digest) = cached_digest(&fixture.cache).await {
                return digest;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("digest written");
    assert_eq!(digest, expected);
}

#[tokio::test]
async fn replaced_file_does_not_backfill_the_older_entry() {
    let fixture = fixture();
    seed_cache_entry_of_size(&fixture.cache, 10).await;

    let response = fixture
        .downloader
        .download(request(PATH, None))
        .await
        .expect("download");
    assert_eq!(read_body(response.body).await.expect("body").len(), 1000);

    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cached_digest(&fixture.cache).await, None);
    }
}

#[tokio::test]
async fn rejects_unknown_shares_and_traversal() {
    let fixture = fixture();
    let mut unknown = request(PATH, None);
    unknown.share = "server_9".to_string();
    assert!(matches!(
        fixture.downloader.download(unknown).await,
        Err(ShareIndexError::UnknownShare(_))
    ));
    assert!(matches!(
        fixture.downloader.download(request("builds/../../etc/passwd", None)).await,
        Err(ShareIndexError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn backslash_paths_resolve_like_slash_paths() {
    let fixture = fixture();
    let response = fixture
        .downloader
        .download(request("\\builds\\v1\\app-release.apk", None))
        .await
        .expect("download");
    assert_eq!(response.file_name, "app-release.apk");
    assert_eq!(response.content_length, Some(1000));
}

#[tokio::test]
async fn headers_follow_the_client_class() {
    let fixture = fixture();
    let mut mobile = request(PATH, Some("bytes=0-99"));
    mobile.client = ClientClass::MobileBrowser;
    let response = fixture.downloader.download(mobile).await.expect("download");
    let headers: HashMap<&str, String> = response.headers().into_iter().collect();

    assert_eq!(headers["content-type"], "application/vnd.android.package-archive");
    assert_eq!(headers["accept-ranges"], "bytes");
    assert_eq!(headers["content-length"], "100");
    assert_eq!(headers["content-range"], "bytes 0-99/1000");
    assert_eq!(headers["content-encoding"], "identity");
    assert_eq!(headers["cache-control"], "no-transform");
    assert!(headers["content-disposition"].contains("filename*=UTF-8''app-release.apk"));
}

#[tokio::test]
async fn file_info_reports_existence() {
    let fixture = fixture();
    let info = fixture
        .downloader
        .file_info(SHARE, PATH)
        .await
        .expect("info");
    assert!(info.exists);
    assert_eq!(info.size, Some(1000));
    assert!(info.modified_time.is_some());

    let missing = fixture
        .downloader
        .file_info(SHARE, "builds/nope.apk")
        .await
        .expect("info");
    assert!(!missing.exists);
    assert_eq!(missing.size, None);
}
