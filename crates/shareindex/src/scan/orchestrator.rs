//! ScanOrchestrator - keeps the cache in sync with every configured share.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::join_all;
use futures_util::TryStreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::retry::with_retry;
use super::state::{
    PassOutcome, PassReport, RunTracker, ScanMode, ScanRunState, SharePhase, Trigger,
};
use crate::cache::SharedCacheStore;
use crate::classify::classify;
use crate::config::{RetryPolicy, ShareConfig};
use crate::error::{Result, ShareIndexError};
use crate::share::SharedShareClient;
use crate::types::{DirectoryIndex, FileEntry, RawFileRecord, ScanMeta};

const MIN_SCHEDULER_INTERVAL: Duration = Duration::from_secs(1);
const MAX_SCHEDULER_INTERVAL: Duration = Duration::from_secs(365 * 86_400);

/// One configured share with its client and pass lock.
pub(super) struct ShareSlot {
    pub(super) config: ShareConfig,
    pub(super) client: SharedShareClient,
    pub(super) pass_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for ShareSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareSlot")
            .field("name", &self.config.name)
            .field("client", &"<share client>")
            .finish()
    }
}

enum DirectoryOutcome {
    Skipped,
    Scanned { files: usize },
}

/// Marks a pass as in flight for as long as it lives.
struct ActivePass<'a> {
    tracker: &'a Mutex<RunTracker>,
}

impl<'a> ActivePass<'a> {
    fn begin(tracker: &'a Mutex<RunTracker>) -> Self {
        tracker.lock().active_passes += 1;
        Self { tracker }
    }
}

impl Drop for ActivePass<'_> {
    fn drop(&mut self) {
        let mut tracker = self.tracker.lock();
        tracker.active_passes = tracker.active_passes.saturating_sub(1);
    }
}

pub struct ScanOrchestrator {
    shares: Vec<Arc<ShareSlot>>,
    cache: SharedCacheStore,
    retry: RetryPolicy,
    tracker: Mutex<RunTracker>,
}

impl std::fmt::Debug for ScanOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanOrchestrator")
            .field("shares", &self.shares)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ScanOrchestrator {
    pub fn new(
        shares: Vec<(ShareConfig, SharedShareClient)>,
        cache: SharedCacheStore,
        retry: RetryPolicy,
    ) -> Self {
        let shares: Vec<Arc<ShareSlot>> = shares
            .into_iter()
            .map(|(config, client)| {
                Arc::new(ShareSlot {
                    config,
                    client,
                    pass_lock: tokio::sync::Mutex::new(()),
                })
            })
            .collect();
        let tracker = RunTracker::new(shares.iter().map(|slot| slot.config.name.as_str()));
        Self {
            shares,
            cache,
            retry,
            tracker: Mutex::new(tracker),
        }
    }

    pub fn share_names(&self) -> Vec<String> {
        self.shares
            .iter()
            .map(|slot| slot.config.name.clone())
            .collect()
    }

    pub fn run_state(&self) -> ScanRunState {
        self.tracker.lock().snapshot()
    }

    pub(super) fn slot(&self, name: &str) -> Result<&Arc<ShareSlot>> {
        self.shares
            .iter()
            .find(|slot| slot.config.name == name)
            .ok_or_else(|| ShareIndexError::UnknownShare(name.to_string()))
    }

    /// Runs one pass over a single share.
    pub async fn scan_share(
        &self,
        name: &str,
        mode: ScanMode,
        trigger: Trigger,
    ) -> Result<PassOutcome> {
        let slot = self.slot(name)?;
        Ok(self.run_locked(slot, mode, trigger).await)
    }

    /// Runs one pass over every share concurrently and stamps
    /// `last_scan_time` once all of them have finished.
    pub async fn scan_all(&self, mode: ScanMode, trigger: Trigger) -> BTreeMap<String, PassOutcome> {
        let _active = ActivePass::begin(&self.tracker);
        let started = Instant::now();
        log::info!(
            "scan pass start shares={} mode={:?} trigger={:?}",
            self.shares.len(),
            mode,
            trigger
        );
        let outcomes = join_all(self.shares.iter().map(|slot| async move {
            let outcome = self.run_locked(slot, mode, trigger).await;
            (slot.config.name.clone(), outcome)
        }))
        .await;
        self.tracker.lock().last_scan_time = Some(Utc::now());

        let outcomes: BTreeMap<String, PassOutcome> = outcomes.into_iter().collect();
        let failed = outcomes
            .values()
            .filter(|outcome| matches!(outcome, PassOutcome::ShareFailed(_)))
            .count();
        log::info!(
            "scan pass done shares={} failed_shares={} elapsed_ms={}",
            outcomes.len(),
            failed,
            started.elapsed().as_millis()
        );
        outcomes
    }

    /// Runs an immediate pass, then one pass per `interval` until `cancel`
    /// fires. Dropping a pass midway is safe: commits are per directory.
    pub fn spawn_scheduler(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let interval = interval.clamp(MIN_SCHEDULER_INTERVAL, MAX_SCHEDULER_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            log::info!("scan scheduler started interval_secs={}", interval.as_secs());
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = orchestrator.scan_all(ScanMode::Incremental, Trigger::Scheduled) => {}
                }
            }
            log::info!("scan scheduler stopped");
        })
    }

    async fn run_locked(&self, slot: &ShareSlot, mode: ScanMode, trigger: Trigger) -> PassOutcome {
        let _guard = match trigger {
            Trigger::Scheduled => match slot.pass_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    log::debug!(
                        "scan pass coalesced share={} reason=pass_in_flight",
                        slot.config.name
                    );
                    return PassOutcome::Coalesced;
                }
            },
            Trigger::Manual => slot.pass_lock.lock().await,
        };
        let _active = ActivePass::begin(&self.tracker);
        let outcome = self.run_pass(slot, mode).await;

        let mut tracker = self.tracker.lock();
        let state = tracker.share_mut(&slot.config.name);
        state.phase = SharePhase::Idle;
        state.last_pass = Some(Utc::now());
        match &outcome {
            PassOutcome::Completed(report) => {
                state.last_report = Some(*report);
                if report.failed == 0 {
                    state.last_error = None;
                }
            }
            PassOutcome::ShareFailed(message) => state.last_error = Some(message.clone()),
            PassOutcome::Coalesced => {}
        }
        outcome
    }

    fn set_phase(&self, share: &str, phase: SharePhase) {
        self.tracker.lock().share_mut(share).phase = phase;
    }

    async fn run_pass(&self, slot: &ShareSlot, mode: ScanMode) -> PassOutcome {
        let share = slot.config.name.as_str();
        let started = Instant::now();
        self.set_phase(share, SharePhase::Enumerating);

        let client = slot.client.as_ref();
        let directories = match with_retry(&self.retry, "list_top_level_directories", move || {
            client.list_top_level_directories()
        })
        .await
        {
            Ok(directories) => directories,
            Err(error) => {
                log::warn!("share pass aborted share={} error={}", share, error);
                return PassOutcome::ShareFailed(error.to_string());
            }
        };

        let mut report = PassReport::default();
        for directory in &directories {
            self.set_phase(share, SharePhase::Scanning(directory.clone()));
            match self.sync_directory(slot, directory, mode).await {
                Ok(DirectoryOutcome::Skipped) => report.skipped += 1,
                Ok(DirectoryOutcome::Scanned { files }) => {
                    report.scanned += 1;
                    report.files_indexed += files;
                }
                Err(error) => {
                    report.failed += 1;
                    log::warn!(
                        "directory scan failed share={} dir={} error={} (keeping cached index)",
                        share,
                        directory,
                        error
                    );
                    self.tracker.lock().share_mut(share).last_error =
                        Some(format!("{directory}: {error}"));
                }
            }
        }

        log::info!(
            "share pass done share={} dirs={} scanned={} skipped={} failed={} files_indexed={} elapsed_ms={}",
            share,
            directories.len(),
            report.scanned,
            report.skipped,
            report.failed,
            report.files_indexed,
            started.elapsed().as_millis()
        );
        PassOutcome::Completed(report)
    }

    async fn sync_directory(
        &self,
        slot: &ShareSlot,
        directory: &str,
        mode: ScanMode,
    ) -> Result<DirectoryOutcome> {
        let share = slot.config.name.as_str();
        let client = slot.client.as_ref();
        let subdirectory_count = with_retry(&self.retry, "count_subdirectories", move || {
            client.count_subdirectories(directory)
        })
        .await?;

        if mode == ScanMode::Incremental {
            if let Some(meta) = self.cache.get_scan_meta(share, directory).await? {
                if meta.subdirectory_count == subdirectory_count {
                    log::debug!(
                        "directory unchanged share={} dir={} subdirs={}",
                        share,
                        directory,
                        subdirectory_count
                    );
                    return Ok(DirectoryOutcome::Skipped);
                }
            }
        }

        let records: Vec<RawFileRecord> = with_retry(&self.retry, "walk_files", move || {
            client.walk_files(directory).try_collect()
        })
        .await?;

        let previous = self.cache.get_directory_index(share, directory).await?;
        let known: HashMap<&str, &FileEntry> = previous
            .as_ref()
            .map(|index| {
                index
                    .files
                    .iter()
                    .map(|entry| (entry.relative_path.as_str(), entry))
                    .collect()
            })
            .unwrap_or_default();
        let files: Vec<FileEntry> = records
            .into_iter()
            .map(|record| {
                let prior = known.get(record.relative_path.as_str()).copied();
                build_entry(record, &slot.config.root, prior)
            })
            .collect();

        let now = Utc::now();
        let file_count = files.len();
        self.cache
            .put_directory_index(
                share,
                directory,
                DirectoryIndex::new(files, now),
                ScanMeta {
                    subdirectory_count,
                    last_scan: now,
                    file_count,
                },
            )
            .await?;
        log::debug!(
            "directory committed share={} dir={} subdirs={} files={}",
            share,
            directory,
            subdirectory_count,
            file_count
        );
        Ok(DirectoryOutcome::Scanned { files: file_count })
    }
}

/// Builds the cache entry for a walked file. Back-filled values survive when
/// the same file (path, size, creation time) was already indexed.
fn build_entry(record: RawFileRecord, server_prefix: &str, prior: Option<&FileEntry>) -> FileEntry {
    let file_name = record
        .relative_path
        .rsplit('/')
        .next()
        .unwrap_or(&record.relative_path)
        .to_string();
    let unchanged = prior.filter(|entry| {
        entry.file_size == record.size && entry.created_time == record.created_time
    });
    FileEntry {
        build_type: classify(&record.relative_path),
        file_name,
        file_size: record.size,
        created_time: record.created_time,
        server_prefix: server_prefix.to_string(),
        digest: unchanged.and_then(|entry| entry.digest.clone()),
        download_time_ms: unchanged.and_then(|entry| entry.download_time_ms),
        relative_path: record.relative_path,
    }
}
