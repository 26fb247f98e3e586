//! ShareIndexService - the operations the HTTP layer exposes.
//!
//! Owns the share clients, the cache store, the scan orchestrator and the
//! downloader. Everything is passed in at construction; there is no global
//! state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::{FileCacheStore, MemoryCacheStore, SharedCacheStore};
use crate::config::{CacheBackend, ServiceConfig};
use crate::download::{DownloadRequest, DownloadResponse, Downloader};
use crate::error::{Result, ShareIndexError};
use crate::scan::{PassOutcome, ScanMode, ScanOrchestrator, ScanRunState, Trigger};
use crate::share::{MountedShare, SharedShareClient};
use crate::types::{FileInfo, SearchPage, SearchQuery, ShareDescriptor, ShareStatus, StatusSummary};

pub struct ShareIndexService {
    config: ServiceConfig,
    cache: SharedCacheStore,
    orchestrator: Arc<ScanOrchestrator>,
    downloader: Downloader,
}

impl std::fmt::Debug for ShareIndexService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareIndexService")
            .field("config", &self.config)
            .field("orchestrator", &self.orchestrator)
            .field("downloader", &self.downloader)
            .finish()
    }
}

impl ShareIndexService {
    /// Builds mounted share clients and the configured cache backend.
    pub fn from_config(config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        let clients: HashMap<String, SharedShareClient> = config
            .shares
            .iter()
            .map(|share| {
                let client: SharedShareClient = Arc::new(MountedShare::new(
                    share,
                    config.package_extensions.clone(),
                    config.share_timeout,
                ));
                (share.name.clone(), client)
            })
            .collect();
        let cache: SharedCacheStore = match &config.cache {
            CacheBackend::Memory => Arc::new(MemoryCacheStore::new()),
            CacheBackend::File { dir } => Arc::new(FileCacheStore::new(dir.clone())),
        };
        Self::with_clients(config, clients, cache)
    }

    /// Wires the service from prepared clients, one per configured share.
    pub fn with_clients(
        config: ServiceConfig,
        mut clients: HashMap<String, SharedShareClient>,
        cache: SharedCacheStore,
    ) -> Result<Self> {
        config.validate()?;
        let mut scan_targets = Vec::with_capacity(config.shares.len());
        for share in &config.shares {
            let client = clients.remove(&share.name).ok_or_else(|| {
                ShareIndexError::Config(format!("no client for share {}", share.name))
            })?;
            scan_targets.push((share.clone(), client));
        }
        let download_clients = scan_targets
            .iter()
            .map(|(share, client)| (share.name.clone(), client.clone()))
            .collect();

        let orchestrator = Arc::new(ScanOrchestrator::new(
            scan_targets,
            cache.clone(),
            config.retry,
        ));
        let downloader = Downloader::new(download_clients, cache.clone(), config.probe_limit);
        log::info!(
            "share index service ready shares={} scan_interval_secs={}",
            config.shares.len(),
            config.scan_interval.as_secs()
        );
        Ok(Self {
            config,
            cache,
            orchestrator,
            downloader,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<ScanOrchestrator> {
        &self.orchestrator
    }

    fn ensure_share(&self, name: &str) -> Result<()> {
        self.config
            .share(name)
            .map(|_| ())
            .ok_or_else(|| ShareIndexError::UnknownShare(name.to_string()))
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        let shares = match &query.share {
            Some(name) => {
                self.ensure_share(name)?;
                vec![name.clone()]
            }
            None => self.orchestrator.share_names(),
        };
        self.cache.search_entries(&shares, query).await
    }

    pub fn list_servers(&self) -> Vec<ShareDescriptor> {
        self.config
            .shares
            .iter()
            .map(|share| share.descriptor())
            .collect()
    }

    /// Scan state joined with cached file counts. An unreachable cache
    /// reports `cache_connected: false` with zero counts instead of failing.
    pub async fn status_summary(&self) -> StatusSummary {
        let run_state: ScanRunState = self.orchestrator.run_state();
        let cache_connected = match self.cache.ping().await {
            Ok(()) => true,
            Err(error) => {
                log::warn!("cache ping failed error={}", error);
                false
            }
        };

        let mut shares = BTreeMap::new();
        for share in &self.config.shares {
            let files_count = if cache_connected {
                self.cached_file_count(&share.name).await.unwrap_or_else(|error| {
                    log::warn!("cache count failed share={} error={}", share.name, error);
                    0
                })
            } else {
                0
            };
            let state = run_state.shares.get(&share.name).cloned().unwrap_or_default();
            shares.insert(
                share.name.clone(),
                ShareStatus {
                    files_count,
                    last_scan: state.last_pass,
                    phase: state.phase.label(),
                    last_error: state.last_error,
                },
            );
        }

        StatusSummary {
            last_scan_time: run_state.last_scan_time,
            scanning_in_progress: run_state.scanning_in_progress,
            total_files: shares.values().map(|status| status.files_count).sum(),
            shares,
            cache_connected,
        }
    }

    async fn cached_file_count(&self, share: &str) -> Result<usize> {
        let mut total = 0;
        for directory in self.cache.list_directories(share).await? {
            if let Some(meta) = self.cache.get_scan_meta(share, &directory).await? {
                total += meta.file_count;
            }
        }
        Ok(total)
    }

    /// Forced rescan of one share, or of every share when `share` is `None`.
    pub async fn refresh(&self, share: Option<&str>) -> Result<BTreeMap<String, PassOutcome>> {
        match share {
            Some(name) => {
                let outcome = self
                    .orchestrator
                    .scan_share(name, ScanMode::Force, Trigger::Manual)
                    .await?;
                Ok(BTreeMap::from([(name.to_string(), outcome)]))
            }
            None => Ok(self.orchestrator.scan_all(ScanMode::Force, Trigger::Manual).await),
        }
    }

    /// Validates `share` and runs [`refresh`](Self::refresh) in the
    /// background.
    pub fn spawn_refresh(
        self: &Arc<Self>,
        share: Option<String>,
    ) -> Result<JoinHandle<Result<BTreeMap<String, PassOutcome>>>> {
        if let Some(name) = &share {
            self.ensure_share(name)?;
        }
        let service = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let outcomes = service.refresh(share.as_deref()).await;
            if let Err(error) = &outcomes {
                log::warn!("refresh failed error={}", error);
            }
            outcomes
        }))
    }

    pub async fn download(&self, request: DownloadRequest) -> Result<DownloadResponse> {
        self.downloader.download(request).await
    }

    pub async fn file_info(&self, share: &str, relative_path: &str) -> Result<FileInfo> {
        self.downloader.file_info(share, relative_path).await
    }

    /// Starts periodic incremental scans at the configured interval.
    pub fn spawn_scheduler(&self, cancel: CancellationToken) -> JoinHandle<()> {
        self.orchestrator
            .spawn_scheduler(self.config.scan_interval, cancel)
    }
}
