//! Scan pass state and reporting.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Whether a pass may skip directories whose subdirectory count is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    #[default]
    Incremental,
    /// Re-walk every directory regardless of cached metadata.
    Force,
}

/// Who asked for a pass. Scheduled passes coalesce with one already in
/// flight; manual passes wait for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Manual,
}

/// Where a share's current pass is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SharePhase {
    #[default]
    Idle,
    Enumerating,
    Scanning(String),
}

impl SharePhase {
    pub fn label(&self) -> String {
        match self {
            Self::Idle => "idle".to_string(),
            Self::Enumerating => "enumerating".to_string(),
            Self::Scanning(directory) => format!("scanning {directory}"),
        }
    }
}

/// Directory counts for one completed share pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PassReport {
    pub scanned: usize,
    pub skipped: usize,
    pub failed: usize,
    pub files_indexed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(PassReport),
    /// The share could not be enumerated; nothing was written.
    ShareFailed(String),
    /// A scheduled pass found another pass in flight and did nothing.
    Coalesced,
}

impl PassOutcome {
    pub fn report(&self) -> Option<PassReport> {
        match self {
            Self::Completed(report) => Some(*report),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShareRunState {
    pub phase: SharePhase,
    pub last_pass: Option<DateTime<Utc>>,
    pub last_report: Option<PassReport>,
    /// Most recent share-level or directory-level failure, cleared by a
    /// pass without failures.
    pub last_error: Option<String>,
}

/// Read-only snapshot of the orchestrator's run state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanRunState {
    pub scanning_in_progress: bool,
    /// End of the last full pass over every share.
    pub last_scan_time: Option<DateTime<Utc>>,
    pub shares: BTreeMap<String, ShareRunState>,
}

/// Mutable tracker behind [`ScanRunState`].
#[derive(Debug, Default)]
pub(super) struct RunTracker {
    pub(super) active_passes: usize,
    pub(super) last_scan_time: Option<DateTime<Utc>>,
    pub(super) shares: BTreeMap<String, ShareRunState>,
}

impl RunTracker {
    pub(super) fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            shares: names
                .into_iter()
                .map(|name| (name.to_string(), ShareRunState::default()))
                .collect(),
            ..Self::default()
        }
    }

    pub(super) fn snapshot(&self) -> ScanRunState {
        ScanRunState {
            scanning_in_progress: self.active_passes > 0,
            last_scan_time: self.last_scan_time,
            shares: self.shares.clone(),
        }
    }

    pub(super) fn share_mut(&mut self, name: &str) -> &mut ShareRunState {
        self.shares.entry(name.to_string()).or_default()
    }
}
