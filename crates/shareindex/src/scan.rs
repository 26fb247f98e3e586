//! Incremental scan of configured shares into the cache.
//!
//! Each pass enumerates a share's top-level directories and compares each
//! directory's immediate subdirectory count with the count stored in its
//! [`ScanMeta`](crate::types::ScanMeta). Only directories whose count changed
//! (or that were never cached) are walked; the walk result replaces the
//! directory's index wholesale, together with the new metadata.
//!
//! ## Failure scope
//!
//! - A failing directory is skipped for this pass and its cached index stays.
//! - A share that cannot be enumerated aborts only that share's pass.
//! - Transient share errors are retried under the configured
//!   [`RetryPolicy`](crate::config::RetryPolicy).
//!
//! The subdirectory count is a coarse signal: replacing a file inside an
//! existing subdirectory is not noticed until a [`ScanMode::Force`] pass.

mod orchestrator;
mod retry;
mod state;

pub use orchestrator::ScanOrchestrator;
pub use retry::with_retry;
pub use state::{PassOutcome, PassReport, ScanMode, ScanRunState, SharePhase, ShareRunState, Trigger};
