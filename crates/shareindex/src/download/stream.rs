//! Body stream adapters for the download path.

use std::time::{Duration, Instant};

use futures_util::{stream, StreamExt};
use sha2::{Digest, Sha256};

use crate::error::ShareIndexError;
use crate::share::ByteStream;

struct LimitState {
    inner: ByteStream,
    remaining: u64,
    /// Fail when the share ends before `remaining` reaches zero.
    exact: bool,
    done: bool,
}

/// Yields at most `limit` bytes of `inner`. With `exact`, a share stream
/// that ends early yields `TransferInterrupted` instead of a short body.
pub fn limit_stream(inner: ByteStream, limit: u64, exact: bool) -> ByteStream {
    let state = LimitState {
        inner,
        remaining: limit,
        exact,
        done: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        if state.done || state.remaining == 0 {
            return None;
        }
        match state.inner.next().await {
            Some(Ok(mut chunk)) => {
                if chunk.len() as u64 > state.remaining {
                    chunk.truncate(state.remaining as usize);
                }
                state.remaining -= chunk.len() as u64;
                Some((Ok(chunk), state))
            }
            Some(Err(error)) => {
                state.done = true;
                Some((Err(error), state))
            }
            None if state.exact => {
                state.done = true;
                let error = ShareIndexError::TransferInterrupted(format!(
                    "share stream ended {} bytes early",
                    state.remaining
                ));
                Some((Err(error), state))
            }
            None => None,
        }
    }))
}

/// Digest and timing of a body that streamed to the end without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestSample {
    /// Lowercase hex SHA-256.
    pub digest: String,
    pub bytes: u64,
    pub elapsed: Duration,
}

struct TapState<F> {
    inner: ByteStream,
    hasher: Sha256,
    bytes: u64,
    started: Instant,
    on_complete: Option<F>,
}

/// Hashes `inner` as it passes through and hands the result to
/// `on_complete` once the stream ends cleanly. Errors or an early drop skip
/// the callback.
pub fn digest_tap<F>(inner: ByteStream, on_complete: F) -> ByteStream
where
    F: FnOnce(DigestSample) + Send + 'static,
{
    let state = TapState {
        inner,
        hasher: Sha256::new(),
        bytes: 0,
        started: Instant::now(),
        on_complete: Some(on_complete),
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        match state.inner.next().await {
            Some(Ok(chunk)) => {
                state.hasher.update(&chunk);
                state.bytes += chunk.len() as u64;
                Some((Ok(chunk), state))
            }
            Some(Err(error)) => {
                state.on_complete = None;
                Some((Err(error), state))
            }
            None => {
                if let Some(on_complete) = state.on_complete.take() {
                    on_complete(DigestSample {
                        digest: format!("{:x}", std::mem::take(&mut state.hasher).finalize()),
                        bytes: state.bytes,
                        elapsed: state.started.elapsed(),
                    });
                }
                None
            }
        }
    }))
}
