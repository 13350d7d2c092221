//! Request coalescing and rate-limit backoff.
//!
//! Idempotent reads against the relay (status polls, mostly) are funnelled
//! through a [`Coalescer`], which guarantees at most one network call per
//! distinct request key at any instant. Concurrent callers with the same key
//! await the same in-flight request and observe the identical result.
//!
//! Rate-limited requests are retried with bounded exponential delays by
//! [`with_rate_limit_backoff`]. The retry loop belongs *inside* the coalesced
//! future, so callers that join during a backoff window ride the single
//! retrying attempt instead of each retrying on their own.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;

use crate::error::RelayError;

/// First retry delay after a 429.
pub const RATE_LIMIT_BASE_DELAY_MS: u64 = 2000;
/// Ceiling on a single backoff delay.
pub const RATE_LIMIT_MAX_DELAY_MS: u64 = 10_000;
/// Default total attempt budget (initial try included).
pub const RATE_LIMIT_MAX_ATTEMPTS: u32 = 3;

type SharedRequest<T> = Shared<BoxFuture<'static, Result<T, RelayError>>>;
type PendingMap<T> = Arc<Mutex<HashMap<String, SharedRequest<T>>>>;

/// Canonical cache key for an endpoint + parameter combination.
///
/// Parameter structs serialize with a fixed field order, so the same logical
/// request always yields the same key.
pub fn request_key<P: Serialize>(endpoint: &str, params: &P) -> String {
    let params = serde_json::to_string(params).unwrap_or_default();
    format!("{endpoint}:{params}")
}

/// Single-flight cache for in-flight requests.
///
/// Owned by whichever component composes the poller/dispatcher; create one
/// per session and drop it on teardown. The pending map is the only shared
/// mutable state here, and only [`Coalescer::run`] and the settlement guard
/// touch it.
pub struct Coalescer<T> {
    pending: PendingMap<T>,
}

impl<T> Coalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `request` under `key`, sharing any request already in flight.
    ///
    /// The cache entry is removed when the request settles, success or
    /// failure, via a drop guard — a panic inside `request` cannot leak a
    /// stale entry. The underlying request is driven by a spawned task, so
    /// a caller dropping mid-await never stalls the other callers sharing
    /// the key.
    pub async fn run<Fut>(&self, key: &str, request: Fut) -> Result<T, RelayError>
    where
        Fut: Future<Output = Result<T, RelayError>> + Send + 'static,
    {
        let (shared, started) = {
            let mut pending = lock_pending(&self.pending);
            match pending.get(key) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let clear = ClearOnSettle {
                        pending: Arc::clone(&self.pending),
                        key: key.to_owned(),
                    };
                    let shared = async move {
                        let _clear = clear;
                        request.await
                    }
                    .boxed()
                    .shared();
                    pending.insert(key.to_owned(), shared.clone());
                    (shared, true)
                }
            }
        };

        if started {
            tokio::spawn(shared.clone().map(|_| ()));
        }

        shared.await
    }

    /// Number of requests currently in flight.
    pub fn in_flight(&self) -> usize {
        lock_pending(&self.pending).len()
    }
}

impl<T> Default for Coalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock_pending<T>(pending: &Mutex<HashMap<String, SharedRequest<T>>>) -> MutexGuard<'_, HashMap<String, SharedRequest<T>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the pending-map entry when the owning future settles or is torn
/// down, whichever comes first.
struct ClearOnSettle<T> {
    pending: PendingMap<T>,
    key: String,
}

impl<T> Drop for ClearOnSettle<T> {
    fn drop(&mut self) {
        lock_pending(&self.pending).remove(&self.key);
    }
}

/// Invoke `request`, retrying rate-limit failures with exponential delays.
///
/// Delays follow `min(2000 * 2^attempt, 10_000)` ms: 2s, 4s, 8s, then capped.
/// Any non-rate-limit error is returned immediately; exhausting the attempt
/// budget returns the last rate-limit error.
pub async fn with_rate_limit_backoff<T, F, Fut>(
    mut request: F,
    max_attempts: u32,
) -> Result<T, RelayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RelayError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match request().await {
            Err(err) if err.is_rate_limited() && attempt + 1 < max_attempts => {
                let delay = Duration::from_millis(
                    (RATE_LIMIT_BASE_DELAY_MS << attempt).min(RATE_LIMIT_MAX_DELAY_MS),
                );
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "relay rate limited request, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}
