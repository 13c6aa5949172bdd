//! Retrying object accessor.
//!
//! Wraps an [`ObjectStore`] with:
//! - classification-aware retry with exponential backoff
//! - Content-Length verification on every GET
//! - the conditional PUT protocol (read, compare fingerprints, then write)
//! - per-source transfer statistics

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use md5::{Digest, Md5};
use serde::Serialize;
use tracing::{debug, warn};

use super::classify::{classify, to_tile_error};
use super::store::{ListPage, ObjectStore, PutObject, StoredObject};
use crate::error::{Payload, TileError, TransportError};

/// Suffix of the side key that receives suspicious shrinking overwrites.
pub const BLOCKED_SUFFIX: &str = ".blocked";

// =============================================================================
// Policies
// =============================================================================

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on each further retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << retry.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_BASE_DELAY)
    }
}

/// What a conditional PUT does when its read step fails with something
/// other than not-found/forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadErrorPolicy {
    /// Return the read error and skip the write
    #[default]
    Propagate,
    /// Fall through to an unconditional write
    Overwrite,
}

impl std::str::FromStr for ReadErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "propagate" => Ok(ReadErrorPolicy::Propagate),
            "overwrite" => Ok(ReadErrorPolicy::Overwrite),
            other => Err(format!(
                "unknown read error policy '{}' (expected propagate or overwrite)",
                other
            )),
        }
    }
}

/// Write-side behavior of the accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    pub on_read_error: ReadErrorPolicy,
    /// Divert writes at most half the size of the stored object to `<key>.blocked`
    pub shrink_guard: bool,
    /// Skip the network PUT while still counting it
    pub dry_run: bool,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            on_read_error: ReadErrorPolicy::Propagate,
            shrink_guard: true,
            dry_run: false,
        }
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Transfer counters for one source instance.
#[derive(Debug, Default)]
pub struct Stats {
    get: AtomicU64,
    put: AtomicU64,
    noop: AtomicU64,
    blocked: AtomicU64,
    txin: AtomicU64,
    txout: AtomicU64,
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub get: u64,
    pub put: u64,
    pub noop: u64,
    pub blocked: u64,
    pub txin: u64,
    pub txout: u64,
}

impl Stats {
    pub fn record_noop(&self) {
        self.noop.fetch_add(1, Ordering::Relaxed);
    }

    fn record_get(&self) {
        self.get.fetch_add(1, Ordering::Relaxed);
    }

    fn record_txin(&self, bytes: usize) {
        self.txin.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_put(&self, bytes: usize) {
        self.put.fetch_add(1, Ordering::Relaxed);
        self.txout.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            get: self.get.load(Ordering::Relaxed),
            put: self.put.load(Ordering::Relaxed),
            noop: self.noop.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            txin: self.txin.load(Ordering::Relaxed),
            txout: self.txout.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Accessor
// =============================================================================

/// Result of a conditional PUT that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The payload was written to its key
    Written { key: String },
    /// The stored object already had identical content
    Unchanged,
    /// The payload was diverted to a `.blocked` side key
    Blocked { key: String },
    /// Dry-run mode: nothing was sent
    DryRun { key: String },
    /// Not attempted: a solid placeholder the masks can reconstruct
    Skipped,
}

/// 128-bit content fingerprint used to compare stored and new payloads.
pub fn fingerprint(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&Md5::digest(data));
    out
}

/// Object accessor with retry, length verification and conditional writes.
pub struct RetryingAccessor<S> {
    store: S,
    retry: RetryPolicy,
    write: WritePolicy,
    stats: Stats,
}

impl<S: ObjectStore> RetryingAccessor<S> {
    pub fn new(store: S) -> Self {
        Self::with_policies(store, RetryPolicy::default(), WritePolicy::default())
    }

    pub fn with_policies(store: S, retry: RetryPolicy, write: WritePolicy) -> Self {
        Self {
            store,
            retry,
            write,
            stats: Stats::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn write_policy(&self) -> WritePolicy {
        self.write
    }

    /// GET an object, retrying retryable failures.
    ///
    /// A body whose length differs from the declared Content-Length is
    /// treated as a retryable truncated response, never as success.
    pub async fn get(
        &self,
        bucket: &str,
        key: &str,
        payload: Payload,
    ) -> Result<StoredObject, TileError> {
        self.stats.record_get();
        let object = self
            .with_retry("GET", key, payload, || async move {
                let object = self.store.get_object(bucket, key).await?;
                verify_length(object)
            })
            .await?;
        self.stats.record_txin(object.body.len());
        Ok(object)
    }

    /// Conditional PUT.
    ///
    /// Reads the current object first: identical content is a no-op, a
    /// missing object is written directly, a suspicious shrink goes to the
    /// `.blocked` side key when the shrink guard is on. Other read failures
    /// follow [`ReadErrorPolicy`].
    pub async fn put(&self, mut request: PutObject, payload: Payload) -> Result<PutOutcome, TileError> {
        let mut blocked = false;

        match self.get(&request.bucket, &request.key, payload).await {
            Ok(existing) => {
                let digest = fingerprint(&request.body);
                if fingerprint(&existing.body) == digest {
                    debug!(key = %request.key, md5 = %hex::encode(digest), "Content unchanged, skipping PUT");
                    self.stats.record_noop();
                    return Ok(PutOutcome::Unchanged);
                }

                if self.write.shrink_guard && request.body.len() * 2 <= existing.body.len() {
                    warn!(
                        key = %request.key,
                        old_bytes = existing.body.len(),
                        new_bytes = request.body.len(),
                        "Blocking suspicious overwrite"
                    );
                    self.stats.record_blocked();
                    request.key.push_str(BLOCKED_SUFFIX);
                    blocked = true;
                }
            }
            Err(e) if e.is_missing() => {}
            Err(e) => match self.write.on_read_error {
                ReadErrorPolicy::Propagate => return Err(e),
                ReadErrorPolicy::Overwrite => {
                    warn!(key = %request.key, error = %e, "Conditional read failed, writing anyway");
                }
            },
        }

        let key = request.key.clone();
        let len = request.body.len();

        if self.write.dry_run {
            self.stats.record_put(len);
            return Ok(PutOutcome::DryRun { key });
        }

        self.with_retry("PUT", &key, payload, || {
            let request = request.clone();
            async move { self.store.put_object(request).await }
        })
        .await?;
        self.stats.record_put(len);

        Ok(if blocked {
            PutOutcome::Blocked { key }
        } else {
            PutOutcome::Written { key }
        })
    }

    /// List one page of keys under `prefix`, retrying retryable failures.
    pub async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<String>,
    ) -> Result<ListPage, TileError> {
        self.with_retry("LIST", prefix, Payload::Tile, || {
            let token = token.clone();
            async move { self.store.list_page(bucket, prefix, token).await }
        })
        .await
    }

    /// Run `op` until it succeeds, fails terminally, or attempts run out.
    async fn with_retry<T, F, Fut>(
        &self,
        method: &str,
        key: &str,
        payload: Payload,
        mut op: F,
    ) -> Result<T, TileError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 1;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match classify(&err, payload) {
                Some(classified) if classified.retryable && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt - 1);
                    warn!(
                        method,
                        key,
                        attempt,
                        kind = %classified.kind,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after {}",
                        classified.message
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                _ => return Err(to_tile_error(err, payload)),
            }
        }
    }
}

fn verify_length(object: StoredObject) -> Result<StoredObject, TransportError> {
    match object.content_length {
        Some(declared) if declared != object.body.len() as u64 => {
            Err(TransportError::TruncatedBody {
                declared,
                actual: object.body.len() as u64,
                diagnostics: object.diagnostics,
            })
        }
        _ => Ok(object),
    }
}

/// Convenience for building a PUT of `body` to `bucket/key`.
pub fn put_request(bucket: &str, key: &str, body: Bytes) -> PutObject {
    PutObject {
        bucket: bucket.to_string(),
        key: key.to_string(),
        body,
        ..Default::default()
    }
}
