//! Leaf of every byte cache chain: fetches a vendor path over HTTP under a
//! token-bucket rate limit, retrying on the vendor's rate-limit marker with
//! linear (not exponential) backoff.
//!
//! Hand-rolled rather than built on a rate-limiting crate, matching the
//! throttle-and-retry style seen across the broader Rust market-data
//! corpus (plain `tokio::time::sleep` loops guarded by an atomic permit
//! counter) rather than the teacher's own code, which has no leaf fetcher
//! of its own.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::cache::byte_cache::ByteCache;
use crate::config::FetcherConfig;
use crate::data_supplier::DataSupplier;
use crate::error::{Error, Kind};
use crate::stats::{SimpleStats, StatsNode, MISS, RETRY};

/// Single-permit-at-a-time token bucket: refills at `permits_per_second`,
/// never accumulates more than one second's worth of permits.
struct TokenBucket {
    permits_per_second: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    available: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(permits_per_second: f64) -> Self {
        TokenBucket {
            permits_per_second,
            state: Mutex::new(BucketState {
                available: permits_per_second,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Blocks until one permit is available, then consumes it.
    async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
                state.available = (state.available + elapsed * self.permits_per_second).min(self.permits_per_second);
                state.last_refill = now;

                if state.available >= 1.0 {
                    state.available -= 1.0;
                    None
                } else {
                    let shortfall = 1.0 - state.available;
                    Some(StdDuration::from_secs_f64(shortfall / self.permits_per_second))
                }
            };

            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }
}

/// The root of a byte cache chain: no fallback, talks directly to the
/// vendor over HTTP (or whatever [`DataSupplier`] is configured).
pub struct RateLimitedFetcher {
    supplier: Box<dyn DataSupplier>,
    config: FetcherConfig,
    bucket: TokenBucket,
    stats: std::sync::Arc<SimpleStats>,
    retry_attempts: AtomicI64,
}

impl RateLimitedFetcher {
    pub fn new(supplier: Box<dyn DataSupplier>, config: FetcherConfig) -> Self {
        let bucket = TokenBucket::new(config.permits_per_second);
        RateLimitedFetcher {
            supplier,
            config,
            bucket,
            stats: SimpleStats::new("rate-limited-fetcher"),
            retry_attempts: AtomicI64::new(0),
        }
    }

    /// Total number of retried attempts across this fetcher's lifetime.
    pub fn retry_attempts(&self) -> i64 {
        self.retry_attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ByteCache for RateLimitedFetcher {
    async fn get(&self, path: &str) -> Result<Bytes, Error> {
        let url = format!("{}{}", self.config.normalized_base_url(), path);

        let mut attempt: u32 = 0;
        loop {
            self.bucket.acquire().await;

            match self.supplier.fetch(&url).await {
                Ok(Some(bytes)) => {
                    self.stats.increment(MISS);
                    return Ok(bytes);
                }
                Ok(None) => {
                    self.stats.increment(MISS);
                    return Ok(Bytes::new());
                }
                Err(error) if error.kind == Kind::Transient && error.contains_marker(&self.config.rate_limited_marker) => {
                    attempt += 1;
                    if attempt > self.config.retry_count {
                        return Err(error);
                    }
                    self.stats.increment(RETRY);
                    self.retry_attempts.fetch_add(1, Ordering::Relaxed);
                    let wait_seconds = self.config.retry_seconds * attempt as f64;
                    tokio::time::sleep(StdDuration::from_secs_f64(wait_seconds)).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn stats(&self) -> StatsNode {
        StatsNode::Leaf(self.stats.clone())
    }
}
