//! Cache primer: walks a `(symbol, start, end)` window and warms every
//! byte-cache tier for it ahead of time, using a bounded worker pool sized
//! to the host's parallelism. Failures are logged and swallowed — priming
//! is a best-effort optimization, never a correctness requirement.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use time::{Duration, OffsetDateTime};

use crate::cache::byte_cache::ByteCache;
use crate::error::Error;
use crate::market_status::MarketStatusOracle;
use crate::model::floor_to_hour;
use crate::path_generator::vendor_path;

/// One priming run over a window. Call [`Primer::load`] to kick it off,
/// [`Primer::wait_for_completion`] to block until every hour has been
/// attempted, and [`Primer::shutdown`] to cancel remaining work.
pub struct Primer {
    byte_cache: Arc<dyn ByteCache>,
    market_status: MarketStatusOracle,
    semaphore: Arc<Semaphore>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Primer {
    pub fn new(byte_cache: Arc<dyn ByteCache>) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Primer {
            byte_cache,
            market_status: MarketStatusOracle::new(),
            semaphore: Arc::new(Semaphore::new(workers)),
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Clears any pending priming tasks from a previous [`Primer::load`]
    /// run, aborting ones still in flight, so the next `load()` call
    /// starts from an empty queue instead of accumulating across runs.
    pub fn new_load(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            task.abort();
        }
    }

    /// Schedules every open hourly archive in `[start, end]` for `symbol`
    /// to be fetched (and so persisted by whichever cache tiers wrap the
    /// fetcher). Returns immediately; tasks run on the Tokio runtime.
    pub fn load(&self, symbol: &str, start: OffsetDateTime, end: OffsetDateTime) {
        let symbol = symbol.to_string();
        let mut hour = floor_to_hour(start);
        let last_hour = floor_to_hour(end);

        let mut tasks = self.tasks.lock().unwrap();
        while hour <= last_hour {
            if self.market_status.is_open(hour) {
                let path = vendor_path(&symbol, hour);
                let byte_cache = self.byte_cache.clone();
                let semaphore = self.semaphore.clone();
                tasks.push(tokio::spawn(async move {
                    let permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };
                    let result: Result<_, Error> = byte_cache.get(&path).await;
                    if let Err(error) = result {
                        tracing::warn!(error = %error, path, "failed to prime cache entry");
                    }
                    drop(permit);
                }));
            }
            hour += Duration::hours(1);
        }
    }

    /// Blocks until every task scheduled so far has finished (successfully
    /// or not — failures are logged inside the task itself).
    pub async fn wait_for_completion(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            if let Err(error) = task.await {
                tracing::warn!(error = %error, "priming task panicked");
            }
        }
    }

    /// Aborts every task scheduled so far that has not yet completed.
    pub fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::stats::{SimpleStats, StatsNode};

    struct CountingCache {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ByteCache for CountingCache {
        async fn get(&self, _path: &str) -> Result<Bytes, Error> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(b"ok"))
        }
        fn stats(&self) -> StatsNode {
            StatsNode::Leaf(SimpleStats::new("counting-cache"))
        }
    }

    #[tokio::test]
    async fn load_primes_every_open_hour_in_the_window() {
        let count = Arc::new(AtomicUsize::new(0));
        let cache: Arc<dyn ByteCache> = Arc::new(CountingCache { count: count.clone() });
        let primer = Primer::new(cache);

        // Monday 00:00 to 04:00 UTC, all open hours.
        primer.load(
            "EURUSD",
            time::macros::datetime!(2020-01-06 00:00:00 UTC),
            time::macros::datetime!(2020-01-06 04:00:00 UTC),
        );
        primer.wait_for_completion().await;

        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn shutdown_cancels_outstanding_work() {
        let count = Arc::new(AtomicUsize::new(0));
        let cache: Arc<dyn ByteCache> = Arc::new(CountingCache { count: count.clone() });
        let primer = Primer::new(cache);

        primer.load(
            "EURUSD",
            time::macros::datetime!(2020-01-06 00:00:00 UTC),
            time::macros::datetime!(2020-01-10 23:00:00 UTC),
        );
        primer.shutdown();
        // No assertion on count: cancellation is best-effort and racy by
        // nature, this just exercises the path without panicking.
    }

    #[tokio::test]
    async fn new_load_clears_pending_tasks() {
        let count = Arc::new(AtomicUsize::new(0));
        let cache: Arc<dyn ByteCache> = Arc::new(CountingCache { count: count.clone() });
        let primer = Primer::new(cache);

        primer.load(
            "EURUSD",
            time::macros::datetime!(2020-01-06 00:00:00 UTC),
            time::macros::datetime!(2020-01-10 23:00:00 UTC),
        );
        primer.new_load();
        assert!(primer.tasks.lock().unwrap().is_empty());

        primer.load(
            "EURUSD",
            time::macros::datetime!(2020-01-06 00:00:00 UTC),
            time::macros::datetime!(2020-01-06 04:00:00 UTC),
        );
        primer.wait_for_completion().await;

        assert_eq!(count.load(Ordering::SeqCst), 5);
    }
}
