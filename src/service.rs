//! Public facade: wires a byte cache chain, bar cache chain, decoder and
//! search engine together into the one type most callers need.
//!
//! Grounded on the teacher's `DukascopyService` (a thin owner of a
//! `base_url` and a `DataSupplier`) but generalized into an owner of a
//! full cache-chain-plus-search-engine, since this crate's scope covers
//! caching and aggregation rather than a single fetch-and-decode call.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::cache::bar_cache::{BarCache, DirectBarNoCache, LocalBarCache};
use crate::cache::byte_cache::{ByteCache, LocalByteCache};
use crate::cache::object_store::ObjectStore;
use crate::cache::{S3BarCache, S3ByteCache};
use crate::config::{CacheConfig, FetcherConfig};
use crate::data_supplier::{DataSupplier, ReqwestDataSupplier};
use crate::decoder::{Bi5Decoder, TickDecoder};
use crate::error::Error;
use crate::fetcher::RateLimitedFetcher;
use crate::model::{Bar, Period, StreamId, Tick};
use crate::primer::Primer;
use crate::search::SearchEngine;
use crate::stats::StatsNode;

/// Everything needed to serve tick and bar queries for the realtime
/// stream: a rate-limited fetcher wrapped in a local filesystem tier
/// (optionally an object-store tier ahead of that), a tick decoder, the
/// online aggregator wired up per-period inside the bar cache chain, and
/// the search engine built on top.
pub struct DukascopyService {
    search: SearchEngine,
    byte_cache: Arc<dyn ByteCache>,
    primer: Primer,
}

impl DukascopyService {
    /// Local-only cache chain: `Local -> RateLimitedFetcher`, no object
    /// storage tier.
    pub fn local(fetcher_config: FetcherConfig, cache_config: CacheConfig) -> Self {
        let supplier: Box<dyn DataSupplier> = Box::new(ReqwestDataSupplier::new());
        let fetcher: Arc<dyn ByteCache> = Arc::new(RateLimitedFetcher::new(supplier, fetcher_config));
        let byte_cache: Arc<dyn ByteCache> = Arc::new(LocalByteCache::new(cache_config.local_cache_dir.clone(), fetcher));

        let decoder: Arc<dyn TickDecoder> = Arc::new(Bi5Decoder);
        let direct_bars: Arc<dyn BarCache> = Arc::new(DirectBarNoCache::new(byte_cache.clone(), decoder.clone(), StreamId::REALTIME));
        let bar_cache: Arc<dyn BarCache> = Arc::new(LocalBarCache::new(cache_config.local_cache_dir.join("bars"), direct_bars));

        let search = SearchEngine::new(byte_cache.clone(), bar_cache, decoder, StreamId::REALTIME);
        let primer = Primer::new(byte_cache.clone());

        DukascopyService { search, byte_cache, primer }
    }

    /// Three-tier cache chain: `Local -> S3 -> RateLimitedFetcher`, for
    /// deployments sharing a cache across hosts.
    pub fn with_object_store(
        fetcher_config: FetcherConfig,
        cache_config: CacheConfig,
        bucket: impl Into<String>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let bucket = bucket.into();
        let supplier: Box<dyn DataSupplier> = Box::new(ReqwestDataSupplier::new());
        let fetcher: Arc<dyn ByteCache> = Arc::new(RateLimitedFetcher::new(supplier, fetcher_config));
        let s3_bytes: Arc<dyn ByteCache> = Arc::new(S3ByteCache::new(bucket.clone(), store.clone(), fetcher));
        let byte_cache: Arc<dyn ByteCache> = Arc::new(LocalByteCache::new(cache_config.local_cache_dir.clone(), s3_bytes));

        let decoder: Arc<dyn TickDecoder> = Arc::new(Bi5Decoder);
        let direct_bars: Arc<dyn BarCache> = Arc::new(DirectBarNoCache::new(byte_cache.clone(), decoder.clone(), StreamId::REALTIME));
        let s3_bars: Arc<dyn BarCache> = Arc::new(S3BarCache::new(bucket, store, direct_bars));
        let bar_cache: Arc<dyn BarCache> = Arc::new(LocalBarCache::new(cache_config.local_cache_dir.join("bars"), s3_bars));

        let search = SearchEngine::new(byte_cache.clone(), bar_cache, decoder, StreamId::REALTIME);
        let primer = Primer::new(byte_cache.clone());

        DukascopyService { search, byte_cache, primer }
    }

    pub async fn search_ticks(&self, symbol: &str, start: OffsetDateTime, end: OffsetDateTime) -> Result<Vec<Tick>, Error> {
        self.search.search(symbol, start, end, None).await
    }

    pub async fn search_bars(&self, symbol: &str, period: Period, start: OffsetDateTime, end: OffsetDateTime) -> Result<Vec<Bar>, Error> {
        self.search.aggregate_from_ticks(symbol, period, start, end).await
    }

    pub async fn bars_forward(&self, symbol: &str, period: Period, anchor: OffsetDateTime, count: usize) -> Result<Vec<Bar>, Error> {
        self.search.extend_forward(symbol, period, anchor, count).await
    }

    pub async fn bars_backward(&self, symbol: &str, period: Period, anchor: OffsetDateTime, count: usize) -> Result<Vec<Bar>, Error> {
        self.search.extend_backward(symbol, period, anchor, count).await
    }

    pub fn new_priming_load(&self) {
        self.primer.new_load();
    }

    pub fn prime(&self, symbol: &str, start: OffsetDateTime, end: OffsetDateTime) {
        self.primer.load(symbol, start, end);
    }

    pub async fn wait_for_priming(&self) {
        self.primer.wait_for_completion().await;
    }

    pub fn shutdown_priming(&self) {
        self.primer.shutdown();
    }

    pub fn stats(&self) -> StatsNode {
        self.byte_cache.stats()
    }

    pub fn search_engine(&self) -> &SearchEngine {
        &self.search
    }
}
