//! Read-through cache tier for a day's worth of pre-aggregated bars,
//! mirroring [`ByteCache`](crate::cache::byte_cache::ByteCache) but keyed
//! on `(BarCriteria, day_of_paths)` and serialized as JSON instead of
//! opaque bytes.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::{Date, Month, OffsetDateTime, Time};
use tokio::sync::Mutex as AsyncMutex;

use crate::aggregator::TickBarAggregator;
use crate::cache::byte_cache::ByteCache;
use crate::cache::object_store::ObjectStore;
use crate::decoder::TickDecoder;
use crate::error::{Error, Kind};
use crate::json_array;
use crate::model::{Bar, BarCriteria, Origin, Period, StreamId};
use crate::stats::{SimpleStats, StatsNode, HIT, MISS};

#[async_trait]
pub trait BarCache: Send + Sync {
    /// Returns the bars for one UTC day, given the (always <=24) hourly
    /// paths covering it, anchored at `day_paths[0]` for caching purposes.
    async fn get_day(&self, criteria: &BarCriteria, day_paths: &[String]) -> Result<Vec<Bar>, Error>;
    fn stats(&self) -> StatsNode;
}

/// `"bars/<PERIOD>/<SYMBOL>/<YYYY>/<MM0>/<DD>.json"`, anchored on the
/// day's first hourly path — preserved verbatim from the source for
/// wire/storage compatibility (Design Notes, §9).
pub fn create_bar_path(period: Period, symbol: &str, first_day_path: &str) -> Result<String, Error> {
    let segments: Vec<&str> = first_day_path.split('/').collect();
    if segments.len() != 5 {
        return Err(Error::invalid_argument(format!(
            "malformed vendor path {first_day_path}, expected 5 segments"
        )));
    }
    let (year, month0, day) = (segments[1], segments[2], segments[3]);
    Ok(format!("bars/{period}/{symbol}/{year}/{month0}/{day}.json"))
}

fn parse_hour_from_path(path: &str) -> Result<OffsetDateTime, Error> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() != 5 {
        return Err(Error::invalid_argument(format!("malformed vendor path {path}")));
    }
    let year: i32 = segments[1]
        .parse()
        .map_err(|_| Error::invalid_argument(format!("malformed year in path {path}")))?;
    let month0: u8 = segments[2]
        .parse()
        .map_err(|_| Error::invalid_argument(format!("malformed month in path {path}")))?;
    let day: u8 = segments[3]
        .parse()
        .map_err(|_| Error::invalid_argument(format!("malformed day in path {path}")))?;
    let hour_str = segments[4]
        .strip_suffix("h_ticks.bi5")
        .ok_or_else(|| Error::invalid_argument(format!("malformed hour segment in path {path}")))?;
    let hour: u8 = hour_str
        .parse()
        .map_err(|_| Error::invalid_argument(format!("malformed hour in path {path}")))?;

    let month = Month::try_from(month0 + 1)
        .map_err(|_| Error::invalid_argument(format!("month {month0} out of range in path {path}")))?;
    let date = Date::from_calendar_date(year, month, day)
        .map_err(|e| Error::with_source(Kind::InvalidArgument, format!("invalid date in path {path}"), e))?;
    let time = Time::from_hms(hour, 0, 0)
        .map_err(|e| Error::with_source(Kind::InvalidArgument, format!("invalid hour in path {path}"), e))?;
    Ok(date.with_time(time).assume_utc())
}

#[derive(Debug, Serialize, Deserialize)]
struct BarDto {
    #[serde(rename = "startMillisecondsUtc")]
    start_millis_utc: i64,
    #[serde(rename = "streamId")]
    stream_id: String,
    period: String,
    symbol: String,
    open: i64,
    high: i64,
    low: i64,
    close: i64,
    source: String,
    #[serde(rename = "modelVersion", default)]
    model_version: String,
}

impl BarDto {
    fn from_bar(bar: &Bar) -> Self {
        BarDto {
            start_millis_utc: bar.start_millis,
            stream_id: bar.stream_id.0.to_string(),
            period: bar.period.name().to_string(),
            symbol: bar.symbol.clone(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            source: bar.origin.to_string(),
            model_version: "1.0".to_string(),
        }
    }

    fn into_bar(self) -> Result<Bar, Error> {
        let stream_id = StreamId(
            uuid::Uuid::parse_str(&self.stream_id)
                .map_err(|e| Error::with_source(Kind::Io, "malformed streamId in bar JSON", e))?,
        );
        let period = Period::parse(&self.period)?;
        let origin = match self.source.as_str() {
            "Live" => Origin::Live,
            "Historical" => Origin::Historical,
            other => return Err(Error::invalid_argument(format!("unknown bar source {other}"))),
        };
        Bar::new(
            self.start_millis_utc,
            stream_id,
            period,
            self.symbol,
            self.open,
            self.high,
            self.low,
            self.close,
            origin,
        )
    }
}

fn encode_bars(bars: &[Bar]) -> Result<Vec<u8>, Error> {
    let dtos: Vec<BarDto> = bars.iter().map(BarDto::from_bar).collect();
    let mut out = Vec::new();
    json_array::encode_array(&dtos, &mut out)?;
    Ok(out)
}

fn decode_bars(bytes: &[u8]) -> Result<Vec<Bar>, Error> {
    let dtos: Vec<BarDto> = json_array::decode_array(bytes, None)?;
    dtos.into_iter().map(BarDto::into_bar).collect()
}

/// Leaf bar tier with no cache: computes a day of bars directly from the
/// raw tick archives via a [`ByteCache`] chain and the online aggregator.
pub struct DirectBarNoCache {
    byte_cache: Arc<dyn ByteCache>,
    decoder: Arc<dyn TickDecoder>,
    stream_id: StreamId,
    stats: Arc<SimpleStats>,
}

impl DirectBarNoCache {
    pub fn new(byte_cache: Arc<dyn ByteCache>, decoder: Arc<dyn TickDecoder>, stream_id: StreamId) -> Self {
        DirectBarNoCache {
            byte_cache,
            decoder,
            stream_id,
            stats: SimpleStats::new("direct-bar-no-cache"),
        }
    }
}

#[async_trait]
impl BarCache for DirectBarNoCache {
    async fn get_day(&self, criteria: &BarCriteria, day_paths: &[String]) -> Result<Vec<Bar>, Error> {
        if day_paths.len() != 24 {
            return Err(Error::invalid_argument(format!(
                "Paths for Day of 1H Tick files is not 24! {}",
                day_paths.len()
            )));
        }

        self.stats.increment(MISS);

        let aggregator = TickBarAggregator::new(criteria.period);

        let day_start_millis = (criteria.day_start.unix_timestamp_nanos() / 1_000_000) as i64;
        let day_end_millis = (criteria.day_end.unix_timestamp_nanos() / 1_000_000) as i64;

        let mut bars = Vec::new();
        for path in day_paths {
            let hour_start = parse_hour_from_path(path)?;
            let bytes = self.byte_cache.get(path).await?;
            let ticks = self
                .decoder
                .decode(&bytes, &criteria.symbol, hour_start, self.stream_id, Origin::Historical)?;

            for tick in ticks {
                if tick.time_millis < day_start_millis || tick.time_millis > day_end_millis {
                    continue;
                }
                aggregator.feed_tick(&tick, &mut |bar: Bar| bars.push(bar));
            }
        }
        aggregator.load_end(&mut |bar: Bar| bars.push(bar));

        let max_allowed = criteria.period.periods_in(Period::D1);
        if (bars.len() as i64) > max_allowed {
            return Err(Error::illegal_state(format!("Unexpected number of bars {}", bars.len())));
        }

        Ok(bars)
    }

    fn stats(&self) -> StatsNode {
        StatsNode::Leaf(self.stats.clone())
    }
}

/// Local filesystem bar tier: same read-through shape as
/// [`LocalByteCache`](crate::cache::byte_cache::LocalByteCache), keyed on
/// the day anchor path and persisting JSON instead of opaque bytes.
pub struct LocalBarCache {
    root: PathBuf,
    stats: Arc<SimpleStats>,
    fallback: Arc<dyn BarCache>,
    persist_lock: AsyncMutex<()>,
}

impl LocalBarCache {
    pub fn new(root: PathBuf, fallback: Arc<dyn BarCache>) -> Self {
        LocalBarCache {
            root,
            stats: SimpleStats::new("local-bar-cache"),
            fallback,
            persist_lock: AsyncMutex::new(()),
        }
    }
}

#[async_trait]
impl BarCache for LocalBarCache {
    async fn get_day(&self, criteria: &BarCriteria, day_paths: &[String]) -> Result<Vec<Bar>, Error> {
        let key = create_bar_path(criteria.period, &criteria.symbol, &day_paths[0])?;
        let file_path = self.root.join(&key);

        if file_path.exists() {
            let bytes = tokio::fs::read(&file_path)
                .await
                .map_err(|e| Error::with_source(Kind::Io, "failed to read cached bar file", e))?;
            self.stats.increment(HIT);
            return decode_bars(&bytes);
        }

        self.stats.increment(MISS);
        let bars = self.fallback.get_day(criteria, day_paths).await?;

        let _guard = self.persist_lock.lock().await;
        if !file_path.exists() {
            if let Err(e) = persist_bars(&file_path, &bars).await {
                tracing::warn!(error = %e, key, "failed to persist day of bars to local cache");
            }
        }

        Ok(bars)
    }

    fn stats(&self) -> StatsNode {
        StatsNode::Leaf(self.stats.clone())
    }
}

async fn persist_bars(file_path: &std::path::Path, bars: &[Bar]) -> Result<(), Error> {
    if let Some(parent) = file_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::with_source(Kind::Io, "failed to create bar cache directories", e))?;
    }
    let bytes = encode_bars(bars)?;
    let tmp_path = file_path.with_extension("tmp-write");
    tokio::fs::write(&tmp_path, &bytes)
        .await
        .map_err(|e| Error::with_source(Kind::Io, "failed to write temp bar cache file", e))?;
    tokio::fs::rename(&tmp_path, file_path)
        .await
        .map_err(|e| Error::with_source(Kind::Io, "failed to rename temp bar cache file into place", e))?;
    Ok(())
}

/// Object-storage bar tier.
pub struct S3BarCache {
    bucket: String,
    store: Arc<dyn ObjectStore>,
    stats: Arc<SimpleStats>,
    fallback: Arc<dyn BarCache>,
    persist_lock: AsyncMutex<()>,
}

impl S3BarCache {
    pub fn new(bucket: impl Into<String>, store: Arc<dyn ObjectStore>, fallback: Arc<dyn BarCache>) -> Self {
        S3BarCache {
            bucket: bucket.into(),
            store,
            stats: SimpleStats::new("s3-bar-cache"),
            fallback,
            persist_lock: AsyncMutex::new(()),
        }
    }
}

#[async_trait]
impl BarCache for S3BarCache {
    async fn get_day(&self, criteria: &BarCriteria, day_paths: &[String]) -> Result<Vec<Bar>, Error> {
        let key = create_bar_path(criteria.period, &criteria.symbol, &day_paths[0])?;

        if self.store.head(&self.bucket, &key).await? {
            if let Some(bytes) = self.store.get(&self.bucket, &key).await? {
                self.stats.increment(HIT);
                return decode_bars(&bytes);
            }
        }

        self.stats.increment(MISS);
        let bars = self.fallback.get_day(criteria, day_paths).await?;

        let _guard = self.persist_lock.lock().await;
        if !self.store.head(&self.bucket, &key).await? {
            let bytes = encode_bars(&bars)?;
            let len = bytes.len();
            if let Err(e) = self
                .store
                .put(&self.bucket, &key, bytes::Bytes::from(bytes), "application/json", &key, len)
                .await
            {
                tracing::warn!(error = %e, key, "failed to persist day of bars to S3 cache");
            }
        }

        Ok(bars)
    }

    fn stats(&self) -> StatsNode {
        StatsNode::Leaf(self.stats.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_path_anchored_on_first_hour_of_day() {
        let path = create_bar_path(Period::H1, "EURUSD", "EURUSD/2020/00/02/00h_ticks.bi5").unwrap();
        assert_eq!(path, "bars/H1/EURUSD/2020/00/02.json");
    }

    #[test]
    fn parses_hour_from_vendor_path() {
        let hour = parse_hour_from_path("EURUSD/2020/11/31/23h_ticks.bi5").unwrap();
        assert_eq!(hour.year(), 2020);
        assert_eq!(hour.month() as u8, 12);
        assert_eq!(hour.day(), 31);
        assert_eq!(hour.hour(), 23);
    }

    #[test]
    fn bar_json_round_trips() {
        let bar = Bar::new(0, StreamId::REALTIME, Period::H1, "EURUSD", 100, 110, 90, 105, Origin::Historical).unwrap();
        let bytes = encode_bars(std::slice::from_ref(&bar)).unwrap();
        let decoded = decode_bars(&bytes).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0], bar);
    }
}
