//! Top-level query engine: turns `(symbol, window)` requests into ordered
//! ticks or bars, and implements the count-based forward/backward window
//! extension used when a caller wants "the next N bars" rather than a
//! fixed calendar window.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use time::{Duration, OffsetDateTime};

use crate::cache::bar_cache::BarCache;
use crate::cache::byte_cache::ByteCache;
use crate::decoder::TickDecoder;
use crate::error::Error;
use crate::market_status::MarketStatusOracle;
use crate::model::{
    floor_to_hour, format_instant, BarCriteria, Bar, Origin, Period, StreamId, Tick, TickCriteria,
};
use crate::path_generator::{generate_day_grouped_paths, vendor_path};

/// Default lower bound: the vendor's archive does not meaningfully extend
/// earlier than this. Mutable so integration callers working with a
/// different data source can relax it.
fn default_beginning_of_time() -> OffsetDateTime {
    time::macros::datetime!(2020-01-01 00:00:00 UTC)
}

/// Size of one forward/backward extension iteration, in calendar days.
const EXTENSION_CHUNK_DAYS: i64 = 7;

/// Consecutive empty extension iterations tolerated before giving up
/// (Open Question #3).
const MAX_EMPTY_EXTENSION_ITERATIONS: u32 = 2;

pub struct SearchEngine {
    byte_cache: Arc<dyn ByteCache>,
    bar_cache: Arc<dyn BarCache>,
    decoder: Arc<dyn TickDecoder>,
    market_status: MarketStatusOracle,
    stream_id: StreamId,
    beginning_of_time: RwLock<OffsetDateTime>,
}

impl SearchEngine {
    pub fn new(
        byte_cache: Arc<dyn ByteCache>,
        bar_cache: Arc<dyn BarCache>,
        decoder: Arc<dyn TickDecoder>,
        stream_id: StreamId,
    ) -> Self {
        SearchEngine {
            byte_cache,
            bar_cache,
            decoder,
            market_status: MarketStatusOracle::new(),
            stream_id,
            beginning_of_time: RwLock::new(default_beginning_of_time()),
        }
    }

    pub fn beginning_of_time(&self) -> OffsetDateTime {
        *self.beginning_of_time.read().unwrap()
    }

    pub fn set_beginning_of_time(&self, instant: OffsetDateTime) {
        *self.beginning_of_time.write().unwrap() = instant;
    }

    fn validate_after_beginning(&self, field: &str, instant: OffsetDateTime) -> Result<(), Error> {
        let bound = self.beginning_of_time();
        if instant < bound {
            return Err(Error::invalid_argument(format!(
                "{field} {} must be after {}",
                format_instant(instant),
                format_instant(bound)
            )));
        }
        Ok(())
    }

    /// Ordered ticks for `[start, end]`, optionally calling `visitor` once
    /// per decoded tick as it is produced.
    pub async fn search(
        &self,
        symbol: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
        mut visitor: Option<&mut dyn FnMut(&Tick)>,
    ) -> Result<Vec<Tick>, Error> {
        self.validate_after_beginning("Start", start)?;
        let criteria = TickCriteria::new(symbol, start, end)?;

        let ticks = self.fetch_ticks_for_window(&criteria.symbol, criteria.start, criteria.end).await?;
        if let Some(v) = visitor.as_deref_mut() {
            for tick in &ticks {
                v(tick);
            }
        }
        Ok(ticks)
    }

    async fn fetch_ticks_for_window(
        &self,
        symbol: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Tick>, Error> {
        let start_millis = (start.unix_timestamp_nanos() / 1_000_000) as i64;
        let end_millis = (end.unix_timestamp_nanos() / 1_000_000) as i64;

        let mut hour = floor_to_hour(start);
        let last_hour = floor_to_hour(end);
        let mut ticks = Vec::new();

        while hour <= last_hour {
            if self.market_status.is_open(hour) {
                let path = vendor_path(symbol, hour);
                let bytes = self.byte_cache.get(&path).await?;
                let decoded = self.decoder.decode(&bytes, symbol, hour, self.stream_id, Origin::Historical)?;
                ticks.extend(decoded.into_iter().filter(|t| t.time_millis >= start_millis && t.time_millis <= end_millis));
            }
            hour += Duration::hours(1);
        }

        ticks.sort();
        Ok(ticks)
    }

    /// Bars for `[start, end]`, computed day-by-day through the bar cache
    /// chain and trimmed to the requested window.
    pub async fn aggregate_from_ticks(
        &self,
        symbol: &str,
        period: Period,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Bar>, Error> {
        self.validate_after_beginning("Start", start)?;
        let criteria = BarCriteria::new(symbol, period, start, end)?;

        let days = generate_day_grouped_paths(&criteria.symbol, criteria.day_start, criteria.day_end);
        if days.len() as i64 != criteria.num_days {
            return Err(Error::illegal_state(format!(
                "day-grouped path count {} does not match criteria span {}",
                days.len(),
                criteria.num_days
            )));
        }

        let mut bars = Vec::new();
        for day_paths in &days {
            let day_bars = self.bar_cache.get_day(&criteria, day_paths).await?;
            bars.extend(day_bars);
        }

        let start_millis = (criteria.start.unix_timestamp_nanos() / 1_000_000) as i64;
        let end_millis = (criteria.end.unix_timestamp_nanos() / 1_000_000) as i64;
        bars.retain(|b| b.start_millis >= start_millis && b.start_millis <= end_millis);

        let max_allowed = period.periods_in(Period::D1) * criteria.num_days;
        if (bars.len() as i64) > max_allowed {
            return Err(Error::illegal_state(format!("Unexpected number of bars {}", bars.len())));
        }

        bars.sort();
        Ok(bars)
    }

    /// The `count` bars starting at or after `anchor`, expanding the search
    /// window one week at a time until `count` is reached.
    pub async fn extend_forward(&self, symbol: &str, period: Period, anchor: OffsetDateTime, count: usize) -> Result<Vec<Bar>, Error> {
        self.validate_after_beginning("Anchor", anchor)?;
        let anchor_millis = (anchor.unix_timestamp_nanos() / 1_000_000) as i64;

        let mut collected: BTreeMap<i64, Bar> = BTreeMap::new();
        let mut window_start = anchor;
        let mut empty_iterations: u32 = 0;

        while collected.len() < count {
            let window_end = window_start + Duration::days(EXTENSION_CHUNK_DAYS);
            let bars = self.aggregate_from_ticks(symbol, period, window_start, window_end).await?;

            let before = collected.len();
            for bar in bars {
                if bar.start_millis >= anchor_millis {
                    collected.insert(bar.start_millis, bar);
                }
            }

            if collected.len() == before {
                empty_iterations += 1;
                if empty_iterations >= MAX_EMPTY_EXTENSION_ITERATIONS {
                    return Err(Error::exhausted(format!(
                        "could not collect {count} bars forward from {anchor}, found only {before}"
                    )));
                }
            } else {
                empty_iterations = 0;
            }

            window_start = window_end;
        }

        Ok(collected.into_values().take(count).collect())
    }

    /// The `count` bars ending at or before `anchor`, expanding the search
    /// window one week at a time backward until `count` is reached.
    pub async fn extend_backward(&self, symbol: &str, period: Period, anchor: OffsetDateTime, count: usize) -> Result<Vec<Bar>, Error> {
        let anchor_millis = (anchor.unix_timestamp_nanos() / 1_000_000) as i64;
        let bound = self.beginning_of_time();

        let mut collected: BTreeMap<i64, Bar> = BTreeMap::new();
        let mut window_end = anchor;
        let mut empty_iterations: u32 = 0;

        while collected.len() < count {
            let window_start = (window_end - Duration::days(EXTENSION_CHUNK_DAYS)).max(bound);
            let bars = self.aggregate_from_ticks(symbol, period, window_start, window_end).await?;

            let before = collected.len();
            for bar in bars {
                if bar.start_millis <= anchor_millis {
                    collected.insert(bar.start_millis, bar);
                }
            }

            if window_start <= bound {
                if collected.len() < count {
                    return Err(Error::exhausted(format!(
                        "could not collect {count} bars backward from {anchor}, found only {}",
                        collected.len()
                    )));
                }
                break;
            }

            if collected.len() == before {
                empty_iterations += 1;
                if empty_iterations >= MAX_EMPTY_EXTENSION_ITERATIONS {
                    return Err(Error::exhausted(format!(
                        "could not collect {count} bars backward from {anchor}, found only {before}"
                    )));
                }
            } else {
                empty_iterations = 0;
            }

            window_end = window_start;
        }

        let mut bars: Vec<Bar> = collected.into_values().collect();
        bars.reverse();
        bars.truncate(count);
        bars.reverse();
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use time::macros::datetime;

    use crate::cache::bar_cache::BarCache;
    use crate::stats::{SimpleStats, StatsNode};

    #[test]
    fn beginning_of_time_defaults_to_2020() {
        assert_eq!(default_beginning_of_time(), time::macros::datetime!(2020-01-01 00:00:00 UTC));
    }

    struct UnusedByteCache;
    #[async_trait]
    impl ByteCache for UnusedByteCache {
        async fn get(&self, _path: &str) -> Result<Bytes, Error> {
            unreachable!("not exercised by this test")
        }
        fn stats(&self) -> StatsNode {
            StatsNode::Leaf(SimpleStats::new("unused"))
        }
    }

    struct UnusedBarCache;
    #[async_trait]
    impl BarCache for UnusedBarCache {
        async fn get_day(&self, _criteria: &BarCriteria, _day_paths: &[String]) -> Result<Vec<Bar>, Error> {
            unreachable!("not exercised by this test")
        }
        fn stats(&self) -> StatsNode {
            StatsNode::Leaf(SimpleStats::new("unused"))
        }
    }

    struct UnusedDecoder;
    impl TickDecoder for UnusedDecoder {
        fn decode(
            &self,
            _bytes: &[u8],
            _symbol: &str,
            _hour_start: OffsetDateTime,
            _stream_id: StreamId,
            _origin: Origin,
        ) -> Result<Vec<Tick>, Error> {
            unreachable!("not exercised by this test")
        }
    }

    fn test_engine() -> SearchEngine {
        SearchEngine::new(
            Arc::new(UnusedByteCache),
            Arc::new(UnusedBarCache),
            Arc::new(UnusedDecoder),
            StreamId::REALTIME,
        )
    }

    #[test]
    fn beginning_of_time_rejection_message_matches_spec_literal() {
        let engine = test_engine();
        let err = engine
            .validate_after_beginning("Start", datetime!(2009-01-02 00:59:59 UTC))
            .unwrap_err();
        assert_eq!(
            err.message,
            "Start 2009-01-02T00:59:59Z must be after 2020-01-01T00:00:00Z"
        );
    }
}
