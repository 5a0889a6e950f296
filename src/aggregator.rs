//! Online, partition-keyed tick-to-bar aggregator: consumes an ordered
//! tick stream and emits completed bars as tick time advances past period
//! boundaries. One in-flight bar is kept per `(stream, symbol)` partition
//! key, all at the same configured period.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::model::{Bar, Origin, Period, StreamId, Tick};

/// Receives bars as the aggregator completes them, plus an end-of-load
/// `flush` hook. A plain `FnMut(Bar)` closure works too (blanket impl
/// below) for callers that don't care about the flush hook.
pub trait BarNotifier {
    fn on_bar(&mut self, bar: Bar);
    fn flush(&mut self) {}
}

impl<F: FnMut(Bar)> BarNotifier for F {
    fn on_bar(&mut self, bar: Bar) {
        self(bar)
    }
}

/// Selects which tick price feeds bar OHLC. Defaults to bid-only, per
/// spec; exposed as a hook for callers who want ask or mid-price
/// aggregation (Open Question #2).
pub type PriceSelector = fn(&Tick) -> i64;

pub fn bid_price(tick: &Tick) -> i64 {
    tick.bid
}

struct InFlightBar {
    start_millis: i64,
    end_millis_inclusive: i64,
    period: Period,
    open: i64,
    high: i64,
    low: i64,
    close: i64,
    source_agg: Origin,
    stream_id: StreamId,
    symbol: String,
}

impl InFlightBar {
    fn start(tick: &Tick, time_index: i64, duration: i64, period: Period, price: i64) -> Self {
        let start_millis = time_index * duration;
        InFlightBar {
            start_millis,
            end_millis_inclusive: start_millis + duration - 1,
            period,
            open: price,
            high: price,
            low: price,
            close: price,
            source_agg: tick.origin,
            stream_id: tick.stream_id,
            symbol: tick.symbol.clone(),
        }
    }

    fn fold(&mut self, tick: &Tick, price: i64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.source_agg = self.source_agg.combine(tick.origin);
    }

    fn into_bar(self) -> Bar {
        Bar::new(
            self.start_millis,
            self.stream_id,
            self.period,
            self.symbol,
            self.open,
            self.high,
            self.low,
            self.close,
            self.source_agg,
        )
        .expect("aggregator maintains the bar invariants by construction")
    }
}

/// Online tick-to-bar aggregator for a single configured period.
pub struct TickBarAggregator {
    period: Period,
    price_selector: PriceSelector,
    partitions: RwLock<HashMap<String, InFlightBar>>,
}

impl TickBarAggregator {
    pub fn new(period: Period) -> Self {
        TickBarAggregator::with_price_selector(period, bid_price)
    }

    pub fn with_price_selector(period: Period, price_selector: PriceSelector) -> Self {
        TickBarAggregator {
            period,
            price_selector,
            partitions: RwLock::new(HashMap::new()),
        }
    }

    pub fn period(&self) -> Period {
        self.period
    }

    /// Feeds one tick. Callers must feed a single partition's ticks in
    /// non-decreasing timestamp order from a single thread; the partition
    /// map itself is safe to share across partitions.
    pub fn feed_tick(&self, tick: &Tick, notifier: &mut impl BarNotifier) {
        let key = tick.partition_key();
        let duration = self.period.duration_millis();
        let time_index = tick.time_millis.div_euclid(duration);
        let price = (self.price_selector)(tick);

        let mut partitions = self.partitions.write().unwrap();
        match partitions.get_mut(&key) {
            None => {
                partitions.insert(
                    key,
                    InFlightBar::start(tick, time_index, duration, self.period, price),
                );
            }
            Some(inflight) => {
                if tick.time_millis > inflight.end_millis_inclusive {
                    let completed =
                        std::mem::replace(inflight, InFlightBar::start(tick, time_index, duration, self.period, price));
                    drop(partitions);
                    notifier.on_bar(completed.into_bar());
                    return;
                }
                inflight.fold(tick, price);
            }
        }
    }

    /// Emits every remaining in-flight bar, then calls the notifier's
    /// `flush()` hook. Call once after the source tick stream is
    /// exhausted.
    pub fn load_end(&self, notifier: &mut impl BarNotifier) {
        let mut partitions = self.partitions.write().unwrap();
        let mut keys: Vec<String> = partitions.keys().cloned().collect();
        keys.sort();
        let drained: Vec<InFlightBar> = keys
            .into_iter()
            .filter_map(|key| partitions.remove(&key))
            .collect();
        drop(partitions);

        for inflight in drained {
            notifier.on_bar(inflight.into_bar());
        }
        notifier.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Period;

    fn tick(time_millis: i64, bid: i64) -> Tick {
        Tick {
            time_millis,
            symbol: "EURUSD".to_string(),
            stream_id: StreamId::REALTIME,
            bid,
            ask: bid + 1,
            bid_volume: 1.0,
            ask_volume: 1.0,
            origin: Origin::Live,
        }
    }

    #[test]
    fn folds_ticks_within_the_same_bar() {
        let aggregator = TickBarAggregator::new(Period::M5);
        let mut bars = Vec::new();

        aggregator.feed_tick(&tick(0, 100), &mut |b: Bar| bars.push(b));
        aggregator.feed_tick(&tick(1_000, 110), &mut |b: Bar| bars.push(b));
        aggregator.feed_tick(&tick(2_000, 90), &mut |b: Bar| bars.push(b));
        assert!(bars.is_empty());

        aggregator.load_end(&mut |b: Bar| bars.push(b));
        assert_eq!(bars.len(), 1);
        let bar = &bars[0];
        assert_eq!(bar.open, 100);
        assert_eq!(bar.high, 110);
        assert_eq!(bar.low, 90);
        assert_eq!(bar.close, 90);
    }

    #[test]
    fn emits_a_bar_when_time_crosses_the_grid_boundary() {
        let aggregator = TickBarAggregator::new(Period::M5);
        let mut bars = Vec::new();

        aggregator.feed_tick(&tick(0, 100), &mut |b: Bar| bars.push(b));
        aggregator.feed_tick(&tick(5 * 60_000, 200), &mut |b: Bar| bars.push(b));

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].start_millis, 0);
        assert_eq!(bars[0].close, 100);

        aggregator.load_end(&mut |b: Bar| bars.push(b));
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].start_millis, 5 * 60_000);
    }

    #[test]
    fn missing_grid_slots_are_skipped_not_synthesized() {
        let aggregator = TickBarAggregator::new(Period::M5);
        let mut bars = Vec::new();

        aggregator.feed_tick(&tick(0, 100), &mut |b: Bar| bars.push(b));
        // Skip ahead 3 grid cells with no ticks in between.
        aggregator.feed_tick(&tick(15 * 60_000, 200), &mut |b: Bar| bars.push(b));
        aggregator.load_end(&mut |b: Bar| bars.push(b));

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].start_millis, 0);
        assert_eq!(bars[1].start_millis, 15 * 60_000);
    }

    #[test]
    fn historical_origin_contaminates_the_bar() {
        let aggregator = TickBarAggregator::new(Period::M5);
        let mut bars = Vec::new();

        let mut live_tick = tick(0, 100);
        live_tick.origin = Origin::Live;
        let mut historical_tick = tick(1_000, 110);
        historical_tick.origin = Origin::Historical;

        aggregator.feed_tick(&live_tick, &mut |b: Bar| bars.push(b));
        aggregator.feed_tick(&historical_tick, &mut |b: Bar| bars.push(b));
        aggregator.load_end(&mut |b: Bar| bars.push(b));

        assert_eq!(bars[0].origin, Origin::Historical);
    }
}
