//! Stream composition primitives: generic adapters over `futures::Stream`
//! that the search engine and primer build on, kept free of any
//! Dukascopy-specific fetching logic.
//!
//! `tick_to_bar` is lazy-on-first-poll: nothing is fed to the aggregator
//! until the returned stream is actually polled, via `stream::unfold`
//! pulling one upstream item at a time. Note this still holds one
//! in-flight bar per partition key for the stream's lifetime; a caller
//! aggregating an unbounded number of distinct partitions in one stream
//! would grow that state unboundedly (Design Notes, §9).

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::aggregator::TickBarAggregator;
use crate::error::Error;
use crate::json_array;
use crate::model::{Bar, Period, Tick};

/// Turns an already-materialized list into a stream, the simplest producer
/// in this layer.
pub fn from_list<T: Send + 'static>(items: Vec<T>) -> impl Stream<Item = T> {
    stream::iter(items)
}

/// Lazily concatenates several tick streams into one, in order. Built on
/// `stream::iter(...).flatten()` so later streams aren't touched until the
/// earlier ones are exhausted.
pub fn combine<S>(streams: Vec<S>) -> impl Stream<Item = Tick>
where
    S: Stream<Item = Tick> + Send + 'static,
{
    stream::iter(streams).flatten()
}

/// Calls `visitor` once per item as it passes through, without otherwise
/// altering the stream. The closure-based "visitor" shape used throughout
/// this crate rather than a dedicated trait (Design Notes, §9).
pub fn with_visitor<S, T>(source: S, mut visitor: impl FnMut(&T) + Send + 'static) -> impl Stream<Item = T>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
{
    source.map(move |item| {
        visitor(&item);
        item
    })
}

struct AggregateState<S> {
    ticks: S,
    pending: VecDeque<Bar>,
    aggregator: Arc<TickBarAggregator>,
    upstream_done: bool,
}

/// Adapts an ordered tick stream into the bars it completes, via the
/// online aggregator for `period`. The final in-flight bars are emitted
/// once the upstream stream ends.
pub fn tick_to_bar<S>(ticks: S, period: Period) -> impl Stream<Item = Bar>
where
    S: Stream<Item = Tick> + Unpin + Send + 'static,
{
    let state = AggregateState {
        ticks,
        pending: VecDeque::new(),
        aggregator: Arc::new(TickBarAggregator::new(period)),
        upstream_done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(bar) = state.pending.pop_front() {
                return Some((bar, state));
            }
            if state.upstream_done {
                return None;
            }
            match state.ticks.next().await {
                Some(tick) => {
                    let mut pending = std::mem::take(&mut state.pending);
                    state.aggregator.feed_tick(&tick, &mut |bar: Bar| pending.push_back(bar));
                    state.pending = pending;
                }
                None => {
                    state.upstream_done = true;
                    let mut pending = std::mem::take(&mut state.pending);
                    state.aggregator.load_end(&mut |bar: Bar| pending.push_back(bar));
                    state.pending = pending;
                }
            }
        }
    })
}

/// Decodes a JSON array payload into a stream of its elements. Decoding
/// itself is eager (see [`json_array::decode_array`]); this only spares
/// callers from threading a `Vec` through the rest of a stream pipeline.
pub fn from_json_array<T: DeserializeOwned + Send + 'static>(bytes: Bytes) -> Result<impl Stream<Item = T>, Error> {
    let items: Vec<T> = json_array::decode_array(&bytes, None)?;
    Ok(stream::iter(items))
}

/// Drains a stream into a JSON array payload.
pub async fn to_json_array<S, T>(mut source: S) -> Result<Vec<u8>, Error>
where
    S: Stream<Item = T> + Unpin,
    T: Serialize,
{
    let mut items = Vec::new();
    while let Some(item) = source.next().await {
        items.push(item);
    }
    let mut out = Vec::new();
    json_array::encode_array(&items, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Origin, StreamId};

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

    #[tokio::test]
    async fn combine_concatenates_streams_in_order() {
        let a = from_list(vec![tick(0, 100)]);
        let b = from_list(vec![tick(1_000, 110)]);
        let combined: Vec<Tick> = combine(vec![a, b]).collect().await;
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[0].time_millis, 0);
        assert_eq!(combined[1].time_millis, 1_000);
    }

    #[tokio::test]
    async fn tick_to_bar_emits_after_crossing_grid_boundary() {
        let ticks = from_list(vec![tick(0, 100), tick(5 * 60_000, 200)]);
        let bars: Vec<Bar> = Box::pin(tick_to_bar(Box::pin(ticks), Period::M5)).collect().await;
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].start_millis, 0);
        assert_eq!(bars[1].start_millis, 5 * 60_000);
    }

    #[tokio::test]
    async fn visitor_observes_every_item_without_altering_the_stream() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let ticks = from_list(vec![tick(0, 100), tick(1_000, 110)]);
        let visited: Vec<Tick> = with_visitor(ticks, move |t: &Tick| {
            seen_clone.lock().unwrap().push(t.time_millis)
        })
        .collect()
        .await;

        assert_eq!(visited.len(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1_000]);
    }
}
