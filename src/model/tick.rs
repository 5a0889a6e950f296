use std::cmp::Ordering;
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::Error;

/// Identity of the stream a tick or bar belongs to. The all-zero UUID
/// designates the realtime stream; any other value is a backtest stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub Uuid);

impl StreamId {
    pub const REALTIME: StreamId = StreamId(Uuid::nil());

    pub fn is_realtime(self) -> bool {
        self.0.is_nil()
    }
}

impl Default for StreamId {
    fn default() -> Self {
        StreamId::REALTIME
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a tick or bar originated. Combining two sources is "contaminating":
/// any `Historical` input makes the result `Historical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Live,
    Historical,
}

impl Origin {
    pub fn combine(self, other: Origin) -> Origin {
        if self == Origin::Historical || other == Origin::Historical {
            Origin::Historical
        } else {
            Origin::Live
        }
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Live => write!(f, "Live"),
            Origin::Historical => write!(f, "Historical"),
        }
    }
}

/// An immutable market quote.
///
/// Equality is by `(time_millis, stream_id, symbol)` only — prices, volumes
/// and origin do not participate. Ordering is `(stream type, symbol,
/// time_millis)` where "stream type" groups the realtime stream ahead of
/// any backtest stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub time_millis: i64,
    pub symbol: String,
    pub stream_id: StreamId,
    /// Vendor-quote points, no fractional pips.
    pub bid: i64,
    pub ask: i64,
    /// Millions of units.
    pub bid_volume: f32,
    pub ask_volume: f32,
    pub origin: Origin,
}

impl Tick {
    pub fn new(
        time_millis: i64,
        symbol: impl Into<String>,
        stream_id: StreamId,
        bid: i64,
        ask: i64,
        bid_volume: f32,
        ask_volume: f32,
        origin: Origin,
    ) -> Result<Tick, Error> {
        let symbol = symbol.into();
        if symbol.len() < 6 {
            return Err(Error::invalid_argument(format!(
                "symbol {symbol} must be at least 6 characters"
            )));
        }
        if time_millis < 0 {
            return Err(Error::invalid_argument(format!(
                "time_millis {time_millis} must be >= 0"
            )));
        }
        if bid < 1 || ask < 1 {
            return Err(Error::invalid_argument(format!(
                "bid {bid} and ask {ask} must be >= 1"
            )));
        }
        if bid_volume < 0.0 || ask_volume < 0.0 {
            return Err(Error::invalid_argument(
                "bid_volume and ask_volume must be >= 0",
            ));
        }
        Ok(Tick {
            time_millis,
            symbol,
            stream_id,
            bid,
            ask,
            bid_volume,
            ask_volume,
            origin,
        })
    }

    pub fn instant(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp_nanos(self.time_millis as i128 * 1_000_000)
            .expect("tick time_millis out of range")
    }

    /// `"<streamId>-<symbol>"`, the aggregator's partition key for this tick.
    pub fn partition_key(&self) -> String {
        format!("{}-{}", self.stream_id, self.symbol)
    }
}

impl PartialEq for Tick {
    fn eq(&self, other: &Self) -> bool {
        self.time_millis == other.time_millis
            && self.stream_id == other.stream_id
            && self.symbol == other.symbol
    }
}
impl Eq for Tick {}

fn stream_type_rank(id: StreamId) -> u8 {
    if id.is_realtime() {
        0
    } else {
        1
    }
}

impl PartialOrd for Tick {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tick {
    fn cmp(&self, other: &Self) -> Ordering {
        stream_type_rank(self.stream_id)
            .cmp(&stream_type_rank(other.stream_id))
            .then_with(|| self.symbol.cmp(&other.symbol))
            .then_with(|| self.time_millis.cmp(&other.time_millis))
    }
}

impl Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let date_time = self.instant();
        write!(
            f,
            "{} {}\t\t{:<10} {:<10} {:<16} {:<16}",
            date_time.date(),
            date_time.time(),
            self.ask,
            self.bid,
            self.ask_volume,
            self.bid_volume
        )
    }
}
