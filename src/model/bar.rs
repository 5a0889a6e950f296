use std::cmp::Ordering;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::tick::{Origin, StreamId};

/// Bar aggregation period. Ordinal order (`M5 < M10 < ... < D1`) is the
/// order used when comparing bars of different periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Period {
    M5,
    M10,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Period {
    pub const ALL: [Period; 7] = [
        Period::M5,
        Period::M10,
        Period::M15,
        Period::M30,
        Period::H1,
        Period::H4,
        Period::D1,
    ];

    pub fn duration_millis(self) -> i64 {
        match self {
            Period::M5 => 5 * 60_000,
            Period::M10 => 10 * 60_000,
            Period::M15 => 15 * 60_000,
            Period::M30 => 30 * 60_000,
            Period::H1 => 60 * 60_000,
            Period::H4 => 4 * 60 * 60_000,
            Period::D1 => 24 * 60 * 60_000,
        }
    }

    /// How many of `self` fit inside one instance of `other`, e.g.
    /// `M5.periods_in(D1) == 288`, `H1.periods_in(D1) == 24`.
    pub fn periods_in(self, other: Period) -> i64 {
        other.duration_millis() / self.duration_millis()
    }

    pub fn name(self) -> &'static str {
        match self {
            Period::M5 => "M5",
            Period::M10 => "M10",
            Period::M15 => "M15",
            Period::M30 => "M30",
            Period::H1 => "H1",
            Period::H4 => "H4",
            Period::D1 => "D1",
        }
    }

    pub fn parse(name: &str) -> Result<Period, Error> {
        Period::ALL
            .into_iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| Error::invalid_argument(format!("unknown period {name}")))
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An immutable OHLC aggregate over one period, for one symbol and stream.
///
/// Equality is by `(start_millis, stream_id, period, symbol)`. Ordering is
/// `(stream type, symbol, period, start_millis, end_millis_inclusive)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub start_millis: i64,
    pub stream_id: StreamId,
    pub period: Period,
    pub symbol: String,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub origin: Origin,
}

impl Bar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        start_millis: i64,
        stream_id: StreamId,
        period: Period,
        symbol: impl Into<String>,
        open: i64,
        high: i64,
        low: i64,
        close: i64,
        origin: Origin,
    ) -> Result<Bar, Error> {
        let symbol = symbol.into();
        if start_millis % period.duration_millis() != 0 {
            return Err(Error::invalid_argument(format!(
                "start {start_millis} is not aligned to {period} grid"
            )));
        }
        if low < 1 || open < 1 || high < 1 || close < 1 {
            return Err(Error::invalid_argument(
                "open, high, low and close must all be >= 1",
            ));
        }
        if !(low <= open && open <= high && low <= close && close <= high && low <= high) {
            return Err(Error::invalid_argument(format!(
                "bar OHLC invariant violated: open={open} high={high} low={low} close={close}"
            )));
        }
        Ok(Bar {
            start_millis,
            stream_id,
            period,
            symbol,
            open,
            high,
            low,
            close,
            origin,
        })
    }

    pub fn end_millis_inclusive(&self) -> i64 {
        self.start_millis + self.period.duration_millis() - 1
    }

    /// `"<streamId>-<symbol>-<period>"`, the aggregator's partition key.
    pub fn partition_key(&self) -> String {
        format!("{}-{}-{}", self.stream_id, self.symbol, self.period)
    }

    /// Is `self` within `other`: same stream+symbol, `other`'s period is at
    /// least as coarse, and `other`'s span fully covers `self`'s span.
    pub fn is_within(&self, other: &Bar) -> bool {
        self.stream_id == other.stream_id
            && self.symbol == other.symbol
            && other.period >= self.period
            && other.start_millis <= self.start_millis
            && other.end_millis_inclusive() >= self.end_millis_inclusive()
    }
}

impl PartialEq for Bar {
    fn eq(&self, other: &Self) -> bool {
        self.start_millis == other.start_millis
            && self.stream_id == other.stream_id
            && self.period == other.period
            && self.symbol == other.symbol
    }
}
impl Eq for Bar {}

fn stream_type_rank(id: StreamId) -> u8 {
    if id.is_realtime() {
        0
    } else {
        1
    }
}

impl PartialOrd for Bar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bar {
    fn cmp(&self, other: &Self) -> Ordering {
        stream_type_rank(self.stream_id)
            .cmp(&stream_type_rank(other.stream_id))
            .then_with(|| self.symbol.cmp(&other.symbol))
            .then_with(|| self.period.cmp(&other.period))
            .then_with(|| self.start_millis.cmp(&other.start_millis))
            .then_with(|| self.end_millis_inclusive().cmp(&other.end_millis_inclusive()))
    }
}

impl Display for Bar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} O:{} H:{} L:{} C:{}",
            self.symbol, self.period, self.start_millis, self.open, self.high, self.low, self.close
        )
    }
}
