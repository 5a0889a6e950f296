//! Maps `(symbol, time window)` to the ordered vendor archive paths that
//! cover it, filtered to market-open hours.
//!
//! Grounded on the teacher's `DukascopyService::generate_tick_download_url`
//! (`{base_url}/{instrument}/{year}/{month:02}/{day:02}/{hour:02}h_ticks.bi5`),
//! generalized into a standalone generator shared by tick search and the
//! day-grouped bar cache key.

use time::{Duration, OffsetDateTime};

use crate::market_status::MarketStatusOracle;
use crate::model::floor_to_hour;

/// A single hourly vendor archive path, `HH0h_ticks.bi5`.
pub fn vendor_path(symbol: &str, hour_start: OffsetDateTime) -> String {
    let symbol = symbol.to_uppercase();
    let year = hour_start.year();
    // Month and hour are zero-indexed in the vendor's path scheme.
    let month0 = hour_start.month() as u8 - 1;
    let day = hour_start.day();
    let hour = hour_start.hour();
    format!("{symbol}/{year}/{month0:02}/{day:02}/{hour:02}h_ticks.bi5")
}

/// Ordered, market-filtered hourly paths covering `[start, end]` inclusive
/// of their containing hour.
pub fn generate_paths(
    market_status: &MarketStatusOracle,
    symbol: &str,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Vec<String> {
    hour_starts(start, end)
        .into_iter()
        .filter(|hour| market_status.is_open(*hour))
        .map(|hour| vendor_path(symbol, hour))
        .collect()
}

/// Day-grouped variant: each inner `Vec` holds the (always 24, unfiltered)
/// hourly paths of one UTC day covered by `[start, end]`.
pub fn generate_day_grouped_paths(
    symbol: &str,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Vec<Vec<String>> {
    let first_day = crate::model::floor_to_day(start);
    let last_day = crate::model::floor_to_day(end);
    let mut days = Vec::new();

    let mut day = first_day;
    while day <= last_day {
        let mut hours = Vec::with_capacity(24);
        for h in 0..24 {
            hours.push(vendor_path(symbol, day + Duration::hours(h)));
        }
        days.push(hours);
        day += Duration::days(1);
    }
    days
}

fn hour_starts(start: OffsetDateTime, end: OffsetDateTime) -> Vec<OffsetDateTime> {
    let first = floor_to_hour(start);
    let last = floor_to_hour(end);
    let mut hours = Vec::new();
    let mut hour = first;
    while hour <= last {
        hours.push(hour);
        hour += Duration::hours(1);
    }
    hours
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn vendor_path_zero_indexes_month_and_hour() {
        let path = vendor_path("eurusd", datetime!(2020-01-02 05:00:00 UTC));
        assert_eq!(path, "EURUSD/2020/00/02/05h_ticks.bi5");
    }

    #[test]
    fn december_is_month_eleven() {
        let path = vendor_path("EURUSD", datetime!(2020-12-31 23:00:00 UTC));
        assert_eq!(path, "EURUSD/2020/11/31/23h_ticks.bi5");
    }

    #[test]
    fn generate_paths_omits_closed_hours() {
        let oracle = MarketStatusOracle::new();
        // Saturday, entirely closed.
        let paths = generate_paths(
            &oracle,
            "EURUSD",
            datetime!(2020-01-04 00:00:00 UTC),
            datetime!(2020-01-04 23:00:00 UTC),
        );
        assert!(paths.is_empty());
    }

    #[test]
    fn day_grouped_paths_always_have_24_hours_per_day() {
        let days = generate_day_grouped_paths(
            "EURUSD",
            datetime!(2020-01-04 00:00:00 UTC),
            datetime!(2020-01-04 23:00:00 UTC),
        );
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].len(), 24);
    }
}
