use dukascopy_rs::config::{CacheConfig, FetcherConfig};
use dukascopy_rs::{DukascopyService, Period};
use time::macros::datetime;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let service = DukascopyService::local(FetcherConfig::default(), CacheConfig::default());

    let symbol = "EURGBP";
    let start = datetime!(2020-03-12 13:00:00 UTC);
    let end = datetime!(2020-03-12 15:00:00 UTC);

    service.prime(symbol, start, end);
    service.wait_for_priming().await;

    match service.search_ticks(symbol, start, end).await {
        Ok(ticks) => {
            for tick in &ticks {
                let serialized = serde_json::to_string(tick).unwrap();
                println!("{serialized}");
                println!("{tick}");
            }
        }
        Err(error) => eprintln!("tick search failed: {error}"),
    }

    match service.search_bars(symbol, Period::M5, start, end).await {
        Ok(bars) => {
            for bar in &bars {
                println!("{bar}");
            }
        }
        Err(error) => eprintln!("bar aggregation failed: {error}"),
    }

    println!("{}", service.stats().cache_stats());
}
