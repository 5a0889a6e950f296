//! Configuration knobs for the rate-limited fetcher and local cache tier.
//! Defaults match §4.E / §6 of the specification; each can be overridden
//! programmatically or (for the local cache root) via environment
//! variable, following the teacher's plain-`std::env` style.

/// Recognized options for the [`RateLimitedFetcher`](crate::fetcher::RateLimitedFetcher).
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub permits_per_second: f64,
    pub retry_seconds: f64,
    pub retry_count: u32,
    pub rate_limited_marker: String,
    pub base_url: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        FetcherConfig {
            permits_per_second: 3.0,
            retry_seconds: 30.0,
            retry_count: 3,
            rate_limited_marker: "503".to_string(),
            base_url: "https://datafeed.dukascopy.com/datafeed/".to_string(),
        }
    }
}

impl FetcherConfig {
    /// Ensures `base_url` carries the vendor-required trailing slash.
    pub fn normalized_base_url(&self) -> String {
        if self.base_url.ends_with('/') {
            self.base_url.clone()
        } else {
            format!("{}/", self.base_url)
        }
    }
}

/// Local filesystem cache tier configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub local_cache_dir: std::path::PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let dir = std::env::var("localCacheDir")
            .ok()
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                std::path::PathBuf::from(home).join(".dukascopy-cache")
            });
        CacheConfig {
            local_cache_dir: dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let config = FetcherConfig {
            base_url: "https://example.com/datafeed".to_string(),
            ..Default::default()
        };
        assert_eq!(config.normalized_base_url(), "https://example.com/datafeed/");
    }

    #[test]
    fn defaults_match_spec() {
        let config = FetcherConfig::default();
        assert_eq!(config.permits_per_second, 3.0);
        assert_eq!(config.retry_seconds, 30.0);
        assert_eq!(config.retry_count, 3);
        assert_eq!(config.rate_limited_marker, "503");
    }
}
