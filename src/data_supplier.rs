use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Kind};

/// An interface used by the [`RateLimitedFetcher`](crate::fetcher::RateLimitedFetcher)
/// to fetch the raw bytes behind a vendor path, independent of transport.
#[async_trait]
pub trait DataSupplier: Send + Sync {
    /// Fetches the data at `url`. `Ok(None)` means "no such resource"
    /// (a 404, or an empty body) which the caller treats as an empty
    /// archive rather than an error.
    async fn fetch(&self, url: &str) -> Result<Option<Bytes>, Error>;
}

pub(crate) struct ReqwestDataSupplier {
    client: reqwest::Client,
}

impl ReqwestDataSupplier {
    pub fn new() -> Self {
        ReqwestDataSupplier {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DataSupplier for ReqwestDataSupplier {
    async fn fetch(&self, url: &str) -> Result<Option<Bytes>, Error> {
        let response = self.client.get(url).send().await;

        match response {
            Ok(resp) if resp.status().as_u16() == 404 => Ok(None),
            Ok(resp) if !resp.status().is_success() => Err(Error::new(
                Kind::Transient,
                format!("vendor returned status {}", resp.status()),
            )),
            Ok(resp) => match resp.bytes().await {
                Ok(bytes) if bytes.is_empty() => Ok(None),
                Ok(bytes) => Ok(Some(bytes)),
                Err(error) => Err(Error::with_source(Kind::Io, "failed reading response body", error)),
            },
            Err(error) if error.status().map(|s| s.as_u16()) == Some(404) => Ok(None),
            Err(error) => Err(Error::with_source(Kind::Io, "network request failed", error)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;

    use super::DataSupplier;
    use crate::error::Error;

    pub struct InMemoryDataSupplier {
        pub data: Option<Bytes>,
    }

    #[async_trait]
    impl DataSupplier for InMemoryDataSupplier {
        async fn fetch(&self, _url: &str) -> Result<Option<Bytes>, Error> {
            Ok(self.data.clone())
        }
    }

    /// Returns a configured `Transient` error the first `fail_times`
    /// calls, then delegates to `data` for all subsequent calls. Used to
    /// exercise the fetcher's retry policy.
    pub struct FlakyDataSupplier {
        pub fail_times: std::sync::atomic::AtomicUsize,
        pub error_message: String,
        pub data: Option<Bytes>,
    }

    #[async_trait]
    impl DataSupplier for FlakyDataSupplier {
        async fn fetch(&self, _url: &str) -> Result<Option<Bytes>, Error> {
            use std::sync::atomic::Ordering;
            let remaining = self.fail_times.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::transient(self.error_message.clone()));
            }
            Ok(self.data.clone())
        }
    }
}
