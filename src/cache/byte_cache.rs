//! Read-through cache tier for opaque binary blobs keyed by vendor path
//! (raw hourly tick archives). Each tier is a decorator holding a
//! reference to its fallback; the root of a chain is the rate-limited
//! fetcher, which has no fallback.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex as AsyncMutex;

use crate::cache::object_store::ObjectStore;
use crate::error::{Error, Kind};
use crate::stats::{SimpleStats, StatsNode, HIT, MISS};

#[async_trait]
pub trait ByteCache: Send + Sync {
    async fn get(&self, path: &str) -> Result<Bytes, Error>;
    fn stats(&self) -> StatsNode;
}

/// Local filesystem tier. Root directory defaults to
/// `${HOME}/.dukascopy-cache`; paths are stored verbatim under it with
/// intermediate directories created on demand.
pub struct LocalByteCache {
    root: PathBuf,
    stats: Arc<SimpleStats>,
    fallback: Arc<dyn ByteCache>,
    persist_lock: AsyncMutex<()>,
}

impl LocalByteCache {
    pub fn new(root: PathBuf, fallback: Arc<dyn ByteCache>) -> Self {
        LocalByteCache {
            root,
            stats: SimpleStats::new("local-byte-cache"),
            fallback,
            persist_lock: AsyncMutex::new(()),
        }
    }

    fn file_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    /// Recursively sums the length of every cached file in bytes.
    pub fn cache_size_bytes(&self) -> u64 {
        fn walk(dir: &std::path::Path) -> u64 {
            let mut total = 0;
            let Ok(entries) = std::fs::read_dir(dir) else {
                return 0;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    total += walk(&path);
                } else if let Ok(meta) = entry.metadata() {
                    total += meta.len();
                }
            }
            total
        }
        walk(&self.root)
    }

    /// Deletes every cached entry, leaving the root directory itself.
    pub fn remove_cache(&self) -> Result<(), Error> {
        if !self.root.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&self.root)
            .map_err(|e| Error::with_source(Kind::Io, "failed to list local cache root", e))?
        {
            let entry = entry.map_err(|e| Error::with_source(Kind::Io, "failed to read cache entry", e))?;
            let path = entry.path();
            if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            }
            .map_err(|e| Error::with_source(Kind::Io, format!("failed to remove {path:?}"), e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ByteCache for LocalByteCache {
    async fn get(&self, path: &str) -> Result<Bytes, Error> {
        let file_path = self.file_path(path);
        if file_path.exists() {
            let bytes = tokio::fs::read(&file_path)
                .await
                .map_err(|e| Error::with_source(Kind::Io, format!("failed to read cached file {file_path:?}"), e))?;
            self.stats.increment(HIT);
            return Ok(Bytes::from(bytes));
        }

        self.stats.increment(MISS);
        let bytes = self.fallback.get(path).await?;

        let _guard = self.persist_lock.lock().await;
        if !file_path.exists() {
            if let Err(e) = persist_atomically(&file_path, &bytes).await {
                tracing::warn!(error = %e, path, "failed to persist to local cache; returning fetched payload anyway");
            }
        }

        Ok(bytes)
    }

    fn stats(&self) -> StatsNode {
        StatsNode::Leaf(self.stats.clone())
    }
}

async fn persist_atomically(file_path: &std::path::Path, bytes: &Bytes) -> Result<(), Error> {
    if let Some(parent) = file_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::with_source(Kind::Io, "failed to create cache directories", e))?;
    }
    let tmp_path = file_path.with_extension("tmp-write");
    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| Error::with_source(Kind::Io, "failed to write temp cache file", e))?;
    tokio::fs::rename(&tmp_path, file_path)
        .await
        .map_err(|e| Error::with_source(Kind::Io, "failed to rename temp cache file into place", e))?;
    Ok(())
}

/// Object-storage (S3-shaped) tier.
pub struct S3ByteCache {
    bucket: String,
    store: Arc<dyn ObjectStore>,
    stats: Arc<SimpleStats>,
    fallback: Arc<dyn ByteCache>,
    persist_lock: AsyncMutex<()>,
}

impl S3ByteCache {
    pub fn new(bucket: impl Into<String>, store: Arc<dyn ObjectStore>, fallback: Arc<dyn ByteCache>) -> Self {
        S3ByteCache {
            bucket: bucket.into(),
            store,
            stats: SimpleStats::new("s3-byte-cache"),
            fallback,
            persist_lock: AsyncMutex::new(()),
        }
    }
}

#[async_trait]
impl ByteCache for S3ByteCache {
    async fn get(&self, path: &str) -> Result<Bytes, Error> {
        if self.store.head(&self.bucket, path).await? {
            if let Some(bytes) = self.store.get(&self.bucket, path).await? {
                self.stats.increment(HIT);
                return Ok(bytes);
            }
        }

        self.stats.increment(MISS);
        let bytes = self.fallback.get(path).await?;

        let _guard = self.persist_lock.lock().await;
        if !self.store.head(&self.bucket, path).await? {
            if let Err(e) = self
                .store
                .put(
                    &self.bucket,
                    path,
                    bytes.clone(),
                    "application/octet-stream",
                    path,
                    bytes.len(),
                )
                .await
            {
                tracing::warn!(error = %e, path, "failed to persist to S3 cache; returning fetched payload anyway");
            }
        }

        Ok(bytes)
    }

    fn stats(&self) -> StatsNode {
        StatsNode::Leaf(self.stats.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::object_store::MockObjectStore;
    use async_trait::async_trait;

    struct FixedFallback(Bytes);

    #[async_trait]
    impl ByteCache for FixedFallback {
        async fn get(&self, _path: &str) -> Result<Bytes, Error> {
            Ok(self.0.clone())
        }
        fn stats(&self) -> StatsNode {
            StatsNode::Leaf(SimpleStats::new("fixed-fallback"))
        }
    }

    #[tokio::test]
    async fn s3_tier_misses_then_persists_through_put() {
        let payload = Bytes::from(vec![7u8; 33_500]);
        let store = Arc::new(MockObjectStore::new());
        let fallback: Arc<dyn ByteCache> = Arc::new(FixedFallback(payload.clone()));
        let tier = S3ByteCache::new("bucket", store.clone(), fallback);

        let result = tier.get("EURUSD/2020/00/02/00h_ticks.bi5").await.unwrap();
        assert_eq!(result, payload);

        let StatsNode::Leaf(stats) = tier.stats() else {
            panic!("expected leaf stats node");
        };
        assert_eq!(stats.hit(), 0);
        assert_eq!(stats.miss(), 1);
        assert_eq!(stats.retrieve_count(), 1);

        let puts = store.puts();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].bucket, "bucket");
        assert_eq!(puts[0].key, "EURUSD/2020/00/02/00h_ticks.bi5");
        assert_eq!(puts[0].content_type, "application/octet-stream");
        assert!(puts[0].content_length > 33_000);
    }

    #[tokio::test]
    async fn local_tier_persists_to_disk_and_hits_on_second_read() {
        let tmp_root = std::env::temp_dir().join(format!("dukascopy-test-{}", uuid::Uuid::new_v4()));
        let payload = Bytes::from_static(b"hello-cache");
        let fallback: Arc<dyn ByteCache> = Arc::new(FixedFallback(payload.clone()));
        let tier = LocalByteCache::new(tmp_root.clone(), fallback);

        let first = tier.get("EURUSD/2020/00/02/00h_ticks.bi5").await.unwrap();
        assert_eq!(first, payload);

        let second = tier.get("EURUSD/2020/00/02/00h_ticks.bi5").await.unwrap();
        assert_eq!(second, payload);

        let StatsNode::Leaf(stats) = tier.stats() else {
            panic!("expected leaf stats node");
        };
        assert_eq!(stats.miss(), 1);
        assert_eq!(stats.hit(), 1);

        std::fs::remove_dir_all(&tmp_root).ok();
    }
}
