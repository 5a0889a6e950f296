//! The object-store contract the S3 cache tier is built on: `head`/`get`/
//! `put`, modeled as an explicit trait rather than the source's
//! catch-a-"no such key"-exception pattern (Design Notes, §9).

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Error;

/// Production implementations adapt this to a real object-storage SDK;
/// this crate only depends on the shape below.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `true` if `key` exists in `bucket`.
    async fn head(&self, bucket: &str, key: &str) -> Result<bool, Error>;

    /// The object's bytes, or `None` if it does not exist.
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, Error>;

    #[allow(clippy::too_many_arguments)]
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
        content_disposition: &str,
        content_length: usize,
    ) -> Result<(), Error>;
}

/// Records of a [`ObjectStore::put`] call, for test assertions (see spec
/// §8 scenario 6).
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub content_disposition: String,
    pub content_length: usize,
}

/// In-memory `ObjectStore` used in tests. Seed it with pre-existing
/// objects via [`MockObjectStore::with_objects`]; every `put` is recorded
/// for later inspection.
pub struct MockObjectStore {
    objects: std::sync::Mutex<std::collections::HashMap<(String, String), Bytes>>,
    puts: std::sync::Mutex<Vec<PutRequest>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        MockObjectStore {
            objects: std::sync::Mutex::new(std::collections::HashMap::new()),
            puts: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn puts(&self) -> Vec<PutRequest> {
        self.puts.lock().unwrap().clone()
    }
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn head(&self, bucket: &str, key: &str) -> Result<bool, Error> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, Error> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
        content_disposition: &str,
        content_length: usize,
    ) -> Result<(), Error> {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), bytes);
        self.puts.lock().unwrap().push(PutRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            content_disposition: content_disposition.to_string(),
            content_length,
        });
        Ok(())
    }
}
