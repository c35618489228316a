//! Cache interface and capability record for cached objects.
//!
//! The interface is deliberately minimal — `get`/`put` keyed by the
//! request's final response name — so external implementations (disk,
//! object storage) are a thin adapter away. This crate ships one
//! reference implementation, [`MemoryCache`], backed by `dashmap` for
//! lock-free concurrent access; a disk or object-store backend is a
//! separate adapter behind the same [`Cache`] trait.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use goproxy_core::error::Result;
use std::sync::Arc;

/// Optional capabilities attached to a cached object, each of which
/// independently enables one HTTP response header.
#[derive(Debug, Clone, Default)]
pub struct CachedObject {
    pub data: Bytes,
    pub modified_at: Option<DateTime<Utc>>,
    pub checksum: Option<[u8; 32]>,
}

impl CachedObject {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            modified_at: None,
            checksum: None,
        }
    }

    pub fn with_modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }

    pub fn with_checksum(mut self, checksum: [u8; 32]) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Size in bytes, always known for an in-memory object.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Base64-encoded checksum suitable for an `ETag` header.
    pub fn etag(&self) -> Option<String> {
        self.checksum
            .map(|sum| format!("\"{}\"", base64_encode(&sum)))
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Minimal key-value cache interface.
///
/// `get` returns `Ok(None)` on a cache miss (not an error) so callers
/// don't need to distinguish a "does-not-exist" error variant from any
/// other kind of failure.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetches a cached object by its final response name.
    async fn get(&self, name: &str) -> Result<Option<CachedObject>>;

    /// Stores (overwriting) a cached object under `name`.
    async fn put(&self, name: &str, object: CachedObject) -> Result<()>;
}

/// An in-process, `DashMap`-backed [`Cache`].
///
/// Suitable as the default cache for a single-process deployment and
/// for tests; a production deployment behind more than one process
/// would plug in a disk or object-store implementation instead.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, CachedObject>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently cached (test/diagnostic helper).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, name: &str) -> Result<Option<CachedObject>> {
        Ok(self.entries.get(name).map(|entry| entry.value().clone()))
    }

    async fn put(&self, name: &str, object: CachedObject) -> Result<()> {
        tracing::debug!(name, size = object.size(), "caching object");
        self.entries.insert(name.to_string(), object);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_returns_identical_bytes() {
        let cache = MemoryCache::new();
        let object = CachedObject::new(Bytes::from_static(b"hello world"));
        cache.put("example.com/@latest", object).await.unwrap();

        let fetched = cache.get("example.com/@latest").await.unwrap().unwrap();
        assert_eq!(fetched.data, Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn get_miss_returns_none() {
        let cache = MemoryCache::new();
        assert!(cache.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites_existing_entry() {
        let cache = MemoryCache::new();
        cache
            .put("k", CachedObject::new(Bytes::from_static(b"v1")))
            .await
            .unwrap();
        cache
            .put("k", CachedObject::new(Bytes::from_static(b"v2")))
            .await
            .unwrap();
        let fetched = cache.get("k").await.unwrap().unwrap();
        assert_eq!(fetched.data, Bytes::from_static(b"v2"));
    }

    #[test]
    fn etag_is_quoted_base64_of_checksum() {
        let object = CachedObject::new(Bytes::new()).with_checksum([0u8; 32]);
        let etag = object.etag().unwrap();
        assert!(etag.starts_with('"') && etag.ends_with('"'));
    }

    #[test]
    fn no_checksum_means_no_etag() {
        let object = CachedObject::new(Bytes::new());
        assert!(object.etag().is_none());
    }
}
