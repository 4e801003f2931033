use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Artifact bytes held in the fast tier, plus when they were stored.
///
/// Expiry is decided lazily on access against the TTL class of the key, so
/// the entry only records its own storage instant. Capacity-based eviction
/// is moka's concern and runs independently of TTL.
#[derive(Debug, Clone)]
pub struct CachedArtifact {
    pub bytes: Arc<Vec<u8>>,
    pub content_hash: String,
    pub stored_at: Instant,
}

/// In-memory fast tier in front of durable storage.
///
/// Created once at startup and handed to the coordinator by reference;
/// bounded by entry count so keys that are never revisited cannot pile up
/// indefinitely.
pub struct ArtifactCache {
    inner: Cache<String, CachedArtifact>,
}

impl ArtifactCache {
    pub fn new(max_entries: u64) -> Self {
        Self {
            inner: Cache::builder().max_capacity(max_entries).build(),
        }
    }

    /// Look up a key, honoring the given TTL: an entry older than `ttl` is
    /// evicted and reported as a miss.
    pub async fn get_fresh(&self, key: &str, ttl: Duration) -> Option<CachedArtifact> {
        let entry = self.inner.get(key).await?;
        if entry.stored_at.elapsed() < ttl {
            Some(entry)
        } else {
            self.inner.invalidate(key).await;
            None
        }
    }

    pub async fn insert(&self, key: String, bytes: Arc<Vec<u8>>, content_hash: String) {
        self.inner
            .insert(
                key,
                CachedArtifact {
                    bytes,
                    content_hash,
                    stored_at: Instant::now(),
                },
            )
            .await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }
}
