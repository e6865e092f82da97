//! In-memory result store
//!
//! Keeps archived results in a map with per-entry expiry. An optional
//! visibility delay makes fresh writes unreadable for a while, the way a
//! replicated store behaves before a write has propagated.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::coordinator::RoutingKey;

use super::{ResultStore, StoreError};

#[derive(Debug)]
struct StoredResult {
    data: Bytes,
    visible_at: Instant,
    expires_at: Instant,
}

/// Result store held in process memory
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    entries: RwLock<HashMap<RoutingKey, StoredResult>>,
    visibility_delay: Duration,
}

impl MemoryResultStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay before a written entry becomes readable
    pub fn with_visibility_delay(mut self, delay: Duration) -> Self {
        self.visibility_delay = delay;
        self
    }

    /// Number of entries, including expired ones not yet swept
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop expired entries
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();

        entries.retain(|_, entry| entry.expires_at > now);

        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed = removed, remaining = entries.len(), "Expired results removed");
        }
    }
}

#[async_trait::async_trait]
impl ResultStore for MemoryResultStore {
    async fn get(&self, key: &RoutingKey) -> Result<Option<Bytes>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;

        Ok(entries
            .get(key)
            .filter(|entry| entry.visible_at <= now && entry.expires_at > now)
            .map(|entry| entry.data.clone()))
    }

    async fn put(&self, key: &RoutingKey, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let entry = StoredResult {
            data: value,
            visible_at: now + self.visibility_delay,
            expires_at: now + ttl,
        };

        self.entries.write().await.insert(*key, entry);
        tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Result archived");
        Ok(())
    }

    async fn purge_expired(&self) {
        self.cleanup().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn key(body: &[u8]) -> RoutingKey {
        RoutingKey::derive(b"test", [body])
    }

    #[tokio::test]
    async fn test_put_get() {
        let store = MemoryResultStore::new();
        let k = key(b"a");

        assert_eq!(store.get(&k).await.unwrap(), None);

        store
            .put(&k, Bytes::from_static(b"result"), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            store.get(&k).await.unwrap(),
            Some(Bytes::from_static(b"result"))
        );
        assert_eq!(store.get(&key(b"b")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expiry() {
        let store = MemoryResultStore::new();
        let k = key(b"a");

        store
            .put(&k, Bytes::from_static(b"result"), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(store.get(&k).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.get(&k).await.unwrap(), None);

        // Still counted until swept
        assert_eq!(store.len().await, 1);
        store.cleanup().await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_visibility_delay() {
        let store = MemoryResultStore::new().with_visibility_delay(Duration::from_millis(50));
        let k = key(b"a");

        store
            .put(&k, Bytes::from_static(b"result"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get(&k).await.unwrap(), None);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.get(&k).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_live_entries() {
        let store = MemoryResultStore::new();

        store
            .put(&key(b"short"), Bytes::from_static(b"x"), Duration::from_millis(10))
            .await
            .unwrap();
        store
            .put(&key(b"long"), Bytes::from_static(b"y"), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        store.cleanup().await;

        assert_eq!(store.len().await, 1);
        assert!(store.get(&key(b"long")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cleanup_task() {
        let store = Arc::new(MemoryResultStore::new());
        store
            .put(&key(b"a"), Bytes::from_static(b"x"), Duration::from_millis(10))
            .await
            .unwrap();

        let handle = crate::cache::spawn_cleanup_task(store.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(store.is_empty().await);
    }
}
