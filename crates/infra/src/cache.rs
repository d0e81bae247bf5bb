//! Read-through cache for item snapshots.
//!
//! The cache is never authoritative: entries carry a TTL, every committed
//! mutation invalidates the touched items, and any cache failure falls through
//! to the store. A read-through fill that overlaps an invalidation is dropped,
//! so a snapshot read before a commit never outlives it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use stockflow_inventory::{InventoryItem, InventoryItemId};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache operation failed: {0}")]
    OperationFailed(String),
}

/// Key → serialized JSON with optional expiry.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Process-local cache; the default when no Redis URL is configured.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        {
            let store = self.store.read().await;
            match store.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }
        self.store.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let entry = CacheEntry {
            value: value.to_string(),
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.store.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.write().await.remove(key);
        Ok(())
    }
}

#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;

#[cfg(feature = "redis")]
mod redis_cache {
    use super::*;
    use redis::AsyncCommands;

    /// Shared cache across service replicas.
    #[derive(Clone)]
    pub struct RedisCache {
        conn: redis::aio::MultiplexedConnection,
    }

    impl RedisCache {
        pub async fn connect(url: &str) -> Result<Self, CacheError> {
            let client = redis::Client::open(url)?;
            let conn = client.get_multiplexed_tokio_connection().await?;
            Ok(Self { conn })
        }
    }

    #[async_trait]
    impl CacheBackend for RedisCache {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            let mut conn = self.conn.clone();
            Ok(conn.get(key).await?)
        }

        async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
            let mut conn = self.conn.clone();
            match ttl {
                Some(ttl) => conn.set_ex(key, value, ttl.as_secs().max(1)).await?,
                None => conn.set(key, value).await?,
            }
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            let mut conn = self.conn.clone();
            conn.del(key).await?;
            Ok(())
        }
    }
}

/// Invalidation generation observed before a store read; see [`ItemCache::fill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket(u64);

/// Typed view over a [`CacheBackend`] for inventory item snapshots.
#[derive(Clone)]
pub struct ItemCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    generation: Arc<AtomicU64>,
}

impl ItemCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn key(id: InventoryItemId) -> String {
        format!("inventory_item:{id}")
    }

    /// Cached snapshot, or `None` on miss, expiry or any cache failure.
    pub async fn get(&self, id: InventoryItemId) -> Option<InventoryItem> {
        let raw = match self.backend.get(&Self::key(id)).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(item_id = %id, error = %err, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!(item_id = %id, error = %err, "discarding undecodable cache entry");
                None
            }
        }
    }

    /// Take before reading the store for a later [`fill`](Self::fill).
    pub fn ticket(&self) -> FillTicket {
        FillTicket(self.generation.load(Ordering::SeqCst))
    }

    /// Store a snapshot read under `ticket`, unless an invalidation ran since.
    ///
    /// The generation is checked again after the write: an invalidation that
    /// bumped it in between may have deleted the key before our write landed,
    /// so the entry is removed again.
    pub async fn fill(&self, item: &InventoryItem, ticket: FillTicket) {
        if self.ticket() != ticket {
            debug!(item_id = %item.id, "skipping cache fill after concurrent invalidation");
            return;
        }
        self.put(item).await;
        if self.ticket() != ticket {
            self.delete(item.id).await;
        }
    }

    /// Unconditional write. Use [`fill`](Self::fill) for read-through.
    pub async fn put(&self, item: &InventoryItem) {
        let result = match serde_json::to_string(item) {
            Ok(raw) => self.backend.set(&Self::key(item.id), &raw, Some(self.ttl)).await,
            Err(err) => Err(CacheError::from(err)),
        };
        if let Err(err) = result {
            warn!(item_id = %item.id, error = %err, "cache write failed");
        }
    }

    pub async fn invalidate(&self, ids: &[InventoryItemId]) {
        // Bump before deleting so an in-flight fill either sees the new
        // generation or has its write removed by the delete below.
        self.generation.fetch_add(1, Ordering::SeqCst);
        for id in ids {
            self.delete(*id).await;
        }
    }

    async fn delete(&self, id: InventoryItemId) {
        if let Err(err) = self.backend.delete(&Self::key(id)).await {
            warn!(item_id = %id, error = %err, "cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use stockflow_core::{BranchId, ProductId};
    use stockflow_inventory::{ItemKey, StockThresholds};

    fn test_item() -> InventoryItem {
        InventoryItem::provision(
            ItemKey::new(ProductId::new(), BranchId::new(), None),
            StockThresholds::default(),
            Decimal::ONE,
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", Some(Duration::from_millis(10))).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn entries_without_ttl_persist_until_deleted() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", None).await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn item_cache_round_trips_and_invalidates() {
        let cache = ItemCache::new(Arc::new(InMemoryCache::new()), Duration::from_secs(60));
        let item = test_item();

        cache.put(&item).await;
        assert_eq!(cache.get(item.id).await, Some(item.clone()));

        cache.invalidate(&[item.id]).await;
        assert_eq!(cache.get(item.id).await, None);
    }

    #[tokio::test]
    async fn fill_read_before_an_invalidation_is_dropped() {
        let cache = ItemCache::new(Arc::new(InMemoryCache::new()), Duration::from_secs(60));
        let stale = test_item();

        let ticket = cache.ticket();
        // a writer commits and invalidates between our store read and fill
        cache.invalidate(&[stale.id]).await;
        cache.fill(&stale, ticket).await;
        assert_eq!(cache.get(stale.id).await, None);

        let ticket = cache.ticket();
        cache.fill(&stale, ticket).await;
        assert_eq!(cache.get(stale.id).await, Some(stale));
    }
}
