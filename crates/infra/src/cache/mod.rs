//! Cache-aside snapshots of whole collections, one per entity kind.
//!
//! Entries have no TTL; they are dropped wholesale by the services after a mutation.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

pub use in_memory::InMemorySnapshotCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisSnapshotCache;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKind {
    Warehouse,
    Product,
    Inventory,
    Transaction,
}

impl CacheKind {
    pub const ALL: [CacheKind; 4] = [
        CacheKind::Warehouse,
        CacheKind::Product,
        CacheKind::Inventory,
        CacheKind::Transaction,
    ];

    pub fn key(self) -> &'static str {
        match self {
            CacheKind::Warehouse => "warehouse_cache",
            CacheKind::Product => "product_cache",
            CacheKind::Inventory => "inventory_cache",
            CacheKind::Transaction => "transaction_cache",
        }
    }

    /// Room whose clients display this kind.
    pub fn room(self) -> &'static str {
        match self {
            CacheKind::Warehouse => "warehouse",
            CacheKind::Product => "product",
            CacheKind::Inventory => "inventory",
            CacheKind::Transaction => "transaction",
        }
    }
}

impl core::fmt::Display for CacheKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.key())
    }
}

/// Cache failures. Never surfaced to callers of the services.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cache entry could not be (de)serialized: {0}")]
    Serialization(String),
}

/// Raw snapshot storage keyed by kind.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn get(&self, kind: CacheKind) -> Result<Option<String>, CacheError>;
    async fn set(&self, kind: CacheKind, snapshot: String) -> Result<(), CacheError>;
    async fn invalidate(&self, kind: CacheKind) -> Result<(), CacheError>;

    async fn invalidate_all(&self) -> Result<(), CacheError> {
        for kind in CacheKind::ALL {
            self.invalidate(kind).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<C> SnapshotCache for Arc<C>
where
    C: SnapshotCache + ?Sized,
{
    async fn get(&self, kind: CacheKind) -> Result<Option<String>, CacheError> {
        (**self).get(kind).await
    }

    async fn set(&self, kind: CacheKind, snapshot: String) -> Result<(), CacheError> {
        (**self).set(kind, snapshot).await
    }

    async fn invalidate(&self, kind: CacheKind) -> Result<(), CacheError> {
        (**self).invalidate(kind).await
    }

    async fn invalidate_all(&self) -> Result<(), CacheError> {
        (**self).invalidate_all().await
    }
}

/// Typed, failure-tolerant front for a [`SnapshotCache`].
///
/// A failing or undecodable `get` is a miss; failing writes and invalidations are logged
/// and swallowed.
#[derive(Clone)]
pub struct CacheLayer {
    backend: Arc<dyn SnapshotCache>,
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn SnapshotCache>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemorySnapshotCache::new()))
    }

    pub async fn get<T>(&self, kind: CacheKind) -> Option<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let raw = match self.backend.get(kind).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(kind = %kind, "cache read failed, treating as miss: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(kind = %kind, "cache entry undecodable, treating as miss: {e}");
                None
            }
        }
    }

    pub async fn set<T>(&self, kind: CacheKind, snapshot: &[T])
    where
        T: Serialize + Sync,
    {
        let raw = match serde_json::to_string(snapshot) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(kind = %kind, "cache snapshot not serializable: {e}");
                return;
            }
        };
        if let Err(e) = self.backend.set(kind, raw).await {
            warn!(kind = %kind, "cache write failed: {e}");
        }
    }

    pub async fn invalidate(&self, kinds: &[CacheKind]) {
        for &kind in kinds {
            if let Err(e) = self.backend.invalidate(kind).await {
                warn!(kind = %kind, "cache invalidation failed: {e}");
            }
        }
    }

    pub async fn invalidate_all(&self) {
        if let Err(e) = self.backend.invalidate_all().await {
            warn!("cache flush failed: {e}");
        }
    }
}

impl core::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CacheLayer").finish_non_exhaustive()
    }
}
