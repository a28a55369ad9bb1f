//! Redis-backed snapshot cache (optional).
//!
//! One string key per kind holding the JSON snapshot, written without expiry.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::{CacheError, CacheKind, SnapshotCache};

#[derive(Clone)]
pub struct RedisSnapshotCache {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisSnapshotCache {
    pub async fn connect(redis_url: impl AsRef<str>, prefix: impl Into<String>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(Self {
            conn,
            prefix: prefix.into(),
        })
    }

    fn key(&self, kind: CacheKind) -> String {
        format!("{}{}", self.prefix, kind.key())
    }
}

#[async_trait]
impl SnapshotCache for RedisSnapshotCache {
    async fn get(&self, kind: CacheKind) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get(self.key(kind))
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    async fn set(&self, kind: CacheKind, snapshot: String) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.set(self.key(kind), snapshot)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    async fn invalidate(&self, kind: CacheKind) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del(self.key(kind))
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    async fn invalidate_all(&self) -> Result<(), CacheError> {
        let keys: Vec<String> = CacheKind::ALL.iter().map(|&k| self.key(k)).collect();
        let mut conn = self.conn.clone();
        conn.del(keys)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }
}
