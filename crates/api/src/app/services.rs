use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use stockflow_events::{ChangeNotifier, RoomRegistry};
#[cfg(feature = "redis")]
use stockflow_infra::RedisSnapshotCache;
use stockflow_infra::{
    CacheLayer, InMemoryInventoryStore, InventoryStore, PostgresInventoryStore, Services,
};

use crate::config::{AppConfig, ConfigError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    InMemory,
    Persistent,
}

/// Everything the handlers share: the mutating services and the live room registry.
#[derive(Clone)]
pub struct AppServices {
    pub services: Services,
    pub registry: Arc<RoomRegistry>,
    pub backend: StoreBackend,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Wire the stores, cache and registry selected by `config`.
///
/// Snapshots left in the cache by an earlier process are flushed before the first request.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, BootstrapError> {
    let registry = Arc::new(RoomRegistry::new());

    let app = if config.use_persistent_stores {
        build_persistent_services(config, registry).await?
    } else {
        build_in_memory_services(registry)
    };

    app.services.flush_cache().await;
    info!(backend = ?app.backend, "services ready");
    Ok(app)
}

fn build_in_memory_services(registry: Arc<RoomRegistry>) -> AppServices {
    let store: Arc<dyn InventoryStore> = Arc::new(InMemoryInventoryStore::new());
    let notifier: Arc<dyn ChangeNotifier> = registry.clone();

    AppServices {
        services: Services::new(store, CacheLayer::in_memory(), notifier),
        registry,
        backend: StoreBackend::InMemory,
    }
}

async fn build_persistent_services(
    config: &AppConfig,
    registry: Arc<RoomRegistry>,
) -> Result<AppServices, BootstrapError> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or(ConfigError::Missing("DATABASE_URL"))?;

    let pool = PgPool::connect(database_url).await?;
    let store: Arc<dyn InventoryStore> = Arc::new(PostgresInventoryStore::new(pool));
    let notifier: Arc<dyn ChangeNotifier> = registry.clone();
    let cache = connect_cache(config).await;

    Ok(AppServices {
        services: Services::new(store, cache, notifier),
        registry,
        backend: StoreBackend::Persistent,
    })
}

/// The cache is an accelerator; if Redis is unreachable at startup we run on the in-process one.
#[cfg(feature = "redis")]
async fn connect_cache(config: &AppConfig) -> CacheLayer {
    match RedisSnapshotCache::connect(&config.redis_url, config.cache_key_prefix.clone()).await {
        Ok(cache) => CacheLayer::new(Arc::new(cache)),
        Err(e) => {
            warn!(redis_url = %config.redis_url, "redis unavailable, using in-memory cache: {e}");
            CacheLayer::in_memory()
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn connect_cache(config: &AppConfig) -> CacheLayer {
    warn!(redis_url = %config.redis_url, "built without redis support; using in-memory cache");
    CacheLayer::in_memory()
}
