//! Infrastructure layer: persistence, snapshot cache, stock ledger and the services
//! that tie them to the realtime fabric.

pub mod cache;
pub mod ledger;
pub mod services;
pub mod store;


pub use cache::{CacheError, CacheKind, CacheLayer, InMemorySnapshotCache, SnapshotCache};
#[cfg(feature = "redis")]
pub use cache::RedisSnapshotCache;
pub use ledger::{LedgerError, RecordedMovement, StockLedger};
pub use services::{ChangeOrigin, DashboardCounts, ServiceError, Services};
pub use store::{InMemoryInventoryStore, InventoryStore, PostgresInventoryStore, StoreCounts, StoreError};
