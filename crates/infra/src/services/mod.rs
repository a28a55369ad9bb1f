//! Business services.
//!
//! Every mutation runs the same three steps, in order:
//! 1. write to the store (through the stock ledger for movements)
//! 2. drop the cached snapshots of every affected kind
//! 3. notify the rooms watching those kinds, skipping the originating client
//!
//! Steps 2 and 3 never fail the mutation.

pub mod dashboard;
pub mod inventory;
pub mod products;
pub mod transactions;
pub mod warehouses;

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use stockflow_core::DomainError;
use stockflow_events::{ChangeNotice, ChangeNotifier, ClientId, RoomId};

use crate::cache::{CacheKind, CacheLayer};
use crate::ledger::{LedgerError, StockLedger};
use crate::store::{InventoryStore, StoreError};

pub use dashboard::{DashboardCounts, DashboardService};
pub use inventory::InventoryService;
pub use products::ProductService;
pub use transactions::TransactionService;
pub use warehouses::WarehouseService;

/// Room that receives every change notice.
pub const DASHBOARD_ROOM: &str = "dashboard";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Store(String),
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::NotFound(what) => ServiceError::NotFound(what),
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Backend(msg) => ServiceError::Store(msg),
        }
    }
}

impl From<LedgerError> for ServiceError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::Invalid(e) => e.into(),
            LedgerError::InventoryNotFound(id) => ServiceError::NotFound(format!("inventory {id}")),
            LedgerError::Store(e) => e.into(),
        }
    }
}

/// Who caused a mutation. Both parts are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeOrigin {
    /// Excluded from the resulting notices.
    pub client_id: Option<ClientId>,
    /// Also notified, in addition to the rooms of the affected kinds.
    pub room_id: Option<RoomId>,
}

impl ChangeOrigin {
    pub fn client(client_id: ClientId) -> Self {
        Self {
            client_id: Some(client_id),
            room_id: None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChangeOp {
    Created,
    Deleted,
}

impl ChangeOp {
    fn as_str(self) -> &'static str {
        match self {
            ChangeOp::Created => "created",
            ChangeOp::Deleted => "deleted",
        }
    }
}

/// One committed mutation as the cache and the rooms see it.
#[derive(Debug, Clone, Copy)]
struct Change<'a> {
    kind: CacheKind,
    op: ChangeOp,
    id: u64,
    /// Snapshots to drop; `None` drops all of them.
    affects: Option<&'a [CacheKind]>,
}

/// Collaborators shared by every service.
#[derive(Clone)]
pub struct ServiceContext {
    store: Arc<dyn InventoryStore>,
    cache: CacheLayer,
    notifier: Arc<dyn ChangeNotifier>,
}

impl ServiceContext {
    pub fn new(store: Arc<dyn InventoryStore>, cache: CacheLayer, notifier: Arc<dyn ChangeNotifier>) -> Self {
        Self { store, cache, notifier }
    }

    pub fn store(&self) -> &Arc<dyn InventoryStore> {
        &self.store
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    /// Cache-aside list: unfiltered reads go through the snapshot, filtered ones straight
    /// to the store. An empty snapshot counts as a miss.
    async fn cached_list<T, F, Fut>(&self, kind: CacheKind, unfiltered: bool, load: F) -> Result<Vec<T>, ServiceError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, StoreError>>,
    {
        if !unfiltered {
            return Ok(load().await?);
        }

        if let Some(hit) = self.cache.get::<T>(kind).await {
            if !hit.is_empty() {
                debug!(kind = %kind, "cache hit");
                return Ok(hit);
            }
        }

        let fresh = load().await?;
        self.cache.set(kind, &fresh).await;
        Ok(fresh)
    }

    async fn publish_change(&self, change: Change<'_>, origin: &ChangeOrigin) {
        let affected: Vec<CacheKind> = match change.affects {
            Some(kinds) => kinds.to_vec(),
            None => {
                self.cache.invalidate_all().await;
                CacheKind::ALL.to_vec()
            }
        };
        if change.affects.is_some() {
            self.cache.invalidate(&affected).await;
        }

        let mut rooms: BTreeSet<&str> = affected.iter().map(|k| k.room()).collect();
        rooms.insert(DASHBOARD_ROOM);
        if let Some(room) = &origin.room_id {
            rooms.insert(room.as_str());
        }

        let data = json!({
            "kind": change.kind.room(),
            "op": change.op.as_str(),
            "id": change.id,
        });

        for room in rooms {
            let room_id = match RoomId::parse(room) {
                Ok(id) => id,
                Err(e) => {
                    warn!(room_id = room, "skipping notice: {e}");
                    continue;
                }
            };
            self.notifier
                .notify(ChangeNotice {
                    room_id,
                    origin: origin.client_id.clone(),
                    data: data.clone(),
                })
                .await;
        }
    }
}

/// All services over one set of collaborators.
#[derive(Clone)]
pub struct Services {
    pub warehouses: WarehouseService,
    pub products: ProductService,
    pub inventory: InventoryService,
    pub transactions: TransactionService,
    pub dashboard: DashboardService,
    context: ServiceContext,
}

impl Services {
    pub fn new(store: Arc<dyn InventoryStore>, cache: CacheLayer, notifier: Arc<dyn ChangeNotifier>) -> Self {
        let context = ServiceContext::new(store.clone(), cache, notifier);
        let ledger = StockLedger::new(store);
        Self {
            warehouses: WarehouseService::new(context.clone()),
            products: ProductService::new(context.clone()),
            inventory: InventoryService::new(context.clone()),
            transactions: TransactionService::new(context.clone(), ledger),
            dashboard: DashboardService::new(context.clone()),
            context,
        }
    }

    /// Drop snapshots left behind by a previous process.
    pub async fn flush_cache(&self) {
        self.context.cache.invalidate_all().await;
    }
}
