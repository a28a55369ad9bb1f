//! Persistence seam for warehouses, products, inventory rows and movements.
//!
//! Two implementations:
//! - [`InMemoryInventoryStore`]: dev/test, per-row async locks
//! - [`PostgresInventoryStore`]: sqlx, `SELECT ... FOR UPDATE` row locks

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockflow_core::{InventoryId, MovementId, ProductId, WarehouseId};
use stockflow_inventory::{
    InventoryFilter, InventoryRecord, MovementFilter, MovementRecord, NewInventory, NewMovement,
    NewProduct, NewWarehouse, Product, ProductFilter, Warehouse, WarehouseFilter,
};

pub use in_memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Row counts for the dashboard.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub warehouses: u64,
    pub products: u64,
    pub inventory: u64,
    pub transactions: u64,
    /// Inventory rows whose quantity is exactly zero.
    pub zero_quantity: u64,
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError>;
    async fn list_warehouses(&self, filter: &WarehouseFilter) -> Result<Vec<Warehouse>, StoreError>;
    async fn create_warehouse(&self, new: NewWarehouse) -> Result<Warehouse, StoreError>;
    /// Removes the warehouse with its inventory rows and their movements.
    /// `false` when there was nothing to delete.
    async fn delete_warehouse(&self, id: WarehouseId) -> Result<bool, StoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError>;
    /// `Conflict` on a duplicate SKU.
    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError>;
    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError>;

    async fn get_inventory(&self, id: InventoryId) -> Result<Option<InventoryRecord>, StoreError>;
    async fn list_inventory(&self, filter: &InventoryFilter) -> Result<Vec<InventoryRecord>, StoreError>;
    /// `NotFound` when the warehouse or product is missing, `Conflict` when the pair
    /// already has a row.
    async fn create_inventory(&self, new: NewInventory) -> Result<InventoryRecord, StoreError>;
    /// Removes the row and its movements.
    async fn delete_inventory(&self, id: InventoryId) -> Result<bool, StoreError>;

    async fn get_movement(&self, id: MovementId) -> Result<Option<MovementRecord>, StoreError>;
    async fn list_movements(&self, filter: &MovementFilter) -> Result<Vec<MovementRecord>, StoreError>;
    /// Newest first.
    async fn recent_movements(&self, limit: usize) -> Result<Vec<MovementRecord>, StoreError>;

    async fn counts(&self) -> Result<StoreCounts, StoreError>;

    /// Open a unit of work for a ledger mutation.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}

/// One atomic ledger mutation.
///
/// Nothing written through it is visible to other readers until `commit`; dropping it
/// without committing discards every staged write and releases its row locks.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Read an inventory row and hold its lock until the unit of work ends.
    async fn lock_inventory(&mut self, id: InventoryId) -> Result<Option<InventoryRecord>, StoreError>;

    /// Persist a new quantity for a row previously locked by this unit of work.
    async fn set_quantity(
        &mut self,
        id: InventoryId,
        quantity: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn insert_movement(
        &mut self,
        movement: NewMovement,
        timestamp: DateTime<Utc>,
    ) -> Result<MovementRecord, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        (**self).get_warehouse(id).await
    }

    async fn list_warehouses(&self, filter: &WarehouseFilter) -> Result<Vec<Warehouse>, StoreError> {
        (**self).list_warehouses(filter).await
    }

    async fn create_warehouse(&self, new: NewWarehouse) -> Result<Warehouse, StoreError> {
        (**self).create_warehouse(new).await
    }

    async fn delete_warehouse(&self, id: WarehouseId) -> Result<bool, StoreError> {
        (**self).delete_warehouse(id).await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).get_product(id).await
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        (**self).list_products(filter).await
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError> {
        (**self).create_product(new).await
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError> {
        (**self).delete_product(id).await
    }

    async fn get_inventory(&self, id: InventoryId) -> Result<Option<InventoryRecord>, StoreError> {
        (**self).get_inventory(id).await
    }

    async fn list_inventory(&self, filter: &InventoryFilter) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).list_inventory(filter).await
    }

    async fn create_inventory(&self, new: NewInventory) -> Result<InventoryRecord, StoreError> {
        (**self).create_inventory(new).await
    }

    async fn delete_inventory(&self, id: InventoryId) -> Result<bool, StoreError> {
        (**self).delete_inventory(id).await
    }

    async fn get_movement(&self, id: MovementId) -> Result<Option<MovementRecord>, StoreError> {
        (**self).get_movement(id).await
    }

    async fn list_movements(&self, filter: &MovementFilter) -> Result<Vec<MovementRecord>, StoreError> {
        (**self).list_movements(filter).await
    }

    async fn recent_movements(&self, limit: usize) -> Result<Vec<MovementRecord>, StoreError> {
        (**self).recent_movements(limit).await
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        (**self).counts().await
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        (**self).begin().await
    }
}
