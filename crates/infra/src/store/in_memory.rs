use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;

use stockflow_core::{Entity, InventoryId, MovementId, ProductId, WarehouseId};
use stockflow_inventory::{
    InventoryFilter, InventoryRecord, MovementFilter, MovementRecord, NewInventory, NewMovement,
    NewProduct, NewWarehouse, Product, ProductFilter, Warehouse, WarehouseFilter,
};

use super::{InventoryStore, StoreCounts, StoreError, UnitOfWork};

#[derive(Debug, Default)]
struct Tables {
    warehouses: BTreeMap<WarehouseId, Warehouse>,
    products: BTreeMap<ProductId, Product>,
    inventory: BTreeMap<InventoryId, InventoryRecord>,
    movements: BTreeMap<MovementId, MovementRecord>,
}

impl Tables {
    /// Drop inventory rows matching `doomed` together with their movements.
    fn cascade_inventory(&mut self, doomed: impl Fn(&InventoryRecord) -> bool) -> Vec<InventoryId> {
        let ids: Vec<InventoryId> = self
            .inventory
            .values()
            .filter(|row| doomed(row))
            .map(Entity::id)
            .collect();
        for id in &ids {
            self.inventory.remove(id);
        }
        self.movements.retain(|_, m| !ids.contains(&m.inventory_id));
        ids
    }
}

#[derive(Debug, Default)]
struct Sequences {
    warehouse: AtomicU64,
    product: AtomicU64,
    inventory: AtomicU64,
    movement: AtomicU64,
}

fn next(seq: &AtomicU64) -> u64 {
    seq.fetch_add(1, Ordering::Relaxed) + 1
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    sequences: Sequences,
    row_locks: Mutex<HashMap<InventoryId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Shared {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, id: InventoryId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(id).or_default().clone()
    }

    fn forget_row_locks(&self, ids: &[InventoryId]) {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            locks.remove(id);
        }
    }
}

/// In-memory store for tests/dev.
///
/// Ledger units of work serialize per inventory row through an async lock that is held
/// from `lock_inventory` until commit or drop; staged writes become visible atomically
/// on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    shared: Arc<Shared>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        Ok(self.shared.read().warehouses.get(&id).cloned())
    }

    async fn list_warehouses(&self, filter: &WarehouseFilter) -> Result<Vec<Warehouse>, StoreError> {
        Ok(self
            .shared
            .read()
            .warehouses
            .values()
            .filter(|w| filter.matches(w))
            .cloned()
            .collect())
    }

    async fn create_warehouse(&self, new: NewWarehouse) -> Result<Warehouse, StoreError> {
        let id = WarehouseId::new(next(&self.shared.sequences.warehouse));
        let warehouse = new.into_warehouse(id, Utc::now());
        self.shared.write().warehouses.insert(id, warehouse.clone());
        Ok(warehouse)
    }

    async fn delete_warehouse(&self, id: WarehouseId) -> Result<bool, StoreError> {
        let dropped_rows = {
            let mut tables = self.shared.write();
            if tables.warehouses.remove(&id).is_none() {
                return Ok(false);
            }
            tables.cascade_inventory(|row| row.warehouse_id() == id)
        };
        self.shared.forget_row_locks(&dropped_rows);
        Ok(true)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.shared.read().products.get(&id).cloned())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        Ok(self
            .shared
            .read()
            .products
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError> {
        let mut tables = self.shared.write();
        if tables.products.values().any(|p| p.sku == new.sku) {
            return Err(StoreError::Conflict(format!("sku '{}' already exists", new.sku)));
        }
        let id = ProductId::new(next(&self.shared.sequences.product));
        let product = new.into_product(id, Utc::now());
        tables.products.insert(id, product.clone());
        Ok(product)
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError> {
        let dropped_rows = {
            let mut tables = self.shared.write();
            if tables.products.remove(&id).is_none() {
                return Ok(false);
            }
            tables.cascade_inventory(|row| row.product_id() == id)
        };
        self.shared.forget_row_locks(&dropped_rows);
        Ok(true)
    }

    async fn get_inventory(&self, id: InventoryId) -> Result<Option<InventoryRecord>, StoreError> {
        Ok(self.shared.read().inventory.get(&id).cloned())
    }

    async fn list_inventory(&self, filter: &InventoryFilter) -> Result<Vec<InventoryRecord>, StoreError> {
        Ok(self
            .shared
            .read()
            .inventory
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    async fn create_inventory(&self, new: NewInventory) -> Result<InventoryRecord, StoreError> {
        let mut tables = self.shared.write();
        if !tables.warehouses.contains_key(&new.warehouse_id) {
            return Err(StoreError::NotFound(format!("warehouse {}", new.warehouse_id)));
        }
        if !tables.products.contains_key(&new.product_id) {
            return Err(StoreError::NotFound(format!("product {}", new.product_id)));
        }
        if tables
            .inventory
            .values()
            .any(|row| row.warehouse_id() == new.warehouse_id && row.product_id() == new.product_id)
        {
            return Err(StoreError::Conflict(format!(
                "inventory for warehouse {} and product {} already exists",
                new.warehouse_id, new.product_id
            )));
        }

        let id = InventoryId::new(next(&self.shared.sequences.inventory));
        let record = new.into_record(id, Utc::now());
        tables.inventory.insert(id, record.clone());
        Ok(record)
    }

    async fn delete_inventory(&self, id: InventoryId) -> Result<bool, StoreError> {
        let removed = {
            let mut tables = self.shared.write();
            !tables.cascade_inventory(|row| row.id() == id).is_empty()
        };
        if removed {
            self.shared.forget_row_locks(&[id]);
        }
        Ok(removed)
    }

    async fn get_movement(&self, id: MovementId) -> Result<Option<MovementRecord>, StoreError> {
        Ok(self.shared.read().movements.get(&id).cloned())
    }

    async fn list_movements(&self, filter: &MovementFilter) -> Result<Vec<MovementRecord>, StoreError> {
        Ok(self
            .shared
            .read()
            .movements
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect())
    }

    async fn recent_movements(&self, limit: usize) -> Result<Vec<MovementRecord>, StoreError> {
        let mut all: Vec<MovementRecord> = self.shared.read().movements.values().cloned().collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        all.truncate(limit);
        Ok(all)
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let tables = self.shared.read();
        Ok(StoreCounts {
            warehouses: tables.warehouses.len() as u64,
            products: tables.products.len() as u64,
            inventory: tables.inventory.len() as u64,
            transactions: tables.movements.len() as u64,
            zero_quantity: tables.inventory.values().filter(|row| row.quantity() == 0).count() as u64,
        })
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(InMemoryUnitOfWork {
            shared: self.shared.clone(),
            held: HashMap::new(),
            quantities: BTreeMap::new(),
            movements: Vec::new(),
        }))
    }
}

struct InMemoryUnitOfWork {
    shared: Arc<Shared>,
    held: HashMap<InventoryId, OwnedMutexGuard<()>>,
    quantities: BTreeMap<InventoryId, (i64, DateTime<Utc>)>,
    movements: Vec<MovementRecord>,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn lock_inventory(&mut self, id: InventoryId) -> Result<Option<InventoryRecord>, StoreError> {
        if !self.held.contains_key(&id) {
            let guard = self.shared.row_lock(id).lock_owned().await;
            self.held.insert(id, guard);
        }

        let Some(mut row) = self.shared.read().inventory.get(&id).cloned() else {
            self.held.remove(&id);
            return Ok(None);
        };
        if let Some((quantity, at)) = self.quantities.get(&id) {
            row = InventoryRecord::restore(id, row.warehouse_id(), row.product_id(), *quantity, row.created_at(), *at);
        }
        Ok(Some(row))
    }

    async fn set_quantity(
        &mut self,
        id: InventoryId,
        quantity: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if !self.held.contains_key(&id) {
            return Err(StoreError::Backend(format!("inventory {id} is not locked by this unit of work")));
        }
        self.quantities.insert(id, (quantity, updated_at));
        Ok(())
    }

    async fn insert_movement(
        &mut self,
        movement: NewMovement,
        timestamp: DateTime<Utc>,
    ) -> Result<MovementRecord, StoreError> {
        let id = MovementId::new(next(&self.shared.sequences.movement));
        let record = movement.into_record(id, timestamp);
        self.movements.push(record.clone());
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tables = self.shared.write();

        // Validate everything first so a failed commit applies nothing.
        for id in self.quantities.keys() {
            if !tables.inventory.contains_key(id) {
                return Err(StoreError::NotFound(format!("inventory {id}")));
            }
        }
        for movement in &self.movements {
            if !tables.inventory.contains_key(&movement.inventory_id) {
                return Err(StoreError::NotFound(format!("inventory {}", movement.inventory_id)));
            }
        }

        for (id, (quantity, at)) in &self.quantities {
            if let Some(row) = tables.inventory.get_mut(id) {
                *row = InventoryRecord::restore(
                    *id,
                    row.warehouse_id(),
                    row.product_id(),
                    *quantity,
                    row.created_at(),
                    *at,
                );
            }
        }
        for movement in &self.movements {
            tables.movements.insert(movement.id, movement.clone());
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
