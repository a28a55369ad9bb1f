//! Stock ledger: turns a movement into an atomic quantity change.
//!
//! ```text
//! begin ─▶ lock row ─▶ apply (IN +q / OUT -q / ADJUST =q) ─▶ set quantity ─▶ [insert movement] ─▶ commit
//!                │                                                                    │
//!                └──────────── any failure: rollback, nothing written ◀───────────────┘
//! ```
//!
//! Movements on one row serialize on the store's row lock; different rows never contend.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use stockflow_core::{DomainError, Entity, InventoryId};
use stockflow_inventory::{InventoryRecord, MovementRecord, MovementType, NewMovement};

use crate::store::{InventoryStore, StoreError, UnitOfWork};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error("inventory {0} not found")]
    InventoryNotFound(InventoryId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A committed movement and the row state it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedMovement {
    pub movement: MovementRecord,
    pub inventory: InventoryRecord,
}

#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn InventoryStore>,
}

impl StockLedger {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Change a row's quantity without writing a ledger entry.
    #[instrument(skip(self), fields(inventory_id = %inventory_id), err)]
    pub async fn apply_movement(
        &self,
        inventory_id: InventoryId,
        quantity: i64,
        movement_type: MovementType,
    ) -> Result<InventoryRecord, LedgerError> {
        let mut uow = self.store.begin().await?;
        match apply_locked(uow.as_mut(), inventory_id, quantity, movement_type).await {
            Ok(row) => {
                uow.commit().await?;
                Ok(row)
            }
            Err(e) => {
                abandon(uow).await;
                Err(e)
            }
        }
    }

    /// Write the movement and its quantity change in one unit of work.
    #[instrument(
        skip(self, new),
        fields(inventory_id = %new.inventory_id, movement_type = %new.movement_type, quantity = new.quantity),
        err
    )]
    pub async fn record_movement(&self, new: NewMovement) -> Result<RecordedMovement, LedgerError> {
        new.validate()?;

        let mut uow = self.store.begin().await?;
        let result = async {
            let inventory =
                apply_locked(uow.as_mut(), new.inventory_id, new.quantity, new.movement_type).await?;
            let movement = uow.insert_movement(new, inventory.updated_at()).await?;
            Ok::<_, LedgerError>(RecordedMovement { movement, inventory })
        }
        .await;

        match result {
            Ok(recorded) => {
                uow.commit().await?;
                debug!(
                    movement_id = %recorded.movement.id,
                    quantity = recorded.inventory.quantity(),
                    "movement recorded"
                );
                Ok(recorded)
            }
            Err(e) => {
                abandon(uow).await;
                Err(e)
            }
        }
    }
}

async fn apply_locked(
    uow: &mut dyn UnitOfWork,
    inventory_id: InventoryId,
    quantity: i64,
    movement_type: MovementType,
) -> Result<InventoryRecord, LedgerError> {
    let mut row = uow
        .lock_inventory(inventory_id)
        .await?
        .ok_or(LedgerError::InventoryNotFound(inventory_id))?;
    let updated = row.apply(movement_type, quantity, Utc::now())?;
    uow.set_quantity(row.id(), updated, row.updated_at()).await?;
    Ok(row)
}

async fn abandon(uow: Box<dyn UnitOfWork>) {
    if let Err(e) = uow.rollback().await {
        warn!("rollback failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryInventoryStore;
    use stockflow_inventory::{MovementFilter, NewInventory, NewProduct, NewWarehouse};

    async fn ledger_with_row() -> (StockLedger, Arc<InMemoryInventoryStore>, InventoryId) {
        let store = Arc::new(InMemoryInventoryStore::new());
        let w = store
            .create_warehouse(NewWarehouse { name: "W".into(), location: "L".into() })
            .await
            .unwrap();
        let p = store
            .create_product(NewProduct { name: "P".into(), description: String::new(), sku: "S".into() })
            .await
            .unwrap();
        let row = store
            .create_inventory(NewInventory { warehouse_id: w.id, product_id: p.id, quantity: 0 })
            .await
            .unwrap();
        (StockLedger::new(store.clone()), store, row.id())
    }

    fn movement(id: InventoryId, movement_type: MovementType, quantity: i64) -> NewMovement {
        NewMovement { inventory_id: id, movement_type, quantity }
    }

    #[tokio::test]
    async fn in_out_adjust_sequence() {
        let (ledger, store, id) = ledger_with_row().await;

        let after_in = ledger.record_movement(movement(id, MovementType::In, 10)).await.unwrap();
        assert_eq!(after_in.inventory.quantity(), 10);
        let after_out = ledger.record_movement(movement(id, MovementType::Out, 5)).await.unwrap();
        assert_eq!(after_out.inventory.quantity(), 5);
        let after_adjust = ledger.record_movement(movement(id, MovementType::Adjust, 30)).await.unwrap();
        assert_eq!(after_adjust.inventory.quantity(), 30);

        assert_eq!(store.get_inventory(id).await.unwrap().unwrap().quantity(), 30);
        let filter = MovementFilter { inventory_id: Some(id), movement_type: None };
        assert_eq!(store.list_movements(&filter).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn out_below_zero_is_not_clamped() {
        let (ledger, _, id) = ledger_with_row().await;
        let row = ledger.apply_movement(id, 3, MovementType::Out).await.unwrap();
        assert_eq!(row.quantity(), -3);
    }

    #[tokio::test]
    async fn missing_row_writes_nothing() {
        let (ledger, store, _) = ledger_with_row().await;
        let err = ledger
            .record_movement(movement(InventoryId::new(404), MovementType::In, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InventoryNotFound(id) if id == InventoryId::new(404)));
        assert!(store.list_movements(&MovementFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_quantity_is_rejected_before_any_write() {
        let (ledger, store, id) = ledger_with_row().await;
        let err = ledger.record_movement(movement(id, MovementType::In, 0)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Invalid(DomainError::Validation(_))));
        assert_eq!(store.get_inventory(id).await.unwrap().unwrap().quantity(), 0);
    }

    #[tokio::test]
    async fn overflowing_in_rolls_back() {
        let (ledger, store, id) = ledger_with_row().await;
        ledger.record_movement(movement(id, MovementType::In, i64::MAX)).await.unwrap();

        let err = ledger.record_movement(movement(id, MovementType::In, 1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Invalid(DomainError::Validation(_))));

        assert_eq!(store.get_inventory(id).await.unwrap().unwrap().quantity(), i64::MAX);
        let filter = MovementFilter { inventory_id: Some(id), movement_type: None };
        assert_eq!(store.list_movements(&filter).await.unwrap().len(), 1);

        // The row lock was released by the rollback.
        let row = ledger.apply_movement(id, 1, MovementType::Out).await.unwrap();
        assert_eq!(row.quantity(), i64::MAX - 1);
    }
}
