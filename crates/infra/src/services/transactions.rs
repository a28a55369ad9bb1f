use tracing::info;

use stockflow_core::MovementId;
use stockflow_inventory::{MovementFilter, MovementRecord, NewMovement};

use super::{Change, ChangeOp, ChangeOrigin, ServiceContext, ServiceError};
use crate::cache::CacheKind;
use crate::ledger::{RecordedMovement, StockLedger};

/// A movement changes its row's quantity, so both listings go stale.
const CREATE_AFFECTS: &[CacheKind] = &[CacheKind::Transaction, CacheKind::Inventory];

/// Movements are append-only: there is no update or delete.
#[derive(Clone)]
pub struct TransactionService {
    ctx: ServiceContext,
    ledger: StockLedger,
}

impl TransactionService {
    pub fn new(ctx: ServiceContext, ledger: StockLedger) -> Self {
        Self { ctx, ledger }
    }

    pub async fn list(&self, filter: &MovementFilter) -> Result<Vec<MovementRecord>, ServiceError> {
        self.ctx
            .cached_list(CacheKind::Transaction, filter.is_empty(), || {
                self.ctx.store.list_movements(filter)
            })
            .await
    }

    pub async fn get(&self, id: MovementId) -> Result<MovementRecord, ServiceError> {
        self.ctx
            .store
            .get_movement(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("transaction {id}")))
    }

    pub async fn create(&self, new: NewMovement, origin: &ChangeOrigin) -> Result<RecordedMovement, ServiceError> {
        let recorded = self.ledger.record_movement(new).await?;
        info!(
            movement_id = %recorded.movement.id,
            inventory_id = %recorded.movement.inventory_id,
            movement_type = %recorded.movement.movement_type,
            quantity = recorded.movement.quantity,
            new_quantity = recorded.inventory.quantity(),
            "transaction recorded"
        );

        self.ctx
            .publish_change(
                Change {
                    kind: CacheKind::Transaction,
                    op: ChangeOp::Created,
                    id: recorded.movement.id.get(),
                    affects: Some(CREATE_AFFECTS),
                },
                origin,
            )
            .await;
        Ok(recorded)
    }
}
