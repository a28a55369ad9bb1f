use tracing::info;

use stockflow_core::{Entity, InventoryId};
use stockflow_inventory::{InventoryFilter, InventoryRecord, NewInventory};

use super::{Change, ChangeOp, ChangeOrigin, ServiceContext, ServiceError};
use crate::cache::CacheKind;

const CREATE_AFFECTS: &[CacheKind] = &[CacheKind::Inventory];
const DELETE_AFFECTS: &[CacheKind] = &[CacheKind::Inventory, CacheKind::Transaction];

#[derive(Clone)]
pub struct InventoryService {
    ctx: ServiceContext,
}

impl InventoryService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn list(&self, filter: &InventoryFilter) -> Result<Vec<InventoryRecord>, ServiceError> {
        self.ctx
            .cached_list(CacheKind::Inventory, filter.is_empty(), || {
                self.ctx.store.list_inventory(filter)
            })
            .await
    }

    pub async fn get(&self, id: InventoryId) -> Result<InventoryRecord, ServiceError> {
        self.ctx
            .store
            .get_inventory(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("inventory {id}")))
    }

    /// New rows start at zero; stock arrives through IN movements.
    pub async fn create(&self, new: NewInventory, origin: &ChangeOrigin) -> Result<InventoryRecord, ServiceError> {
        new.validate()?;
        let record = self.ctx.store.create_inventory(new).await?;
        info!(
            inventory_id = %record.id(),
            warehouse_id = %record.warehouse_id(),
            product_id = %record.product_id(),
            "inventory created"
        );

        self.ctx
            .publish_change(
                Change {
                    kind: CacheKind::Inventory,
                    op: ChangeOp::Created,
                    id: record.id().get(),
                    affects: Some(CREATE_AFFECTS),
                },
                origin,
            )
            .await;
        Ok(record)
    }

    pub async fn delete(&self, id: InventoryId, origin: &ChangeOrigin) -> Result<(), ServiceError> {
        if !self.ctx.store.delete_inventory(id).await? {
            return Err(ServiceError::NotFound(format!("inventory {id}")));
        }
        info!(inventory_id = %id, "inventory deleted");

        self.ctx
            .publish_change(
                Change {
                    kind: CacheKind::Inventory,
                    op: ChangeOp::Deleted,
                    id: id.get(),
                    affects: Some(DELETE_AFFECTS),
                },
                origin,
            )
            .await;
        Ok(())
    }
}
