use tracing::info;

use stockflow_core::WarehouseId;
use stockflow_inventory::{NewWarehouse, Warehouse, WarehouseFilter};

use super::{Change, ChangeOp, ChangeOrigin, ServiceContext, ServiceError};
use crate::cache::CacheKind;

const CREATE_AFFECTS: &[CacheKind] = &[CacheKind::Warehouse];

/// Deleting a warehouse takes its inventory rows and their movements with it.
const DELETE_AFFECTS: &[CacheKind] = &[CacheKind::Warehouse, CacheKind::Inventory, CacheKind::Transaction];

#[derive(Clone)]
pub struct WarehouseService {
    ctx: ServiceContext,
}

impl WarehouseService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn list(&self, filter: &WarehouseFilter) -> Result<Vec<Warehouse>, ServiceError> {
        self.ctx
            .cached_list(CacheKind::Warehouse, filter.is_empty(), || {
                self.ctx.store.list_warehouses(filter)
            })
            .await
    }

    pub async fn get(&self, id: WarehouseId) -> Result<Warehouse, ServiceError> {
        self.ctx
            .store
            .get_warehouse(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("warehouse {id}")))
    }

    pub async fn create(&self, new: NewWarehouse, origin: &ChangeOrigin) -> Result<Warehouse, ServiceError> {
        new.validate()?;
        let warehouse = self.ctx.store.create_warehouse(new).await?;
        info!(warehouse_id = %warehouse.id, "warehouse created");

        self.ctx
            .publish_change(
                Change {
                    kind: CacheKind::Warehouse,
                    op: ChangeOp::Created,
                    id: warehouse.id.get(),
                    affects: Some(CREATE_AFFECTS),
                },
                origin,
            )
            .await;
        Ok(warehouse)
    }

    pub async fn delete(&self, id: WarehouseId, origin: &ChangeOrigin) -> Result<(), ServiceError> {
        if !self.ctx.store.delete_warehouse(id).await? {
            return Err(ServiceError::NotFound(format!("warehouse {id}")));
        }
        info!(warehouse_id = %id, "warehouse deleted");

        self.ctx
            .publish_change(
                Change {
                    kind: CacheKind::Warehouse,
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
