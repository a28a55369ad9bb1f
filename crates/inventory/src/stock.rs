use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, Entity, InventoryId, ProductId, WarehouseId};

use crate::movement::MovementType;

/// Stock level of one product in one warehouse.
///
/// `quantity` has no public setter; it changes only through [`InventoryRecord::apply`],
/// which the stock ledger calls inside its unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    id: InventoryId,
    warehouse_id: WarehouseId,
    product_id: ProductId,
    quantity: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// Rebuild a record from storage.
    pub fn restore(
        id: InventoryId,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: i64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            warehouse_id,
            product_id,
            quantity,
            created_at,
            updated_at,
        }
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Apply one movement and return the new quantity. On overflow the row is unchanged.
    pub fn apply(
        &mut self,
        movement_type: MovementType,
        quantity: i64,
        at: DateTime<Utc>,
    ) -> Result<i64, DomainError> {
        self.quantity = movement_type.apply(self.quantity, quantity)?;
        self.updated_at = at;
        Ok(self.quantity)
    }
}

impl Entity for InventoryRecord {
    type Id = InventoryId;

    fn id(&self) -> InventoryId {
        self.id
    }
}

/// Input for creating an inventory row. New rows always start empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInventory {
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    #[serde(default)]
    pub quantity: i64,
}

impl NewInventory {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.quantity != 0 {
            return Err(DomainError::validation(
                "inventory starts at zero; record an IN movement instead",
            ));
        }
        Ok(())
    }

    pub fn into_record(self, id: InventoryId, created_at: DateTime<Utc>) -> InventoryRecord {
        InventoryRecord::restore(id, self.warehouse_id, self.product_id, 0, created_at, created_at)
    }
}

/// Search predicate for inventory listings. Empty means "list all".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryFilter {
    pub warehouse_id: Option<WarehouseId>,
    pub product_id: Option<ProductId>,
}

impl InventoryFilter {
    pub fn is_empty(&self) -> bool {
        self.warehouse_id.is_none() && self.product_id.is_none()
    }

    pub fn matches(&self, record: &InventoryRecord) -> bool {
        self.warehouse_id.is_none_or(|w| record.warehouse_id == w)
            && self.product_id.is_none_or(|p| record.product_id == p)
    }
}
