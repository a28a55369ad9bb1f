use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, Entity, WarehouseId};

/// A physical storage location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

impl Entity for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> WarehouseId {
        self.id
    }
}

/// Input for creating a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWarehouse {
    pub name: String,
    pub location: String,
}

impl NewWarehouse {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("warehouse name is required"));
        }
        if self.location.trim().is_empty() {
            return Err(DomainError::validation("warehouse location is required"));
        }
        Ok(())
    }

    pub fn into_warehouse(self, id: WarehouseId, created_at: DateTime<Utc>) -> Warehouse {
        Warehouse {
            id,
            name: self.name.trim().to_string(),
            location: self.location.trim().to_string(),
            created_at,
        }
    }
}

/// Search predicate for warehouse listings. Empty means "list all".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseFilter {
    pub name: Option<String>,
    pub location: Option<String>,
}

impl WarehouseFilter {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.location.is_none()
    }

    pub fn matches(&self, warehouse: &Warehouse) -> bool {
        self.name.as_deref().is_none_or(|n| crate::contains_ci(&warehouse.name, n))
            && self
                .location
                .as_deref()
                .is_none_or(|l| crate::contains_ci(&warehouse.location, l))
    }
}
