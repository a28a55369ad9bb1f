use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, InventoryId, ProductId, WarehouseId};
use stockflow_inventory::{InventoryFilter, MovementFilter, MovementType, ProductFilter, WarehouseFilter};

// -------------------------
// Response envelope
// -------------------------

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

pub fn data<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(DataResponse { data })).into_response()
}

// -------------------------
// Query strings
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct WarehouseQuery {
    pub name: Option<String>,
    pub location: Option<String>,
}

impl WarehouseQuery {
    pub fn into_filter(self) -> WarehouseFilter {
        WarehouseFilter {
            name: non_empty(self.name),
            location: non_empty(self.location),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub name: Option<String>,
    pub sku: Option<String>,
}

impl ProductQuery {
    pub fn into_filter(self) -> ProductFilter {
        ProductFilter {
            name: non_empty(self.name),
            sku: non_empty(self.sku),
        }
    }
}

/// Id filters arrive as strings so a bad value maps to our own 400 body.
#[derive(Debug, Default, Deserialize)]
pub struct InventoryQuery {
    pub warehouse_id: Option<String>,
    pub product_id: Option<String>,
}

impl InventoryQuery {
    pub fn into_filter(self) -> Result<InventoryFilter, DomainError> {
        Ok(InventoryFilter {
            warehouse_id: parse_opt::<WarehouseId>(self.warehouse_id)?,
            product_id: parse_opt::<ProductId>(self.product_id)?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub inventory_id: Option<String>,
    #[serde(rename = "type")]
    pub movement_type: Option<String>,
}

impl TransactionQuery {
    pub fn into_filter(self) -> Result<MovementFilter, DomainError> {
        Ok(MovementFilter {
            inventory_id: parse_opt::<InventoryId>(self.inventory_id)?,
            movement_type: parse_opt::<MovementType>(self.movement_type)?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_opt<T>(value: Option<String>) -> Result<Option<T>, DomainError>
where
    T: core::str::FromStr<Err = DomainError>,
{
    non_empty(value).map(|v| v.parse::<T>()).transpose()
}
