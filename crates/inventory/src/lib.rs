//! Inventory domain module.
//!
//! Warehouses, products, per-warehouse stock rows and the movement ledger, implemented
//! as deterministic domain logic (no IO, no HTTP, no storage).

pub mod movement;
pub mod product;
pub mod stock;
pub mod warehouse;

pub use movement::{MovementFilter, MovementRecord, MovementType, NewMovement, fold_movements};
pub use product::{NewProduct, Product, ProductFilter};
pub use stock::{InventoryFilter, InventoryRecord, NewInventory};
pub use warehouse::{NewWarehouse, Warehouse, WarehouseFilter};

/// Case-insensitive substring match used by the list filters.
pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
