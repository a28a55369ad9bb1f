//! `stockflow-core`: shared building blocks for the stock domain.
//!
//! Pure types only: identifiers, the domain error model and the `Entity` trait.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ConnectionId, InventoryId, MovementId, ProductId, WarehouseId};
