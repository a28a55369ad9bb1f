//! Stock movements: the append-only ledger and its quantity arithmetic.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, Entity, InventoryId, MovementId};

/// Kind of stock movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementType {
    #[serde(rename = "IN", alias = "in")]
    In,
    #[serde(rename = "OUT", alias = "out")]
    Out,
    #[serde(rename = "ADJUST", alias = "adjust")]
    Adjust,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Adjust => "ADJUST",
        }
    }

    /// Quantity after applying a movement of `quantity` to `current`.
    ///
    /// `OUT` is not clamped at zero: stock may go negative. A result outside `i64` is a
    /// validation error.
    pub fn apply(self, current: i64, quantity: i64) -> Result<i64, DomainError> {
        let next = match self {
            MovementType::In => current.checked_add(quantity),
            MovementType::Out => current.checked_sub(quantity),
            MovementType::Adjust => Some(quantity),
        };
        next.ok_or_else(|| {
            DomainError::validation(format!("{self} {quantity} overflows quantity {current}"))
        })
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" => Ok(MovementType::In),
            "OUT" => Ok(MovementType::Out),
            "ADJUST" => Ok(MovementType::Adjust),
            other => Err(DomainError::validation(format!(
                "movement type must be one of IN, OUT, ADJUST (got '{other}')"
            ))),
        }
    }
}

/// Fold a sequence of movements over a starting quantity. Stops at the first overflow.
pub fn fold_movements(
    start: i64,
    movements: impl IntoIterator<Item = (MovementType, i64)>,
) -> Result<i64, DomainError> {
    movements
        .into_iter()
        .try_fold(start, |qty, (kind, amount)| kind.apply(qty, amount))
}

/// Ledger entry. Immutable once committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    pub inventory_id: InventoryId,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub quantity: i64,
    pub timestamp: DateTime<Utc>,
}

impl Entity for MovementRecord {
    type Id = MovementId;

    fn id(&self) -> MovementId {
        self.id
    }
}

/// Input for recording a movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub inventory_id: InventoryId,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub quantity: i64,
}

impl NewMovement {
    /// `IN`/`OUT` need a positive amount; `ADJUST` may set stock to zero.
    pub fn validate(&self) -> Result<(), DomainError> {
        match self.movement_type {
            MovementType::In | MovementType::Out if self.quantity <= 0 => Err(
                DomainError::validation(format!("{} quantity must be positive", self.movement_type)),
            ),
            MovementType::Adjust if self.quantity < 0 => {
                Err(DomainError::validation("ADJUST quantity cannot be negative"))
            }
            _ => Ok(()),
        }
    }

    pub fn into_record(self, id: MovementId, timestamp: DateTime<Utc>) -> MovementRecord {
        MovementRecord {
            id,
            inventory_id: self.inventory_id,
            movement_type: self.movement_type,
            quantity: self.quantity,
            timestamp,
        }
    }
}

/// Search predicate for movement listings. Empty means "list all".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub inventory_id: Option<InventoryId>,
    pub movement_type: Option<MovementType>,
}

impl MovementFilter {
    pub fn is_empty(&self) -> bool {
        self.inventory_id.is_none() && self.movement_type.is_none()
    }

    pub fn matches(&self, movement: &MovementRecord) -> bool {
        self.inventory_id.is_none_or(|id| movement.inventory_id == id)
            && self.movement_type.is_none_or(|t| movement.movement_type == t)
    }
}
