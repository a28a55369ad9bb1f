//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Stored records (warehouses, products, inventory rows, movements) implement this so
/// storage adapters can index them generically.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
