//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Plain CRUD records (accounts, categories, contacts, warehouses) implement
/// this; records with a lifecycle implement [`AggregateRoot`](crate::AggregateRoot).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
