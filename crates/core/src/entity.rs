//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Reservation records are entities: a record keeps its identity while its
/// delivered quantity and status move through the lifecycle.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
