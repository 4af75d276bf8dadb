//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. A
/// `StockKey { item_code: "ITEM-A", warehouse: "WH-1" }` is a value object: two
/// keys naming the same item and warehouse are the same key, wherever they were
/// built.
///
/// ```ignore
/// let a = StockKey::new("ITEM-A", "WH-1");
/// let b = StockKey::new("ITEM-A", "WH-1");
/// assert_eq!(a, b);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
