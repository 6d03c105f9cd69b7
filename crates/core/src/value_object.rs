//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value** — a price quote
/// or a shipping address has no identity of its own; two with the same
/// fields are the same value. To "modify" one, build a new one.
///
/// The bounds keep value objects cheap to copy, comparable by their
/// attributes, and debuggable.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
