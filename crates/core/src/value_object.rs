//! Value object marker: compared by value, never mutated in place.

/// Marker trait for validated values (`BrandColor`, `Email`).
///
/// Implementors validate in their constructor, so holding one means the
/// value already passed its rules. To "change" a value object, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
