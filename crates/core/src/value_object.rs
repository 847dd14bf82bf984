//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. A
/// [`crate::Upc`] or a [`crate::TenantName`] carries no identity beyond its
/// value: two instances built from the same text are interchangeable, which is
/// what lets them be used directly as store keys.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
