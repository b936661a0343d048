//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. Observations,
/// signatures and forecast results are all values: two with the same
/// attributes are interchangeable, which is what makes content-addressed
/// caching of them sound.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct Horizon(usize);
///
/// impl ValueObject for Horizon {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
