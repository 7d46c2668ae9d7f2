//! Type-erased property values.
//!
//! Sort keys and group keys address item properties by name; the value that
//! comes back is a [`PropertyValue`]. The variants cover the value kinds the
//! shaping engine can order and group on.

use std::cmp::Ordering;
use std::fmt;

/// A type-erased value read from a named item property.
///
/// Returned by [`ViewItem::property`](crate::ViewItem::property) and used as
/// both sort key material and group key. Values of mismatched kinds compare
/// as equal, so a heterogeneous property sorts only within each kind.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// No value. Properties an item does not expose resolve to this.
    None,
    /// A boolean value.
    Bool(bool),
    /// A signed integer value.
    Int(i64),
    /// A floating-point value.
    Float(f64),
    /// A string value.
    String(String),
}

impl PropertyValue {
    /// Returns the string value, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the float value, if this is a `Float`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns `true` if this is [`PropertyValue::None`].
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Compares two property values for sorting and group-key matching.
///
/// Same-kind values use their natural order (floats via `partial_cmp`, NaN
/// comparing equal to everything). Mismatched kinds, and `None` against
/// anything, compare as `Equal`.
pub fn compare_values(a: &PropertyValue, b: &PropertyValue) -> Ordering {
    match (a, b) {
        (PropertyValue::String(sa), PropertyValue::String(sb)) => sa.cmp(sb),
        (PropertyValue::Int(ia), PropertyValue::Int(ib)) => ia.cmp(ib),
        (PropertyValue::Float(fa), PropertyValue::Float(fb)) => {
            fa.partial_cmp(fb).unwrap_or(Ordering::Equal)
        }
        (PropertyValue::Bool(ba), PropertyValue::Bool(bb)) => ba.cmp(bb),
        _ => Ordering::Equal,
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, ""),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<usize> for PropertyValue {
    fn from(value: usize) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<V: Into<PropertyValue>> From<Option<V>> for PropertyValue {
    fn from(value: Option<V>) -> Self {
        value.map(Into::into).unwrap_or(Self::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_kind_ordering() {
        assert_eq!(
            compare_values(&"a".into(), &"b".into()),
            Ordering::Less
        );
        assert_eq!(compare_values(&3.into(), &3.into()), Ordering::Equal);
        assert_eq!(
            compare_values(&PropertyValue::Float(2.5), &PropertyValue::Float(1.0)),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(&false.into(), &true.into()),
            Ordering::Less
        );
    }

    #[test]
    fn test_mismatched_kinds_compare_equal() {
        assert_eq!(
            compare_values(&1.into(), &"1".into()),
            Ordering::Equal
        );
        assert_eq!(
            compare_values(&PropertyValue::None, &42.into()),
            Ordering::Equal
        );
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(PropertyValue::from("West").to_string(), "West");
        assert_eq!(PropertyValue::from(7).to_string(), "7");
        assert_eq!(PropertyValue::None.to_string(), "");
    }
}
