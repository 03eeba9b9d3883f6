//! Typed values stored in a [`super::Properties`] map.

use std::cmp::Ordering;
use std::fmt;

/// A version number compared component-wise as a dotted tuple, e.g.
/// `1.2.3 < 1.10.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version(pub Vec<u64>);

impl Version {
    /// Parses a dotted-decimal version string such as `"1.2.3"`.
    ///
    /// Returns `None` if any component is not a non-negative integer.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        let mut parts = Vec::new();
        for segment in s.split('.') {
            parts.push(segment.parse::<u64>().ok()?);
        }
        Some(Version(parts))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{joined}")
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let max_len = self.0.len().max(other.0.len());
        for i in 0..max_len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

/// The typed value of a property.
///
/// Filter evaluation coerces comparisons according to the variant held
/// here: `Str` compares lexicographically, `Long`/`Double` compare
/// numerically, `Version` compares by dotted-tuple order, `Bool` only
/// supports equality, and `Array` matches if any element matches.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Str(String),
    Long(i64),
    Double(f64),
    Bool(bool),
    Version(Version),
    Array(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Renders the value the way it would appear on the right-hand
    /// side of a `key=value` properties line (array elements joined by
    /// commas, matching the one save format the codec round-trips).
    pub fn to_value_string(&self) -> String {
        match self {
            PropertyValue::Str(s) => s.clone(),
            PropertyValue::Long(n) => n.to_string(),
            PropertyValue::Double(d) => d.to_string(),
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::Version(v) => v.to_string(),
            PropertyValue::Array(items) => items
                .iter()
                .map(|v| v.to_value_string())
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            PropertyValue::Long(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Str(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Str(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Long(n)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parses_dotted_tuple() {
        let v = Version::parse("1.2.3").unwrap();
        assert_eq!(v.0, vec![1, 2, 3]);
    }

    #[test]
    fn version_orders_by_component_not_lexicographically() {
        let a = Version::parse("1.2.3").unwrap();
        let b = Version::parse("1.10.0").unwrap();
        assert!(a < b);
    }

    #[test]
    fn version_rejects_non_numeric() {
        assert!(Version::parse("1.x.3").is_none());
        assert!(Version::parse("").is_none());
    }

    #[test]
    fn property_value_conversions() {
        let v: PropertyValue = "hello".into();
        assert_eq!(v.as_str(), Some("hello"));

        let v: PropertyValue = 42i64.into();
        assert_eq!(v.as_long(), Some(42));
    }

    #[test]
    fn array_value_string_is_comma_joined() {
        let v = PropertyValue::Array(vec![
            PropertyValue::Long(1),
            PropertyValue::Long(2),
            PropertyValue::Long(3),
        ]);
        assert_eq!(v.to_value_string(), "1,2,3");
    }
}
