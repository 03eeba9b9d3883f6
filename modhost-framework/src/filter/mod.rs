//! LDAP-style predicate parsing and evaluation over attribute maps.
//!
//! Grammar, operators and evaluation semantics are as specified: `=*`
//! is a presence test, `=` with an embedded `*` is a substring match,
//! absent attributes fail every comparison operator, and comparisons
//! are coerced according to the attribute's stored [`PropertyValue`]
//! variant (string lexicographic, integer numeric, version
//! dotted-tuple).

mod ast;
mod parser;

pub use ast::{Filter as FilterAst, FilterOp};
pub use parser::FilterError;

use std::cmp::Ordering;

use crate::properties::{Properties, PropertyValue, Version};

/// A parsed, reusable filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter(FilterAst);

impl Filter {
    /// Parses a filter string. See module docs for the grammar.
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        Ok(Filter(parser::parse(input)?))
    }

    /// Evaluates the filter against an attribute map.
    pub fn matches(&self, props: &Properties) -> bool {
        eval(&self.0, props)
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn eval(node: &FilterAst, props: &Properties) -> bool {
    match node {
        FilterAst::And(children) => children.iter().all(|c| eval(c, props)),
        FilterAst::Or(children) => children.iter().any(|c| eval(c, props)),
        FilterAst::Not(inner) => !eval(inner, props),
        FilterAst::Simple { key, op, value } => match props.get(key) {
            None => false,
            Some(attr) => eval_leaf(attr, *op, value),
        },
    }
}

fn eval_leaf(attr: &PropertyValue, op: FilterOp, value: &str) -> bool {
    match op {
        FilterOp::Present => true,
        FilterOp::Equal => eval_equal(attr, value),
        FilterOp::LessOrEqual => eval_compare(attr, value) == Some(Ordering::Less) || eval_compare(attr, value) == Some(Ordering::Equal),
        FilterOp::GreaterOrEqual => {
            matches!(eval_compare(attr, value), Some(Ordering::Greater) | Some(Ordering::Equal))
        }
        FilterOp::Approximate => eval_approx(attr, value),
    }
}

fn eval_equal(attr: &PropertyValue, value: &str) -> bool {
    if let PropertyValue::Array(items) = attr {
        return items.iter().any(|item| eval_equal(item, value));
    }
    if value.contains('*') {
        return wildcard_match(&attr.to_value_string(), value);
    }
    match attr {
        PropertyValue::Str(s) => s == value,
        PropertyValue::Long(n) => value.parse::<i64>().map(|v| v == *n).unwrap_or(false),
        PropertyValue::Double(d) => value.parse::<f64>().map(|v| v == *d).unwrap_or(false),
        PropertyValue::Bool(b) => value.parse::<bool>().map(|v| v == *b).unwrap_or(false),
        PropertyValue::Version(v) => Version::parse(value).map(|parsed| &parsed == v).unwrap_or(false),
        PropertyValue::Array(_) => unreachable!("handled above"),
    }
}

fn eval_compare(attr: &PropertyValue, value: &str) -> Option<Ordering> {
    match attr {
        PropertyValue::Array(items) => items.iter().find_map(|item| eval_compare(item, value)),
        PropertyValue::Str(s) => Some(s.as_str().cmp(value)),
        PropertyValue::Long(n) => value.parse::<i64>().ok().map(|v| n.cmp(&v)),
        PropertyValue::Double(d) => value.parse::<f64>().ok().and_then(|v| d.partial_cmp(&v)),
        PropertyValue::Version(v) => Version::parse(value).map(|parsed| v.cmp(&parsed)),
        PropertyValue::Bool(_) => None,
    }
}

fn eval_approx(attr: &PropertyValue, value: &str) -> bool {
    let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    normalize(&attr.to_value_string()) == normalize(value)
}

/// `*`-wildcard substring match: `pattern` may have leading/trailing/
/// interior `*` segments that must appear, in order, in `haystack`.
fn wildcard_match(haystack: &str, pattern: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return haystack == pattern;
    }

    let mut cursor = 0usize;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            if !haystack[cursor..].starts_with(segment) {
                return false;
            }
            cursor += segment.len();
        } else if i == segments.len() - 1 {
            return haystack[cursor..].ends_with(segment);
        } else {
            match haystack[cursor..].find(segment) {
                Some(pos) => cursor += pos + segment.len(),
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props_with(pairs: &[(&str, PropertyValue)]) -> Properties {
        let mut p = Properties::new();
        for (k, v) in pairs {
            p.set(*k, v.clone());
        }
        p
    }

    #[test]
    fn equality_match() {
        let f = Filter::parse("(service.name=com.example.Foo)").unwrap();
        let p = props_with(&[("service.name", PropertyValue::Str("com.example.Foo".into()))]);
        assert!(f.matches(&p));
    }

    #[test]
    fn absent_attribute_fails_every_comparator() {
        let p = Properties::new();
        assert!(!Filter::parse("(x=1)").unwrap().matches(&p));
        assert!(!Filter::parse("(x<=1)").unwrap().matches(&p));
        assert!(!Filter::parse("(x>=1)").unwrap().matches(&p));
        assert!(!Filter::parse("(x~=1)").unwrap().matches(&p));
        assert!(!Filter::parse("(x=*)").unwrap().matches(&p));
    }

    #[test]
    fn presence_test() {
        let p = props_with(&[("x", PropertyValue::Long(0))]);
        assert!(Filter::parse("(x=*)").unwrap().matches(&p));
    }

    #[test]
    fn numeric_comparison_is_numeric_not_lexicographic() {
        let p = props_with(&[("x", PropertyValue::Long(9))]);
        // Lexicographically "9" > "10", numerically 9 < 10.
        assert!(Filter::parse("(x<=10)").unwrap().matches(&p));
        assert!(!Filter::parse("(x<=8)").unwrap().matches(&p));
    }

    #[test]
    fn version_comparison() {
        let p = props_with(&[(
            "bundle.version",
            PropertyValue::Version(Version::parse("1.2.3").unwrap()),
        )]);
        assert!(Filter::parse("(bundle.version>=1.2.0)").unwrap().matches(&p));
        assert!(!Filter::parse("(bundle.version>=1.10.0)").unwrap().matches(&p));
    }

    #[test]
    fn substring_wildcard_match() {
        let p = props_with(&[("name", PropertyValue::Str("hello-world".into()))]);
        assert!(Filter::parse("(name=hello*)").unwrap().matches(&p));
        assert!(Filter::parse("(name=*world)").unwrap().matches(&p));
        assert!(Filter::parse("(name=*lo-wo*)").unwrap().matches(&p));
        assert!(!Filter::parse("(name=*nope*)").unwrap().matches(&p));
    }

    #[test]
    fn approximate_match_ignores_case_and_whitespace() {
        let p = props_with(&[("x", PropertyValue::Str("Hello   World".into()))]);
        assert!(Filter::parse("(x~=hello world)").unwrap().matches(&p));
    }

    #[test]
    fn compound_and_or_not() {
        let p = props_with(&[
            ("a", PropertyValue::Long(1)),
            ("b", PropertyValue::Long(2)),
        ]);
        assert!(Filter::parse("(&(a=1)(b=2))").unwrap().matches(&p));
        assert!(!Filter::parse("(&(a=1)(b=3))").unwrap().matches(&p));
        assert!(Filter::parse("(|(a=9)(b=2))").unwrap().matches(&p));
        assert!(Filter::parse("(!(a=9))").unwrap().matches(&p));
    }

    #[test]
    fn array_value_matches_any_element() {
        let p = props_with(&[(
            "topics",
            PropertyValue::Array(vec![
                PropertyValue::Str("a/b".into()),
                PropertyValue::Str("c/d".into()),
            ]),
        )]);
        assert!(Filter::parse("(topics=c/d)").unwrap().matches(&p));
        assert!(!Filter::parse("(topics=z/z)").unwrap().matches(&p));
    }

    #[test]
    fn display_round_trips_canonical_form() {
        let f = Filter::parse("(service.name=X)").unwrap();
        assert_eq!(f.to_string(), "(service.name=X)");
    }
}
