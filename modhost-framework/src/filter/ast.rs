//! Parsed representation of an LDAP-style filter.

use std::fmt;

/// Comparison operator of a simple (leaf) filter term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// `=`, possibly with `*` wildcards for substring matching.
    Equal,
    /// `<=`
    LessOrEqual,
    /// `>=`
    GreaterOrEqual,
    /// `~=`, an approximate (case/whitespace-insensitive) match.
    Approximate,
    /// `=*`, a presence test ignoring the value.
    Present,
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterOp::Equal => "=",
            FilterOp::LessOrEqual => "<=",
            FilterOp::GreaterOrEqual => ">=",
            FilterOp::Approximate => "~=",
            FilterOp::Present => "=*",
        };
        write!(f, "{s}")
    }
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Simple {
        key: String,
        op: FilterOp,
        value: String,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Simple { key, op, value } => {
                if *op == FilterOp::Present {
                    write!(f, "({key}=*)")
                } else {
                    write!(f, "({key}{op}{value})")
                }
            }
            Filter::And(children) => {
                write!(f, "(&")?;
                for c in children {
                    write!(f, "{c}")?;
                }
                write!(f, ")")
            }
            Filter::Or(children) => {
                write!(f, "(|")?;
                for c in children {
                    write!(f, "{c}")?;
                }
                write!(f, ")")
            }
            Filter::Not(inner) => write!(f, "(!{inner})"),
        }
    }
}
