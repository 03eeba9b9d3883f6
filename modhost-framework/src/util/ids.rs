//! Monotonic identifier generation.
//!
//! Service ids and bundle ids are both "unique and strictly increasing
//! for the life of the process" (spec ยง3), which rules out UUIDs —
//! ordering matters for the ranking tie-break (lowest id wins) and for
//! the "strictly increasing" testable property. A single atomic
//! counter per framework instance realizes both.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// A generator of strictly increasing 64-bit ids, starting at `start`.
#[derive(Debug)]
pub struct IdSequence {
    next: AtomicI64,
}

impl IdSequence {
    /// Creates a sequence whose first `next()` call returns `start`.
    pub const fn starting_at(start: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
        }
    }

    /// Returns the next id and advances the sequence.
    pub fn next(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// Unique id of a service entry in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceId(pub i64);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique id of a bundle. The framework bundle always has id 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BundleId(pub i64);

impl BundleId {
    /// The id reserved for the framework's own pseudo-bundle.
    pub const FRAMEWORK: BundleId = BundleId(0);

    pub fn is_framework(self) -> bool {
        self == Self::FRAMEWORK
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id handed out to a tracker when it is opened, scoped to the bundle
/// context that opened it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackerId(pub i64);

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_starts_and_increments() {
        let seq = IdSequence::starting_at(1);
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.next(), 3);
    }

    #[test]
    fn sequence_default_starts_at_one() {
        let seq = IdSequence::default();
        assert_eq!(seq.next(), 1);
    }

    #[test]
    fn framework_bundle_id_is_zero() {
        assert!(BundleId::FRAMEWORK.is_framework());
        assert_eq!(BundleId::FRAMEWORK.0, 0);
        assert!(!BundleId(1).is_framework());
    }

    #[test]
    fn ids_are_ordered() {
        assert!(ServiceId(1) < ServiceId(2));
        assert!(BundleId(5) > BundleId(4));
    }
}
