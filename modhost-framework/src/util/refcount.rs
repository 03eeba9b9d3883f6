//! Atomic reference-counted handle primitive.
//!
//! Backs service registrations and service references. Unlike `Arc`,
//! `RefCounted` does not own the payload directly — it drives a caller
//! supplied release closure exactly once, when the count reaches zero,
//! which lets the registry and the tracker decide what "released"
//! means (remove from a table, wake a condition, etc).

use std::fmt;
use std::sync::atomic::{AtomicIsize, Ordering};

/// An atomic counter with acquire/release semantics and a one-shot
/// release callback.
///
/// `acquire` is a programming error once the count has reached zero —
/// the debug build asserts it; the release build saturates instead of
/// wrapping, since a stray extra `acquire` after release is always a
/// caller bug, not a condition to recover from.
pub struct RefCounted<F: FnOnce()> {
    count: AtomicIsize,
    on_release: parking_lot::Mutex<Option<F>>,
}

impl<F: FnOnce()> fmt::Debug for RefCounted<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefCounted")
            .field("count", &self.count.load(Ordering::SeqCst))
            .finish()
    }
}

impl<F: FnOnce()> RefCounted<F> {
    /// Initializes the counter to 1 with the given release callback.
    pub fn new(on_release: F) -> Self {
        Self {
            count: AtomicIsize::new(1),
            on_release: parking_lot::Mutex::new(Some(on_release)),
        }
    }

    /// Increments the count. Asserts the handle has not already been
    /// released to zero.
    pub fn acquire(&self) -> isize {
        let previous = self.count.fetch_add(1, Ordering::AcqRel);
        debug_assert!(
            previous > 0,
            "acquire called on a RefCounted handle that already reached zero"
        );
        previous + 1
    }

    /// Increments the count unless it has already reached zero,
    /// returning `false` in that case instead of asserting.
    ///
    /// For callers that cannot otherwise rule out a concurrent release
    /// winning the race to zero (e.g. a tracker handing out a tracked
    /// entry just as the registry unregisters it) — an ordinary
    /// `acquire` would be a false-positive "programming error".
    pub fn try_acquire(&self) -> bool {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current <= 0 {
                return false;
            }
            match self
                .count
                .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Decrements the count. Invokes the release callback exactly once,
    /// the first time the count reaches zero.
    pub fn release(&self) -> isize {
        let previous = self.count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "RefCounted count underflowed");
        let remaining = previous - 1;
        if remaining == 0 {
            if let Some(cb) = self.on_release.lock().take() {
                cb();
            }
        }
        remaining
    }

    /// Current count, for diagnostics and tests. Not linearizable with
    /// concurrent acquire/release — use only as a hint.
    pub fn count(&self) -> isize {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn starts_at_one() {
        let rc = RefCounted::new(|| {});
        assert_eq!(rc.count(), 1);
    }

    #[test]
    fn release_invokes_callback_once() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let rc = RefCounted::new(move || flag.store(true, Ordering::SeqCst));

        rc.acquire();
        assert!(!released.load(Ordering::SeqCst));
        rc.release();
        assert!(!released.load(Ordering::SeqCst));
        rc.release();
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn release_below_zero_only_fires_once() {
        let fires = Arc::new(AtomicIsize::new(0));
        let counter = fires.clone();
        let rc = RefCounted::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        rc.release();
        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn try_acquire_fails_once_released_to_zero() {
        let rc = RefCounted::new(|| {});
        rc.release();
        assert_eq!(rc.count(), 0);
        assert!(!rc.try_acquire());
    }

    #[test]
    fn try_acquire_succeeds_while_count_is_positive() {
        let rc = RefCounted::new(|| {});
        assert!(rc.try_acquire());
        assert_eq!(rc.count(), 2);
    }

    #[test]
    fn acquire_release_roundtrip() {
        let rc = RefCounted::new(|| {});
        rc.acquire();
        rc.acquire();
        assert_eq!(rc.count(), 3);
        rc.release();
        assert_eq!(rc.count(), 2);
        rc.release();
        rc.release();
        assert_eq!(rc.count(), 0);
    }
}
