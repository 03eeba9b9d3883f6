//! The framework-wide lock serialising install/uninstall/refresh
//! against each other and against shutdown.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

/// A single framework holds one of these. Re-entrant so that a bundle
/// started while the lock is held (e.g. one bundle's `start`
/// transitively installing another) does not deadlock against its own
/// thread — the dependency-induced re-entrant case spec ยง4.6 calls
/// out as something the waiter discipline must detect rather than
/// hang on.
#[derive(Default)]
pub struct GlobalLock {
    inner: ReentrantMutex<()>,
}

pub struct GlobalLockGuard<'a> {
    _guard: ReentrantMutexGuard<'a, ()>,
}

impl GlobalLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> GlobalLockGuard<'_> {
        GlobalLockGuard {
            _guard: self.inner.lock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn reentrant_lock_from_same_thread_does_not_deadlock() {
        let lock = GlobalLock::new();
        let _outer = lock.lock();
        let _inner = lock.lock();
    }

    #[test]
    fn serialises_across_threads() {
        let lock = Arc::new(GlobalLock::new());
        let counter = Arc::new(parking_lot::Mutex::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    let _guard = lock.lock();
                    let mut c = counter.lock();
                    *c += 1;
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*counter.lock(), 8);
    }
}
