//! FIFO delivery of bundle-changed and framework events.
//!
//! A dedicated `tokio` task drains an unbounded `mpsc` channel of
//! boxed closures, each already bound to a snapshot of the listeners
//! it must invoke. This is the structured-concurrency stand-in for
//! the single dispatcher thread spec ยง4.8 describes — service events
//! bypass this entirely and are delivered synchronously by the
//! registry (spec ยง4.4/ยง4.8), since trackers are designed to receive
//! them on the calling thread.

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send>;

pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl EventDispatcher {
    /// Spawns the dispatcher task. Must be called from within a
    /// `tokio` runtime.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
        });
        Self { tx }
    }

    /// Enqueues a job. Jobs run in the order they were enqueued,
    /// never concurrently with each other.
    pub fn dispatch(&self, job: Job) {
        // The receiver only disappears once the dispatcher task itself
        // has exited (e.g. mid framework shutdown); a late dispatch is
        // silently dropped rather than treated as an error.
        let _ = self.tx.send(job);
    }

    /// Enqueues a sentinel and waits for it to run, i.e. waits for
    /// every job enqueued before this call to have drained. Used by
    /// framework shutdown in place of joining a dispatcher thread.
    pub async fn drain(&self) {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        self.dispatch(Box::new(move || {
            let _ = done_tx.send(());
        }));
        let _ = done_rx.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn jobs_run_in_fifo_order() {
        let dispatcher = EventDispatcher::spawn();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            dispatcher.dispatch(Box::new(move || order.lock().push(i)));
        }
        dispatcher.drain().await;
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn drain_waits_for_prior_jobs() {
        let dispatcher = EventDispatcher::spawn();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        dispatcher.dispatch(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        dispatcher.drain().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
