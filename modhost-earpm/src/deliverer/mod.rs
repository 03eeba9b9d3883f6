//! A bounded worker pool for synchronous event delivery.
//!
//! Workers invoke the local event-admin's `send_event` and then the
//! caller's done-callback with the status. `post_event` bypasses the
//! queue entirely and is not modeled here — it is a direct call on
//! `EventAdmin` from the remote provider's outbound path.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::errors::EarpmError;
use modhost_framework::properties::Properties;

/// The local sink for delivered events — the framework's event-admin
/// service, as seen by the deliverer. Implemented by whatever bundle
/// registers the event-admin service type; the deliverer only ever
/// sees this trait.
pub trait EventAdmin: Send + Sync {
    fn send_event(&self, topic: &str, properties: &Properties) -> Result<(), EarpmError>;
}

type DoneCallback = Box<dyn FnOnce(Result<(), EarpmError>) + Send>;

struct DeliveryRequest {
    topic: String,
    properties: Properties,
    done: Option<DoneCallback>,
}

/// Configurable 1..20 worker pool (default 5) draining a bounded queue
/// of synchronous delivery requests.
pub struct EventDeliverer {
    sender: mpsc::Sender<DeliveryRequest>,
    event_admin: Arc<parking_lot::RwLock<Option<Arc<dyn EventAdmin>>>>,
}

impl EventDeliverer {
    /// Spawns `worker_count` tasks draining a queue of `queue_capacity`
    /// slots. `worker_count` is clamped to `1..=20` per spec.
    pub fn start(worker_count: usize, queue_capacity: usize) -> Self {
        let worker_count = worker_count.clamp(1, 20);
        let (sender, receiver) = mpsc::channel::<DeliveryRequest>(queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let event_admin: Arc<parking_lot::RwLock<Option<Arc<dyn EventAdmin>>>> = Arc::new(parking_lot::RwLock::new(None));

        for worker_id in 0..worker_count {
            let receiver = receiver.clone();
            let event_admin = event_admin.clone();
            tokio::spawn(async move {
                loop {
                    let request = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };
                    let Some(mut request) = request else {
                        break;
                    };
                    let result = match event_admin.read().clone() {
                        Some(admin) => admin.send_event(&request.topic, &request.properties),
                        None => Err(EarpmError::illegal_state("no event-admin registered")),
                    };
                    if let Err(ref err) = result {
                        warn!(worker_id, topic = %request.topic, error = %err, "event delivery failed");
                    }
                    if let Some(done) = request.done.take() {
                        done(result);
                    }
                }
            });
        }

        Self { sender, event_admin }
    }

    pub fn set_event_admin(&self, admin: Option<Arc<dyn EventAdmin>>) {
        *self.event_admin.write() = admin;
    }

    /// Enqueues a synchronous delivery request. Returns `Enomem` if the
    /// queue is full rather than blocking the caller indefinitely.
    pub fn send_event(
        &self,
        topic: impl Into<String>,
        properties: Properties,
        done: impl FnOnce(Result<(), EarpmError>) + Send + 'static,
    ) -> Result<(), EarpmError> {
        let request = DeliveryRequest {
            topic: topic.into(),
            properties,
            done: Some(Box::new(done)),
        };
        self.sender
            .try_send(request)
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(mut req) => {
                    if let Some(done) = req.done.take() {
                        done(Err(EarpmError::Enomem("event deliverer queue full".into())));
                    }
                    EarpmError::Enomem("event deliverer queue full".into())
                }
                mpsc::error::TrySendError::Closed(mut req) => {
                    if let Some(done) = req.done.take() {
                        done(Err(EarpmError::Shutdown));
                    }
                    EarpmError::Shutdown
                }
            })
    }
}

impl Drop for EventDeliverer {
    fn drop(&mut self) {
        // Dropping `sender` closes the channel; any request already
        // queued but not yet popped is simply discarded along with the
        // receiver. Callers blocked on a remote ack are resolved
        // separately and earlier, by `RemoteProvider::shutdown`.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingAdmin {
        calls: Arc<AtomicUsize>,
    }
    impl EventAdmin for RecordingAdmin {
        fn send_event(&self, _topic: &str, _properties: &Properties) -> Result<(), EarpmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_to_registered_event_admin() {
        let deliverer = EventDeliverer::start(2, 16);
        let calls = Arc::new(AtomicUsize::new(0));
        deliverer.set_event_admin(Some(Arc::new(RecordingAdmin { calls: calls.clone() })));

        let (tx, rx) = tokio::sync::oneshot::channel();
        deliverer
            .send_event("a/b", Properties::new(), move |result| {
                let _ = tx.send(result);
            })
            .unwrap();

        let result = rx.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fails_with_illegal_state_when_no_event_admin_registered() {
        let deliverer = EventDeliverer::start(1, 16);
        let (tx, rx) = tokio::sync::oneshot::channel();
        deliverer
            .send_event("a/b", Properties::new(), move |result| {
                let _ = tx.send(result);
            })
            .unwrap();

        let result = rx.await.unwrap();
        assert!(matches!(result, Err(EarpmError::IllegalState(_))));
    }

    #[tokio::test]
    async fn worker_count_is_clamped() {
        let deliverer = EventDeliverer::start(100, 4);
        drop(deliverer);
    }
}
