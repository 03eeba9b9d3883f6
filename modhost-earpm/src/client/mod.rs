//! MQTT v5 client wrapper: endpoint rotation with backoff, a bounded
//! priority outbound queue, reconnection handling, and a max-QoS-wins
//! subscription table.
//!
//! Built over `rumqttc`'s `AsyncClient`/`EventLoop` split, the natural
//! Rust analogue of the C source's wrapped `MQTTAsync` handle.

pub mod backoff;
pub mod endpoint;
pub mod queue;
pub mod subscriptions;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::errors::EarpmError;

pub use backoff::ReconnectBackoff;
pub use endpoint::{BrokerEndpoint, BrokerEndpointSource, StaticEndpoints};
pub use queue::{OutboundMessage, OutboundQueue, Priority};
pub use subscriptions::{CallerId, SubscriptionChange, SubscriptionTable};

const MAX_TOPIC_LEN: usize = 1024;
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Topic validation shared by `subscribe` and `publish`: rejects empty
/// topics, topics over 1024 bytes, and topics starting with a
/// wildcard or the `$` reserved prefix.
pub fn validate_topic(topic: &str) -> Result<(), EarpmError> {
    if topic.is_empty() {
        return Err(EarpmError::illegal_argument("topic must not be empty"));
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(EarpmError::illegal_argument(format!("topic exceeds {MAX_TOPIC_LEN} bytes")));
    }
    if topic.starts_with('$') || topic.starts_with('+') || topic.starts_with('#') {
        return Err(EarpmError::illegal_argument("topic must not start with '$', '+' or '#'"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// A configurable will message, published by the broker on an
/// unexpected disconnect so peers observe a session-end.
#[derive(Debug, Clone)]
pub struct WillMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

struct Inflight {
    ack: Option<oneshot::Sender<Result<(), EarpmError>>>,
}

/// The MQTT client wrapper. Cheaply `Clone`-able; every clone shares
/// the same connection, outbound queue, and subscription table.
#[derive(Clone)]
pub struct MqttClient {
    inner: Arc<Inner>,
}

struct Inner {
    client: AsyncClient,
    event_loop: SyncMutex<Option<EventLoop>>,
    state: AtomicBool,
    outbound: SyncMutex<OutboundQueue>,
    outbound_notify: tokio::sync::Notify,
    subscriptions: SubscriptionTable,
    endpoints: Arc<SyncMutex<Vec<BrokerEndpoint>>>,
    next_publish_id: AtomicU64,
    inflight: DashMap<u64, Inflight>,
    connected_callback: SyncMutex<Option<Arc<dyn Fn() + Send + Sync>>>,
    message_callback: SyncMutex<Option<Arc<dyn Fn(String, Vec<u8>) + Send + Sync>>>,
    client_id: String,
    started: AtomicBool,
}

impl MqttClient {
    /// Builds a client bound to the first endpoint the source reports;
    /// subsequent endpoints (and changes to the set) feed the rotation
    /// used by the reconnect loop.
    pub fn new(
        client_id: impl Into<String>,
        queue_capacity: usize,
        will: Option<WillMessage>,
        endpoint_source: Box<dyn BrokerEndpointSource>,
    ) -> Result<Self, EarpmError> {
        let client_id = client_id.into();
        let endpoints: Arc<SyncMutex<Vec<BrokerEndpoint>>> = Arc::new(SyncMutex::new(Vec::new()));
        let endpoints_for_callback = endpoints.clone();
        endpoint_source.watch(Box::new(move |found| {
            *endpoints_for_callback.lock() = found;
        }));

        let first = endpoints
            .lock()
            .first()
            .cloned()
            .ok_or_else(|| EarpmError::illegal_argument("endpoint source reported no broker endpoints"))?;

        let mut options = MqttOptions::new(client_id.clone(), first.host.clone(), first.port);
        options.set_keep_alive(DEFAULT_KEEP_ALIVE);
        options.set_clean_session(false);
        if let Some(will) = will {
            options.set_last_will(LastWill::new(will.topic, will.payload, will.qos, false));
        }

        let (client, event_loop) = AsyncClient::new(options, EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                event_loop: SyncMutex::new(Some(event_loop)),
                state: AtomicBool::new(false),
                outbound: SyncMutex::new(OutboundQueue::new(queue_capacity)),
                outbound_notify: tokio::sync::Notify::new(),
                subscriptions: SubscriptionTable::new(),
                endpoints,
                next_publish_id: AtomicU64::new(1),
                inflight: DashMap::new(),
                connected_callback: SyncMutex::new(None),
                message_callback: SyncMutex::new(None),
                client_id,
                started: AtomicBool::new(false),
            }),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.load(Ordering::Acquire)
    }

    pub fn connection_state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Registers a callback fired once per transition into the
    /// connected state, so higher layers can re-publish soft state
    /// (HandlerInfo re-announcement, in the remote provider's case).
    pub fn on_connected(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.inner.connected_callback.lock() = Some(Arc::new(callback));
    }

    /// Registers the single inbound-message callback. The network
    /// thread (the event-loop task) only enqueues into this callback —
    /// it never blocks on user code per spec.md §5, so callbacks that
    /// need to do async work should spawn their own task.
    pub fn on_message(&self, callback: impl Fn(String, Vec<u8>) + Send + Sync + 'static) {
        *self.inner.message_callback.lock() = Some(Arc::new(callback));
    }

    /// Starts the event-loop polling task and the outbound-publisher
    /// task. Calling `connect` twice on the same client is a no-op.
    pub fn connect(&self) -> Result<(), EarpmError> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let event_loop = self
            .inner
            .event_loop
            .lock()
            .take()
            .ok_or_else(|| EarpmError::illegal_state("client already connected"))?;

        self.spawn_event_loop_task(event_loop);
        self.spawn_publisher_task();
        Ok(())
    }

    fn spawn_event_loop_task(&self, mut event_loop: EventLoop) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut backoff = ReconnectBackoff::default();
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        backoff.reset();
                        let was_connected = this.inner.state.swap(true, Ordering::AcqRel);
                        if !was_connected {
                            this.on_reconnected();
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        this.on_disconnected();
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if let Some(callback) = this.inner.message_callback.lock().clone() {
                            callback(publish.topic, publish.payload.to_vec());
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!(client = %this.inner.client_id, error = %err, "MQTT event loop error");
                        this.on_disconnected();
                        tokio::time::sleep(backoff.next_delay()).await;
                    }
                }
            }
        });
    }

    fn on_disconnected(&self) {
        if self.inner.state.swap(false, Ordering::AcqRel) {
            debug!(client = %self.inner.client_id, "MQTT connection lost");
        }
        // QoS-0 messages do not survive a disconnect; QoS-1/2 remain queued.
        let mut outbound = self.inner.outbound.lock();
        let mut remaining = OutboundQueue::new(outbound.capacity());
        while let Some(message) = outbound.pop_front() {
            if message.qos == QoS::AtMostOnce {
                continue;
            }
            let _ = remaining.try_enqueue(message);
        }
        *outbound = remaining;
    }

    fn on_reconnected(&self) {
        info!(client = %self.inner.client_id, "MQTT connected");
        for (topic, qos) in self.inner.subscriptions.topics() {
            let client = self.inner.client.clone();
            tokio::spawn(async move {
                if let Err(err) = client.subscribe(topic.clone(), qos).await {
                    warn!(topic = %topic, error = %err, "resubscribe after reconnect failed");
                }
            });
        }
        if let Some(callback) = self.inner.connected_callback.lock().clone() {
            callback();
        }
        self.inner.outbound_notify.notify_one();
    }

    fn spawn_publisher_task(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                if !this.is_connected() {
                    this.inner.outbound_notify.notified().await;
                    continue;
                }
                let next = this.inner.outbound.lock().pop_front();
                let Some(message) = next else {
                    this.inner.outbound_notify.notified().await;
                    continue;
                };
                this.publish_now(message).await;
            }
        });
    }

    async fn publish_now(&self, message: OutboundMessage) {
        // The caller's publish_sync id, if any, rides in correlation_data
        // so the oneshot waiting on it can be resolved once this
        // publish actually reaches the wire.
        let waiter_id = message
            .correlation_data
            .as_ref()
            .filter(|bytes| bytes.len() == 8)
            .map(|bytes| u64::from_be_bytes(bytes.as_slice().try_into().unwrap()));

        let result = self
            .inner
            .client
            .publish(message.topic.clone(), message.qos, false, message.payload.clone())
            .await
            .map_err(|err| EarpmError::FrameworkException(err.to_string()));

        if let Err(ref err) = result {
            error!(topic = %message.topic, error = %err, "publish failed");
        }
        if let Some(id) = waiter_id {
            if let Some((_, mut inflight)) = self.inner.inflight.remove(&id) {
                if let Some(ack) = inflight.ack.take() {
                    let _ = ack.send(result);
                }
            }
        }
    }

    /// Enqueues `payload` for publication, returning immediately.
    /// Admission is governed by `priority` against current queue
    /// occupancy (see `queue::Priority`).
    pub fn publish_async(
        &self,
        topic: impl Into<String>,
        payload: Vec<u8>,
        qos: QoS,
        priority: Priority,
    ) -> Result<(), EarpmError> {
        let topic = topic.into();
        validate_topic(&topic)?;
        if qos == QoS::AtMostOnce && !self.is_connected() {
            return Err(EarpmError::NotConnected);
        }
        let message = OutboundMessage {
            topic,
            payload,
            qos,
            priority,
            expiry: None,
            correlation_data: None,
            response_topic: None,
        };
        self.inner.outbound.lock().try_enqueue(message)?;
        self.inner.outbound_notify.notify_one();
        Ok(())
    }

    /// Enqueues `payload` and waits until it has actually been sent on
    /// the wire, or `deadline` elapses. On timeout the message is left
    /// in the queue — it will still be sent.
    pub async fn publish_sync(
        &self,
        topic: impl Into<String>,
        payload: Vec<u8>,
        qos: QoS,
        priority: Priority,
        deadline: Duration,
    ) -> Result<(), EarpmError> {
        let topic = topic.into();
        validate_topic(&topic)?;
        let id = self.inner.next_publish_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.inflight.insert(id, Inflight { ack: Some(tx) });

        let message = OutboundMessage {
            topic,
            payload,
            qos,
            priority,
            expiry: Some(Instant::now() + deadline),
            correlation_data: Some(id.to_be_bytes().to_vec()),
            response_topic: None,
        };
        if let Err(err) = self.inner.outbound.lock().try_enqueue(message) {
            self.inner.inflight.remove(&id);
            return Err(err);
        }
        self.inner.outbound_notify.notify_one();

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(EarpmError::FrameworkException("publish acknowledgement channel dropped".into())),
            Err(_) => {
                self.inner.inflight.remove(&id);
                Err(EarpmError::Timeout)
            }
        }
    }

    /// Subscribes `caller` to `topic` at `qos`, issuing a wire
    /// subscribe only when this raises the topic's effective QoS.
    pub async fn subscribe(&self, caller: CallerId, topic: &str, qos: QoS) -> Result<(), EarpmError> {
        validate_topic(topic)?;
        match self.inner.subscriptions.add(caller, topic, qos) {
            SubscriptionChange::Upgraded(effective) => self
                .inner
                .client
                .subscribe(topic, effective)
                .await
                .map_err(|err| EarpmError::FrameworkException(err.to_string())),
            _ => Ok(()),
        }
    }

    /// Removes `caller`'s interest in `topic`, unsubscribing on the
    /// wire once no caller remains.
    pub async fn unsubscribe(&self, caller: CallerId, topic: &str) -> Result<(), EarpmError> {
        match self.inner.subscriptions.remove(caller, topic) {
            SubscriptionChange::Removed => self
                .inner
                .client
                .unsubscribe(topic)
                .await
                .map_err(|err| EarpmError::FrameworkException(err.to_string())),
            _ => Ok(()),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.inner.outbound.lock().len()
    }
}
