//! Remote-provider core: local handler tracking plus the outbound and
//! inbound MQTT paths tying events to peer frameworks.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use rumqttc::QoS;
use tokio::sync::oneshot;
use tracing::warn;

use modhost_framework::properties::Properties;

use crate::client::{CallerId, MqttClient, Priority};
use crate::config::{EarpmConfig, DEFAULT_SEND_EVENT_EXPIRY};
use crate::deliverer::EventDeliverer;
use crate::errors::EarpmError;

use super::handler::RemoteFrameworkTable;
use super::protocol::{
    handler_info_topic, parse_version, session_end_topic, sync_event_ack_topic, Envelope, HandlerEntry,
    HandlerInfoAdd, HandlerInfoRemove, HandlerInfoUpdate, UserEventBody,
};

struct PendingSend {
    remaining: Mutex<HashSet<String>>,
    done: Mutex<Option<oneshot::Sender<()>>>,
}

/// Service-interface facade exposed to the framework: event-handler
/// tracking plus `post_event`/`send_event` for events flagged remote.
pub struct RemoteProvider {
    uuid: String,
    config: EarpmConfig,
    client: MqttClient,
    frameworks: Arc<RemoteFrameworkTable>,
    deliverer: Arc<EventDeliverer>,
    local_handlers: DashMap<i64, HandlerEntry>,
    next_ack_seq: AtomicU64,
    pending_sends: DashMap<u64, PendingSend>,
}

impl RemoteProvider {
    pub fn new(uuid: impl Into<String>, config: EarpmConfig, client: MqttClient, deliverer: Arc<EventDeliverer>) -> Arc<Self> {
        let provider = Arc::new(Self {
            uuid: uuid.into(),
            config,
            client,
            frameworks: Arc::new(RemoteFrameworkTable::new()),
            deliverer,
            local_handlers: DashMap::new(),
            next_ack_seq: AtomicU64::new(1),
            pending_sends: DashMap::new(),
        });
        let callback_provider = provider.clone();
        provider.client.on_connected(move || {
            let provider = callback_provider.clone();
            tokio::spawn(async move { provider.announce_on_connect().await });
        });
        provider
    }

    pub fn ack_topic(&self) -> String {
        sync_event_ack_topic(&self.config.topic_prefix, &self.uuid)
    }

    /// Wires the client's inbound-message callback into
    /// [`handle_inbound`](Self::handle_inbound) and subscribes our
    /// control-plane topics. Must be called once, after `connect`, for
    /// the provider to see anything peers publish.
    pub async fn start(self: &Arc<Self>) -> Result<(), EarpmError> {
        let callback_provider = self.clone();
        self.client.on_message(move |topic, payload| {
            let provider = callback_provider.clone();
            tokio::spawn(async move { provider.handle_inbound(&topic, &payload).await });
        });

        let prefix = &self.config.topic_prefix;
        const CONTROL: CallerId = CallerId(0);
        for op in ["add", "remove", "update", "query"] {
            self.client.subscribe(CONTROL, &handler_info_topic(prefix, op), QoS::AtLeastOnce).await?;
        }
        self.client.subscribe(CONTROL, &self.ack_topic(), QoS::AtLeastOnce).await?;
        self.client.subscribe(CONTROL, &session_end_topic(prefix), QoS::AtLeastOnce).await?;
        Ok(())
    }

    fn own_envelope<T>(&self, body: T) -> Envelope<T> {
        Envelope::new(self.uuid.clone(), body)
    }

    async fn publish_control(&self, topic: String, payload: Vec<u8>) -> Result<(), EarpmError> {
        self.client.publish_async(topic, payload, QoS::AtLeastOnce, Priority::Middle)
    }

    /// Re-announces our handler set and re-learns peers after a
    /// (re)connect: publishes `HandlerInfo/query` then `HandlerInfo/update`.
    async fn announce_on_connect(&self) {
        let query_topic = handler_info_topic(&self.config.topic_prefix, "query");
        if let Ok(payload) = serde_json::to_vec(&self.own_envelope(())) {
            let _ = self.publish_control(query_topic, payload).await;
        }
        self.publish_handler_update().await;
    }

    async fn publish_handler_update(&self) {
        let handlers: Vec<HandlerEntry> = self.local_handlers.iter().map(|e| e.value().clone()).collect();
        let topic = handler_info_topic(&self.config.topic_prefix, "update");
        let envelope = self.own_envelope(HandlerInfoUpdate { handlers });
        if let Ok(payload) = serde_json::to_vec(&envelope) {
            let _ = self.publish_control(topic, payload).await;
        }
    }

    /// Announces our departure to peers and releases any caller blocked
    /// in [`send_event`](Self::send_event) as a success, since nothing
    /// will ever ack once we're gone. Should run before the client
    /// disconnects.
    pub async fn shutdown(&self) -> Result<(), EarpmError> {
        for entry in self.pending_sends.iter() {
            if let Some(sender) = entry.done.lock().take() {
                let _ = sender.send(());
            }
        }
        self.pending_sends.clear();

        let topic = session_end_topic(&self.config.topic_prefix);
        let payload = serde_json::to_vec(&self.own_envelope(())).map_err(|e| EarpmError::FrameworkException(e.to_string()))?;
        self.publish_control(topic, payload).await
    }

    /// Records a local event-handler service, subscribes its topics at
    /// its QoS, and tells peers about it.
    pub async fn add_local_handler(&self, handler_id: i64, topics: Vec<String>, filter: Option<String>, qos: QoS) -> Result<(), EarpmError> {
        let entry = HandlerEntry { handler_id, topics: topics.clone(), filter };
        self.local_handlers.insert(handler_id, entry.clone());
        for topic in &topics {
            self.client.subscribe(CallerId(handler_id as u64), topic, qos).await?;
        }
        let wire_topic = handler_info_topic(&self.config.topic_prefix, "add");
        let envelope = self.own_envelope(HandlerInfoAdd { handler: entry });
        let payload = serde_json::to_vec(&envelope).map_err(|e| EarpmError::FrameworkException(e.to_string()))?;
        self.publish_control(wire_topic, payload).await
    }

    /// Mirrors `add_local_handler`'s effects in reverse.
    pub async fn remove_local_handler(&self, handler_id: i64) -> Result<(), EarpmError> {
        if let Some((_, entry)) = self.local_handlers.remove(&handler_id) {
            for topic in &entry.topics {
                self.client.unsubscribe(CallerId(handler_id as u64), topic).await?;
            }
        }
        let wire_topic = handler_info_topic(&self.config.topic_prefix, "remove");
        let envelope = self.own_envelope(HandlerInfoRemove { handler_id });
        let payload = serde_json::to_vec(&envelope).map_err(|e| EarpmError::FrameworkException(e.to_string()))?;
        self.publish_control(wire_topic, payload).await
    }

    fn resolve_qos(&self, props: &Properties) -> QoS {
        match props.get("event.remote.qos").and_then(|v| v.as_long()) {
            Some(0) => QoS::AtMostOnce,
            Some(1) => QoS::AtLeastOnce,
            Some(2) => QoS::ExactlyOnce,
            _ => self.config.default_qos,
        }
    }

    fn resolve_expiry(&self, props: &Properties) -> Duration {
        props
            .get("event.remote.expiry-interval")
            .and_then(|v| v.as_long())
            .map(|secs| Duration::from_secs(secs.max(0) as u64))
            .unwrap_or(DEFAULT_SEND_EVENT_EXPIRY)
    }

    /// Asynchronous remote posting: fire-and-forget, no ack tracking.
    pub async fn post_event(&self, topic: &str, props: &Properties) -> Result<(), EarpmError> {
        let matches = self.frameworks.frameworks_matching(topic, props);
        if matches.is_empty() {
            return Ok(());
        }
        let qos = self.resolve_qos(props);
        let body = UserEventBody::from_properties(props);
        let payload = serde_json::to_vec(&self.own_envelope(body)).map_err(|e| EarpmError::FrameworkException(e.to_string()))?;
        self.client.publish_async(topic.to_string(), payload, qos, Priority::Low)
    }

    /// Synchronous remote posting: waits until every matching remote
    /// framework has acked or been marked timed-out.
    pub async fn send_event(&self, topic: &str, props: &Properties) -> Result<(), EarpmError> {
        let matches = self.frameworks.frameworks_matching(topic, props);
        if matches.is_empty() {
            return Ok(());
        }

        let qos = self.resolve_qos(props);
        let expiry = self.resolve_expiry(props);
        let seq = self.next_ack_seq.fetch_add(1, Ordering::Relaxed);
        if seq == 0 {
            // 64-bit wrap-around is invalid per spec.md §9; practically
            // unreachable at one allocation per call, kept as a guard.
            return Err(EarpmError::FrameworkException("ack-seq counter wrapped around".into()));
        }

        // A framework past the no-ack threshold still receives the
        // publish but is dropped from the wait-set — it is presumed
        // gone until it acks or sends session/end.
        let waited: Vec<&(String, Vec<i64>)> = matches
            .iter()
            .filter(|(uuid, _)| self.frameworks.consecutive_timeout_count(uuid) < self.config.no_ack_threshold)
            .collect();

        let remaining: HashSet<String> = waited.iter().map(|(uuid, _)| uuid.clone()).collect();
        if remaining.is_empty() {
            self.client.publish_async(
                topic.to_string(),
                serde_json::to_vec(&self.own_envelope(UserEventBody::from_properties(props)))
                    .map_err(|e| EarpmError::FrameworkException(e.to_string()))?,
                qos,
                Priority::Low,
            )?;
            return Ok(());
        }
        let (tx, rx) = oneshot::channel();
        self.pending_sends.insert(
            seq,
            PendingSend {
                remaining: Mutex::new(remaining),
                done: Mutex::new(Some(tx)),
            },
        );
        for (uuid, handler_ids) in &waited {
            self.frameworks.record_pending_ack(uuid, seq, handler_ids.iter().copied().collect());
        }

        let body = UserEventBody::from_properties(props);
        let envelope = self.own_envelope(body).with_ack_seq(self.ack_topic(), seq);
        let payload = serde_json::to_vec(&envelope).map_err(|e| EarpmError::FrameworkException(e.to_string()))?;
        self.client.publish_async(topic.to_string(), payload, qos, Priority::Low)?;

        match tokio::time::timeout(expiry, rx).await {
            Ok(_) => {
                self.pending_sends.remove(&seq);
                Ok(())
            }
            Err(_) => {
                if let Some((_, pending)) = self.pending_sends.remove(&seq) {
                    for uuid in pending.remaining.lock().drain() {
                        self.frameworks.record_timeout(&uuid, seq);
                    }
                }
                Err(EarpmError::Timeout)
            }
        }
    }

    fn resolve_ack(&self, seq: u64, uuid: &str) {
        let Some(pending) = self.pending_sends.get(&seq) else {
            return;
        };
        let mut remaining = pending.remaining.lock();
        remaining.remove(uuid);
        let is_empty = remaining.is_empty();
        drop(remaining);
        if is_empty {
            if let Some(sender) = pending.done.lock().take() {
                let _ = sender.send(());
            }
        }
    }

    /// Inbound MQTT dispatch: matches `topic` against our control
    /// namespace, falling through to [`handle_user_event`](Self::handle_user_event)
    /// for anything else.
    pub async fn handle_inbound(&self, topic: &str, payload: &[u8]) {
        let prefix = &self.config.topic_prefix;

        if topic == session_end_topic(prefix) {
            if let Some(uuid) = self.decode_sender_uuid(payload) {
                for seq in self.frameworks.session_end(&uuid) {
                    self.resolve_ack(seq, &uuid);
                }
            }
            return;
        }

        if topic == handler_info_topic(prefix, "add") {
            self.handle_envelope::<HandlerInfoAdd>(payload, |uuid, body| {
                self.frameworks.handler_add(uuid, body.handler);
            });
            return;
        }
        if topic == handler_info_topic(prefix, "remove") {
            self.handle_envelope::<HandlerInfoRemove>(payload, |uuid, body| {
                self.frameworks.handler_remove(uuid, body.handler_id);
            });
            return;
        }
        if topic == handler_info_topic(prefix, "update") {
            self.handle_envelope::<HandlerInfoUpdate>(payload, |uuid, body| {
                self.frameworks.handler_update(uuid, body.handlers);
            });
            return;
        }
        if topic == handler_info_topic(prefix, "query") {
            self.publish_handler_update().await;
            return;
        }
        if let Some(requester) = topic.strip_prefix(&format!("{}/SyncEvent/ack/", prefix.trim_end_matches('/'))) {
            if requester == self.uuid {
                if let Some((uuid, seq)) = self.decode_ack(payload) {
                    self.frameworks.record_ack(&uuid, seq);
                    self.resolve_ack(seq, &uuid);
                }
            }
            return;
        }

        self.handle_user_event(topic, payload).await;
    }

    fn handle_envelope<T: serde::de::DeserializeOwned>(&self, payload: &[u8], apply: impl FnOnce(&str, T)) {
        let Ok(envelope) = serde_json::from_slice::<Envelope<T>>(payload) else {
            warn!("failed to decode control message");
            return;
        };
        if !self.is_version_accepted(&envelope.version) {
            return;
        }
        self.frameworks.note_liveness(&envelope.sender_uuid);
        apply(&envelope.sender_uuid, envelope.body);
    }

    fn is_version_accepted(&self, version: &str) -> bool {
        match parse_version(version) {
            Some((major, minor)) => super::protocol::is_compatible_version(major, minor),
            None => false,
        }
    }

    fn decode_sender_uuid(&self, payload: &[u8]) -> Option<String> {
        #[derive(serde::Deserialize)]
        struct Empty {}
        serde_json::from_slice::<Envelope<Empty>>(payload).ok().map(|e| e.sender_uuid)
    }

    fn decode_ack(&self, payload: &[u8]) -> Option<(String, u64)> {
        #[derive(serde::Deserialize)]
        struct Empty {}
        let envelope = serde_json::from_slice::<Envelope<Empty>>(payload).ok()?;
        let seq = envelope.correlation_data?;
        Some((envelope.sender_uuid, seq))
    }

    async fn handle_user_event(&self, topic: &str, payload: &[u8]) {
        let Ok(envelope) = serde_json::from_slice::<Envelope<UserEventBody>>(payload) else {
            warn!(topic, "failed to decode inbound event payload");
            return;
        };
        if !self.is_version_accepted(&envelope.version) {
            warn!(topic, version = %envelope.version, "dropping message with incompatible protocol version");
            return;
        }
        self.frameworks.note_liveness(&envelope.sender_uuid);
        let Ok(props) = envelope.body.to_properties() else {
            warn!(topic, "failed to decode inbound event properties");
            return;
        };

        match (envelope.response_topic.clone(), envelope.correlation_data) {
            (Some(response_topic), Some(seq)) => {
                let deliverer = self.deliverer.clone();
                let client = self.client.clone();
                let topic_owned = topic.to_string();
                let uuid = self.uuid.clone();
                let _ = deliverer.send_event(topic_owned, props, move |_result| {
                    let ack = Envelope::new(uuid, ()).with_ack_seq(response_topic.clone(), seq);
                    if let Ok(payload) = serde_json::to_vec(&ack) {
                        let _ = client.publish_async(response_topic, payload, QoS::AtLeastOnce, Priority::Middle);
                    }
                });
            }
            _ => {
                let deliverer = self.deliverer.clone();
                let topic_owned = topic.to_string();
                let _ = deliverer.send_event(topic_owned, props, |_| {});
            }
        }
    }
}
