//! Subscription table: topic pattern to desired QoS, max-QoS-wins
//! across callers sharing a topic.

use std::collections::HashMap;

use dashmap::DashMap;
use rumqttc::QoS;

fn qos_rank(qos: QoS) -> u8 {
    match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce => 1,
        QoS::ExactlyOnce => 2,
    }
}

fn max_qos(a: QoS, b: QoS) -> QoS {
    if qos_rank(a) >= qos_rank(b) { a } else { b }
}

/// Opaque identity of a subscribing caller (a local event handler, the
/// remote-provider's own control subscriptions, etc), used only to
/// know which entries to drop on `remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallerId(pub u64);

/// The outcome of a table mutation: whether the broker-visible QoS for
/// the topic changed, and to what (`None` means the topic has no
/// subscribers left and should be unsubscribed on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChange {
    Unchanged,
    Upgraded(QoS),
    Removed,
}

#[derive(Default)]
pub struct SubscriptionTable {
    // topic -> (caller -> requested qos)
    topics: DashMap<String, HashMap<CallerId, QoS>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `caller`'s interest in `topic` at `qos`. Returns the
    /// broker-visible effect: a wire (re-)subscribe is only needed when
    /// this raises the topic's effective QoS.
    pub fn add(&self, caller: CallerId, topic: &str, qos: QoS) -> SubscriptionChange {
        let mut entry = self.topics.entry(topic.to_string()).or_default();
        let previous_effective = entry.values().copied().reduce(max_qos);
        entry.insert(caller, qos);
        let new_effective = entry.values().copied().reduce(max_qos).unwrap_or(qos);
        match previous_effective {
            Some(prev) if qos_rank(new_effective) <= qos_rank(prev) => SubscriptionChange::Unchanged,
            _ => SubscriptionChange::Upgraded(new_effective),
        }
    }

    /// Removes `caller`'s interest in `topic`. Returns `Removed` when no
    /// callers remain (the topic should be unsubscribed on the wire);
    /// `Upgraded`/`Unchanged` is never returned for a downgrade — a
    /// downgrade never requires a wire resubscribe, since the broker
    /// already delivers at the (now too generous) existing QoS.
    pub fn remove(&self, caller: CallerId, topic: &str) -> SubscriptionChange {
        let Some(mut entry) = self.topics.get_mut(topic) else {
            return SubscriptionChange::Unchanged;
        };
        entry.remove(&caller);
        if entry.is_empty() {
            drop(entry);
            self.topics.remove(topic);
            SubscriptionChange::Removed
        } else {
            SubscriptionChange::Unchanged
        }
    }

    pub fn effective_qos(&self, topic: &str) -> Option<QoS> {
        self.topics.get(topic).and_then(|m| m.values().copied().reduce(max_qos))
    }

    pub fn topics(&self) -> Vec<(String, QoS)> {
        self.topics
            .iter()
            .filter_map(|e| e.value().values().copied().reduce(max_qos).map(|q| (e.key().clone(), q)))
            .collect()
    }
}
