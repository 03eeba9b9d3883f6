//! Per-remote-framework state and local handler tracking.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::protocol::HandlerEntry;
use super::topic_match::topic_matches;
use modhost_framework::filter::Filter;
use modhost_framework::properties::Properties;

/// What the provider knows about one peer framework, keyed by its
/// uuid. Lives in [`RemoteFrameworkTable`], one mutex for the whole
/// map per spec.md §5 ("critical sections copy pointers out of the
/// map and then release").
#[derive(Debug, Clone)]
pub struct RemoteFrameworkState {
    pub handlers: HashMap<i64, HandlerEntry>,
    /// seq -> handler ids that have not yet acked.
    pub pending_acks: HashMap<u64, HashSet<i64>>,
    pub consecutive_timeout_count: u32,
    /// When we last heard anything at all from this peer.
    pub last_seen: DateTime<Utc>,
}

impl Default for RemoteFrameworkState {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            pending_acks: HashMap::new(),
            consecutive_timeout_count: 0,
            last_seen: Utc::now(),
        }
    }
}

impl RemoteFrameworkState {
    fn handler_matches(&self, handler_id: i64, topic: &str, props: &Properties) -> bool {
        let Some(entry) = self.handlers.get(&handler_id) else {
            return false;
        };
        if !entry.topics.iter().any(|pattern| topic_matches(pattern, topic)) {
            return false;
        }
        match &entry.filter {
            None => true,
            Some(filter_str) => Filter::parse(filter_str).map(|f| f.matches(props)).unwrap_or(false),
        }
    }

    /// Every local handler id on this peer whose topic/filter matches.
    pub fn matching_handlers(&self, topic: &str, props: &Properties) -> Vec<i64> {
        self.handlers
            .keys()
            .copied()
            .filter(|id| self.handler_matches(*id, topic, props))
            .collect()
    }
}

/// `no-ack threshold exceeded` causes the provider to skip waiting for
/// a framework's acks on new events (it is still tracked, not removed).
#[derive(Default)]
pub struct RemoteFrameworkTable {
    frameworks: Mutex<HashMap<String, RemoteFrameworkState>>,
}

impl RemoteFrameworkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.frameworks.lock().is_empty()
    }

    pub fn snapshot_uuids(&self) -> Vec<String> {
        self.frameworks.lock().keys().cloned().collect()
    }

    /// `HandlerInfo/add`: inserts or overwrites one handler on `uuid`.
    pub fn handler_add(&self, uuid: &str, handler: HandlerEntry) {
        let mut frameworks = self.frameworks.lock();
        let state = frameworks.entry(uuid.to_string()).or_default();
        state.handlers.insert(handler.handler_id, handler);
        state.last_seen = Utc::now();
    }

    /// `HandlerInfo/remove`: removes one handler; removes the whole
    /// framework entry if it no longer has any handlers.
    pub fn handler_remove(&self, uuid: &str, handler_id: i64) {
        let mut frameworks = self.frameworks.lock();
        if let Some(state) = frameworks.get_mut(uuid) {
            state.handlers.remove(&handler_id);
            if state.handlers.is_empty() {
                frameworks.remove(uuid);
            }
        }
    }

    /// `HandlerInfo/update`: last-update-wins, a plain overwrite of the
    /// sender's full handler set (no merge) per spec.md §9.
    pub fn handler_update(&self, uuid: &str, handlers: Vec<HandlerEntry>) {
        let mut frameworks = self.frameworks.lock();
        if handlers.is_empty() {
            frameworks.remove(uuid);
            return;
        }
        let state = frameworks.entry(uuid.to_string()).or_default();
        state.handlers = handlers.into_iter().map(|h| (h.handler_id, h)).collect();
        state.last_seen = Utc::now();
    }

    /// `session/end`: removes the sender outright. Returns the pending
    /// ack-seqs that were outstanding, so the caller can wake waiters.
    pub fn session_end(&self, uuid: &str) -> Vec<u64> {
        self.frameworks
            .lock()
            .remove(uuid)
            .map(|state| state.pending_acks.into_keys().collect())
            .unwrap_or_default()
    }

    /// Records that `uuid` is now expected to ack `seq` (one or more
    /// matching handlers).
    pub fn record_pending_ack(&self, uuid: &str, seq: u64, handler_ids: HashSet<i64>) {
        self.frameworks.lock().entry(uuid.to_string()).or_default().pending_acks.insert(seq, handler_ids);
    }

    /// An ack arrived from `uuid` for `seq`: clears the pending entry
    /// and resets the timeout count (every inbound message is a
    /// liveness signal).
    pub fn record_ack(&self, uuid: &str, seq: u64) {
        let mut frameworks = self.frameworks.lock();
        if let Some(state) = frameworks.get_mut(uuid) {
            state.pending_acks.remove(&seq);
            state.consecutive_timeout_count = 0;
            state.last_seen = Utc::now();
        }
    }

    /// `seq` timed out for `uuid`: clears the pending entry and
    /// increments the timeout count.
    pub fn record_timeout(&self, uuid: &str, seq: u64) {
        let mut frameworks = self.frameworks.lock();
        if let Some(state) = frameworks.get_mut(uuid) {
            state.pending_acks.remove(&seq);
            state.consecutive_timeout_count += 1;
        }
    }

    pub fn consecutive_timeout_count(&self, uuid: &str) -> u32 {
        self.frameworks.lock().get(uuid).map(|s| s.consecutive_timeout_count).unwrap_or(0)
    }

    /// Resets the timeout count — any inbound message from `uuid` is a
    /// liveness signal, ack or otherwise.
    pub fn note_liveness(&self, uuid: &str) {
        if let Some(state) = self.frameworks.lock().get_mut(uuid) {
            state.consecutive_timeout_count = 0;
            state.last_seen = Utc::now();
        }
    }

    /// When we last heard anything from `uuid`, if we've tracked it at all.
    pub fn last_seen(&self, uuid: &str) -> Option<DateTime<Utc>> {
        self.frameworks.lock().get(uuid).map(|s| s.last_seen)
    }

    /// Every remote framework (uuid, matching local handler ids) with
    /// at least one handler whose topic/filter matches `(topic, props)`.
    pub fn frameworks_matching(&self, topic: &str, props: &Properties) -> Vec<(String, Vec<i64>)> {
        self.frameworks
            .lock()
            .iter()
            .filter_map(|(uuid, state)| {
                let matches = state.matching_handlers(topic, props);
                if matches.is_empty() { None } else { Some((uuid.clone(), matches)) }
            })
            .collect()
    }

    pub fn snapshot(&self, uuid: &str) -> Option<RemoteFrameworkState> {
        self.frameworks.lock().get(uuid).cloned()
    }
}
