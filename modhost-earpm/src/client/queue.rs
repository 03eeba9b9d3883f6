//! Bounded priority outbound queue with admission thresholds.

use std::collections::VecDeque;
use std::time::Instant;

use rumqttc::QoS;

use crate::errors::EarpmError;

/// Relative importance of an outbound publish, gating admission under
/// queue pressure. Higher priority messages are admitted at higher
/// queue occupancy than lower priority ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Middle,
    High,
}

impl Priority {
    /// Queue occupancy (enqueued / capacity) below which this priority
    /// is still admitted.
    fn admission_threshold(self) -> f64 {
        match self {
            Priority::High => 1.0,
            Priority::Middle => 0.85,
            Priority::Low => 0.70,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub priority: Priority,
    pub expiry: Option<Instant>,
    pub correlation_data: Option<Vec<u8>>,
    pub response_topic: Option<String>,
}

/// A bounded queue gating admission by priority against current
/// occupancy, rather than a hard slot reservation per priority tier.
pub struct OutboundQueue {
    capacity: usize,
    messages: VecDeque<OutboundMessage>,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            messages: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn occupancy(&self) -> f64 {
        self.messages.len() as f64 / self.capacity as f64
    }

    /// Admits `message` if its priority's threshold allows it at the
    /// queue's current occupancy. Returns `Enomem` otherwise.
    pub fn try_enqueue(&mut self, message: OutboundMessage) -> Result<(), EarpmError> {
        if self.occupancy() >= message.priority.admission_threshold() {
            return Err(EarpmError::Enomem(format!(
                "outbound queue at {:.0}% occupancy rejects {:?} priority publish",
                self.occupancy() * 100.0,
                message.priority
            )));
        }
        self.messages.push_back(message);
        Ok(())
    }

    pub fn pop_front(&mut self) -> Option<OutboundMessage> {
        self.messages.pop_front()
    }

    /// Drops queued messages whose deadline has already passed,
    /// returning how many were dropped.
    pub fn drop_expired(&mut self, now: Instant) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| m.expiry.map(|e| e > now).unwrap_or(true));
        before - self.messages.len()
    }
}
