//! Event-admin remote provider configuration, built fluently and
//! validated once against the recognised configuration keys.

use std::time::Duration;

use rumqttc::QoS;

use crate::errors::EarpmError;

/// Default will-message/session-end topic suffix, relative to the
/// configured topic prefix.
pub const DEFAULT_TOPIC_PREFIX: &str = "celix/EventAdminMqtt";

/// `CELIX_EARPM_MSG_QUEUE_CAPACITY` default and bounds.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const MAX_QUEUE_CAPACITY: usize = 2048;

/// `CELIX_EARPM_SYNC_EVENT_DELIVERY_THREADS` default and bounds.
pub const DEFAULT_DELIVERY_THREADS: usize = 5;
pub const MAX_DELIVERY_THREADS: usize = 20;

/// `CELIX_EARPM_SYNC_EVENT_CONTINUOUS_NO_ACK_THRESHOLD` default.
pub const DEFAULT_NO_ACK_THRESHOLD: u32 = 3;

/// Default `send_event` expiry when `event.remote.expiry-interval` is absent.
pub const DEFAULT_SEND_EVENT_EXPIRY: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct EarpmConfig {
    pub topic_prefix: String,
    pub default_qos: QoS,
    pub queue_capacity: usize,
    pub parallel_msg_capacity: usize,
    pub delivery_threads: usize,
    pub no_ack_threshold: u32,
    pub broker_profile: Option<String>,
}

impl Default for EarpmConfig {
    fn default() -> Self {
        Self {
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            default_qos: QoS::AtLeastOnce,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            parallel_msg_capacity: DEFAULT_QUEUE_CAPACITY,
            delivery_threads: DEFAULT_DELIVERY_THREADS,
            no_ack_threshold: DEFAULT_NO_ACK_THRESHOLD,
            broker_profile: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EarpmConfigBuilder {
    config: EarpmConfig,
}

impl EarpmConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.topic_prefix = prefix.into();
        self
    }

    pub fn default_qos(mut self, qos: QoS) -> Self {
        self.config.default_qos = qos;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn parallel_msg_capacity(mut self, capacity: usize) -> Self {
        self.config.parallel_msg_capacity = capacity;
        self
    }

    pub fn delivery_threads(mut self, threads: usize) -> Self {
        self.config.delivery_threads = threads;
        self
    }

    pub fn no_ack_threshold(mut self, threshold: u32) -> Self {
        self.config.no_ack_threshold = threshold;
        self
    }

    pub fn broker_profile(mut self, path: impl Into<String>) -> Self {
        self.config.broker_profile = Some(path.into());
        self
    }

    pub fn build(self) -> Result<EarpmConfig, EarpmError> {
        let c = &self.config;
        if c.topic_prefix.is_empty() {
            return Err(EarpmError::illegal_argument("topic_prefix must not be empty"));
        }
        if c.queue_capacity == 0 || c.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(EarpmError::illegal_argument(format!(
                "queue_capacity must be in 1..={MAX_QUEUE_CAPACITY}"
            )));
        }
        if c.parallel_msg_capacity == 0 || c.parallel_msg_capacity > c.queue_capacity {
            return Err(EarpmError::illegal_argument(
                "parallel_msg_capacity must be in 1..=queue_capacity",
            ));
        }
        if c.delivery_threads == 0 || c.delivery_threads > MAX_DELIVERY_THREADS {
            return Err(EarpmError::illegal_argument(format!(
                "delivery_threads must be in 1..={MAX_DELIVERY_THREADS}"
            )));
        }
        if c.no_ack_threshold == 0 {
            return Err(EarpmError::illegal_argument("no_ack_threshold must be greater than zero"));
        }
        Ok(self.config)
    }
}
