//! Composition root tying the MQTT client, event deliverer and remote
//! provider into one handle — the moral equivalent of the framework
//! crate's own `Framework::new`.

use std::sync::Arc;

use rumqttc::QoS;
use uuid::Uuid;

use crate::client::{BrokerEndpointSource, MqttClient, WillMessage};
use crate::config::EarpmConfig;
use crate::deliverer::EventDeliverer;
use crate::errors::EarpmError;
use crate::remote::protocol::session_end_topic;
use crate::remote::RemoteProvider;

/// A running remote event-admin provider: its own MQTT identity, a
/// delivery worker pool, and the provider facade bundles talk to.
pub struct EarpmService {
    pub client: MqttClient,
    pub deliverer: Arc<EventDeliverer>,
    pub provider: Arc<RemoteProvider>,
}

impl EarpmService {
    /// Builds every piece but does not connect — call
    /// [`start`](Self::start) once a `tokio` runtime is running.
    pub fn new(config: EarpmConfig, endpoint_source: Box<dyn BrokerEndpointSource>) -> Result<Self, EarpmError> {
        let uuid = Uuid::new_v4().to_string();

        // A retained will publishes our own session/end if the
        // connection drops without a clean disconnect, so peers notice
        // without waiting on the no-ack threshold.
        let will_envelope = crate::remote::protocol::Envelope::new(uuid.clone(), ());
        let will = WillMessage {
            topic: session_end_topic(&config.topic_prefix),
            payload: serde_json::to_vec(&will_envelope).map_err(|e| EarpmError::FrameworkException(e.to_string()))?,
            qos: QoS::AtLeastOnce,
        };

        let client = MqttClient::new(format!("earpm-{uuid}"), config.queue_capacity, Some(will), endpoint_source)?;
        let deliverer = Arc::new(EventDeliverer::start(config.delivery_threads, config.parallel_msg_capacity));
        let provider = RemoteProvider::new(uuid, config, client.clone(), deliverer.clone());

        Ok(Self { client, deliverer, provider })
    }

    /// Connects the MQTT client and begins routing inbound messages to
    /// the provider. Must be called from within a `tokio` runtime.
    pub async fn start(&self) -> Result<(), EarpmError> {
        self.client.connect()?;
        self.provider.start().await
    }

    /// Announces departure and releases any blocked `send_event` callers.
    pub async fn shutdown(&self) -> Result<(), EarpmError> {
        self.provider.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{BrokerEndpoint, StaticEndpoints};
    use crate::config::EarpmConfigBuilder;

    #[tokio::test]
    async fn new_then_start_wires_every_piece_without_error() {
        let config = EarpmConfigBuilder::new().build().unwrap();
        let endpoints = Box::new(StaticEndpoints::new(vec![BrokerEndpoint::tcp("localhost", 1883)]));
        let service = EarpmService::new(config, endpoints).unwrap();
        assert!(service.start().await.is_ok());
        assert!(service.shutdown().await.is_ok());
    }
}
