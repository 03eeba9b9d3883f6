//! End-to-end coverage of the remote event-admin provider's public
//! surface: handler registration, local-only publish short-circuits,
//! inbound control-plane handling, and the ack-driven `send_event`
//! paths (timeout, no-ack-threshold skip, session/end shortcut,
//! `shutdown`), all driven through `EarpmService`/`RemoteProvider`
//! rather than crate-internal state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::QoS;

use modhost_earpm::client::{BrokerEndpoint, ConnectionState, StaticEndpoints};
use modhost_earpm::config::EarpmConfigBuilder;
use modhost_earpm::errors::EarpmError;
use modhost_earpm::remote::protocol::session_end_topic;
use modhost_earpm::remote::{Envelope, HandlerEntry};
use modhost_earpm::service::EarpmService;
use modhost_framework::properties::Properties;

fn endpoints() -> Box<StaticEndpoints> {
    Box::new(StaticEndpoints::new(vec![BrokerEndpoint::tcp("localhost", 1883)]))
}

#[tokio::test]
async fn service_starts_and_shuts_down_cleanly_with_no_peers() {
    let config = EarpmConfigBuilder::new().build().unwrap();
    let service = EarpmService::new(config, endpoints()).unwrap();
    assert_eq!(service.client.connection_state(), ConnectionState::Disconnected);
    service.start().await.unwrap();
    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn add_and_remove_local_handler_round_trip_without_error() {
    let config = EarpmConfigBuilder::new().build().unwrap();
    let service = EarpmService::new(config, endpoints()).unwrap();
    service.start().await.unwrap();

    service.provider.add_local_handler(1, vec!["demo/topic".into()], None, QoS::AtLeastOnce).await.unwrap();
    service.provider.remove_local_handler(1).await.unwrap();
}

#[tokio::test]
async fn post_event_with_no_remote_listeners_is_a_local_no_op() {
    let config = EarpmConfigBuilder::new().build().unwrap();
    let service = EarpmService::new(config, endpoints()).unwrap();
    service.start().await.unwrap();

    let result = service.provider.post_event("demo/topic", &Properties::new()).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn send_event_with_no_remote_listeners_returns_immediately() {
    let config = EarpmConfigBuilder::new().build().unwrap();
    let service = EarpmService::new(config, endpoints()).unwrap();
    service.start().await.unwrap();

    let result = tokio::time::timeout(Duration::from_millis(200), service.provider.send_event("demo/topic", &Properties::new()))
        .await
        .expect("send_event should not block when nobody is listening");
    assert!(result.is_ok());
}

/// Feeds a `HandlerInfo/add` announcement for a fake peer straight into
/// the provider's inbound dispatch, then confirms `send_event` times
/// out waiting for that peer's ack and `shutdown` releases any blocked
/// caller as a success — mirrors how a real MQTT delivery would have
/// reached `handle_inbound` had a broker been wired in.
#[tokio::test]
async fn send_event_times_out_waiting_for_an_announced_peer_then_shutdown_unblocks_it() {
    let config = EarpmConfigBuilder::new().queue_capacity(64).build().unwrap();
    let topic_prefix = config.topic_prefix.clone();
    let service = EarpmService::new(config, endpoints()).unwrap();
    service.start().await.unwrap();

    let handler_add = Envelope::new(
        "peer-1".to_string(),
        modhost_earpm::remote::HandlerInfoAdd {
            handler: HandlerEntry { handler_id: 7, topics: vec!["demo/topic".into()], filter: None },
        },
    );
    let topic = modhost_earpm::remote::protocol::handler_info_topic(&topic_prefix, "add");
    service.provider.handle_inbound(&topic, &serde_json::to_vec(&handler_add).unwrap()).await;

    let mut props = Properties::new();
    props.set("event.remote.expiry-interval", 0i64);
    let timed_out = tokio::time::timeout(Duration::from_millis(500), service.provider.send_event("demo/topic", &props))
        .await
        .unwrap();
    assert!(matches!(timed_out, Err(EarpmError::Timeout)));

    let send_task = {
        let provider = service.provider.clone();
        tokio::spawn(async move {
            let mut props = Properties::new();
            props.set("event.remote.expiry-interval", 5i64);
            provider.send_event("demo/topic", &props).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    service.shutdown().await.unwrap();
    assert!(send_task.await.unwrap().is_ok());
}

/// A peer's `session/end` resolves any send that was waiting on it,
/// exactly as if the peer had acked — a departed peer can never ack.
#[tokio::test]
async fn peer_session_end_unblocks_a_pending_send() {
    let config = EarpmConfigBuilder::new().build().unwrap();
    let topic_prefix = config.topic_prefix.clone();
    let service = EarpmService::new(config, endpoints()).unwrap();
    service.start().await.unwrap();

    let handler_add = Envelope::new(
        "peer-2".to_string(),
        modhost_earpm::remote::HandlerInfoAdd {
            handler: HandlerEntry { handler_id: 3, topics: vec!["demo/topic".into()], filter: None },
        },
    );
    let add_topic = modhost_earpm::remote::protocol::handler_info_topic(&topic_prefix, "add");
    service.provider.handle_inbound(&add_topic, &serde_json::to_vec(&handler_add).unwrap()).await;

    let send_task = {
        let provider = service.provider.clone();
        tokio::spawn(async move {
            let mut props = Properties::new();
            props.set("event.remote.expiry-interval", 5i64);
            provider.send_event("demo/topic", &props).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let session_end: Envelope<()> = Envelope::new("peer-2".to_string(), ());
    service
        .provider
        .handle_inbound(&session_end_topic(&topic_prefix), &serde_json::to_vec(&session_end).unwrap())
        .await;

    assert!(send_task.await.unwrap().is_ok());
}

#[tokio::test]
async fn inbound_user_event_without_response_topic_is_delivered_fire_and_forget() {
    let config = EarpmConfigBuilder::new().build().unwrap();
    let service = EarpmService::new(config, endpoints()).unwrap();
    service.start().await.unwrap();

    let delivered = Arc::new(AtomicUsize::new(0));
    struct CountingAdmin(Arc<AtomicUsize>);
    impl modhost_earpm::deliverer::EventAdmin for CountingAdmin {
        fn send_event(&self, _topic: &str, _properties: &Properties) -> Result<(), EarpmError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
    service.deliverer.set_event_admin(Some(Arc::new(CountingAdmin(delivered.clone()))));

    let envelope = Envelope::new("peer-3".to_string(), modhost_earpm::remote::UserEventBody::from_properties(&Properties::new()));
    service.provider.handle_inbound("demo/topic", &serde_json::to_vec(&envelope).unwrap()).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
}
