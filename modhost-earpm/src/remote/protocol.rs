//! Wire format (version 1.0.0): topic namespace, message envelope, and
//! protocol-version gating.
//!
//! MQTT v5 user properties (`sender.uuid`, `version`) and the
//! request/response fields (`response-topic`, `correlation-data`) are
//! carried inside a JSON envelope rather than raw v5 packet properties
//! — `rumqttc`'s `AsyncClient::publish` convenience API does not expose
//! v5 properties without hand-building `Publish` packets, and the wire
//! format here is internal to this crate's own peers, so the envelope
//! is an equally valid carrier.

use serde::{Deserialize, Serialize};

use modhost_framework::properties::Properties;

pub const PROTOCOL_VERSION: &str = "1.0.0";
pub const PROTOCOL_MAJOR: u32 = 1;
pub const PROTOCOL_MINOR: u32 = 0;

pub fn topic_prefix(prefix: &str) -> String {
    prefix.trim_end_matches('/').to_string()
}

pub fn handler_info_topic(prefix: &str, op: &str) -> String {
    format!("{}/HandlerInfo/{op}", topic_prefix(prefix))
}

pub fn session_end_topic(prefix: &str) -> String {
    format!("{}/session/end", topic_prefix(prefix))
}

pub fn sync_event_ack_topic(prefix: &str, requester_uuid: &str) -> String {
    format!("{}/SyncEvent/ack/{requester_uuid}", topic_prefix(prefix))
}

/// Parses a `major.minor` protocol version string.
pub fn parse_version(version: &str) -> Option<(u32, u32)> {
    let (major, minor) = version.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Whether a message carrying `(major, minor)` should be accepted:
/// major must match exactly; minor may be less than or equal to ours
/// (forward compatibility within a major version).
pub fn is_compatible_version(major: u32, minor: u32) -> bool {
    major == PROTOCOL_MAJOR && minor <= PROTOCOL_MINOR
}

/// Envelope wrapping every publish this crate makes, carrying the
/// sender identity and protocol version alongside the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "sender.uuid")]
    pub sender_uuid: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_data: Option<u64>,
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn new(sender_uuid: impl Into<String>, body: T) -> Self {
        Self {
            sender_uuid: sender_uuid.into(),
            version: PROTOCOL_VERSION.to_string(),
            response_topic: None,
            correlation_data: None,
            body,
        }
    }

    pub fn with_ack_seq(mut self, response_topic: impl Into<String>, seq: u64) -> Self {
        self.response_topic = Some(response_topic.into());
        self.correlation_data = Some(seq);
        self
    }

    pub fn is_version_compatible(&self) -> bool {
        parse_version(&self.version)
            .map(|(major, minor)| is_compatible_version(major, minor))
            .unwrap_or(false)
    }
}

/// A single local or remote event handler's subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandlerEntry {
    pub handler_id: i64,
    pub topics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// `HandlerInfo/add` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerInfoAdd {
    pub handler: HandlerEntry,
}

/// `HandlerInfo/remove` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerInfoRemove {
    pub handler_id: i64,
}

/// `HandlerInfo/update` payload: the sender's complete handler set,
/// replacing (not merging with) whatever we knew about them before.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerInfoUpdate {
    pub handlers: Vec<HandlerEntry>,
}

/// A user event's serialized properties, carried as the envelope body
/// for any topic that isn't a control subtopic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEventBody {
    pub properties: String,
}

impl UserEventBody {
    pub fn from_properties(props: &Properties) -> Self {
        Self { properties: props.save() }
    }

    pub fn to_properties(&self) -> Result<Properties, modhost_framework::properties::PropertiesError> {
        Properties::load(&self.properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_major_lower_minor_is_compatible() {
        assert!(is_compatible_version(1, 0));
    }

    #[test]
    fn higher_minor_is_rejected() {
        assert!(!is_compatible_version(1, PROTOCOL_MINOR + 1));
    }

    #[test]
    fn different_major_is_rejected() {
        assert!(!is_compatible_version(2, 0));
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let envelope = Envelope::new("uuid-1", HandlerInfoRemove { handler_id: 7 }).with_ack_seq("celix/EventAdminMqtt/SyncEvent/ack/uuid-1", 42);
        let json = serde_json::to_string(&envelope).unwrap();
        let parsed: Envelope<HandlerInfoRemove> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.sender_uuid, "uuid-1");
        assert_eq!(parsed.correlation_data, Some(42));
        assert_eq!(parsed.body.handler_id, 7);
        assert!(parsed.is_version_compatible());
    }

    #[test]
    fn topics_are_namespaced_correctly() {
        assert_eq!(handler_info_topic("celix/EventAdminMqtt", "add"), "celix/EventAdminMqtt/HandlerInfo/add");
        assert_eq!(session_end_topic("celix/EventAdminMqtt/"), "celix/EventAdminMqtt/session/end");
        assert_eq!(
            sync_event_ack_topic("celix/EventAdminMqtt", "peer-1"),
            "celix/EventAdminMqtt/SyncEvent/ack/peer-1"
        );
    }
}
