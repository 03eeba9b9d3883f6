//! Broker endpoint descriptors and the endpoint-source seam.

/// One broker the client can attempt to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    /// A unix socket path, when the broker is reached over AF_UNIX
    /// rather than AF_INET — `rumqttc` has no unix-socket transport, so
    /// this is carried for completeness with spec.md §4.9's endpoint
    /// descriptor but is currently unused by `MqttClient::connect`.
    pub unix_socket_path: Option<String>,
}

impl BrokerEndpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            unix_socket_path: None,
        }
    }
}

/// External collaborator that discovers broker endpoints and calls back
/// whenever the set changes (e.g. a broker-profile file watcher). Broker
/// profile parsing itself is out of scope; this trait is the interface
/// boundary the wrapper's endpoint-added callback is documented against.
pub trait BrokerEndpointSource: Send + Sync {
    fn watch(self: Box<Self>, on_endpoints: Box<dyn Fn(Vec<BrokerEndpoint>) + Send + Sync>);
}

/// A trivial source that calls back once with a fixed list. Sufficient
/// to exercise the client wrapper without a file-watching dependency.
pub struct StaticEndpoints {
    endpoints: Vec<BrokerEndpoint>,
}

impl StaticEndpoints {
    pub fn new(endpoints: Vec<BrokerEndpoint>) -> Self {
        Self { endpoints }
    }
}

impl BrokerEndpointSource for StaticEndpoints {
    fn watch(self: Box<Self>, on_endpoints: Box<dyn Fn(Vec<BrokerEndpoint>) + Send + Sync>) {
        on_endpoints(self.endpoints);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn static_endpoints_calls_back_once_with_the_fixed_list() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen_count = calls.clone();
        let source = Box::new(StaticEndpoints::new(vec![BrokerEndpoint::tcp("localhost", 1883)]));
        source.watch(Box::new(move |endpoints| {
            seen_count.fetch_add(1, Ordering::SeqCst);
            assert_eq!(endpoints.len(), 1);
            assert_eq!(endpoints[0].port, 1883);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
