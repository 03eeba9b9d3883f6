//! Commonly used types, re-exported for a single `use modhost_earpm::prelude::*;`.

pub use crate::client::{BrokerEndpoint, BrokerEndpointSource, CallerId, ConnectionState, MqttClient, Priority, StaticEndpoints};
pub use crate::config::{EarpmConfig, EarpmConfigBuilder};
pub use crate::deliverer::{EventAdmin, EventDeliverer};
pub use crate::errors::EarpmError;
pub use crate::remote::{RemoteFrameworkTable, RemoteProvider};
pub use crate::service::EarpmService;
