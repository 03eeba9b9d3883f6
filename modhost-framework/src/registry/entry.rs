//! The registry's internal representation of a registered service.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::properties::Properties;
use crate::util::{BundleId, ServiceId};

/// An opaque service payload, downcast by consumers that know the
/// concrete type registered under a given service name.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Produces a payload per requesting bundle instead of sharing one
/// instance across all consumers.
///
/// `get_service`/`unget_service` are called once per `(bundle,
/// reference)` pair, mirroring the registry's own `get_service`/
/// `unget_service` contract (spec ยง4.4).
pub trait ServiceFactory: Send + Sync {
    fn get_service(&self, requesting_bundle: BundleId) -> Payload;
    fn unget_service(&self, requesting_bundle: BundleId, service: &Payload);
}

pub(crate) enum ServiceImpl {
    Plain(Payload),
    Factory(Arc<dyn ServiceFactory>),
}

/// What kind of service this entry is, exposed for inspection by
/// callers that need to distinguish plain services from factories
/// without downcasting the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Plain,
    Factory,
}

/// The registry's authoritative record for one registered service.
///
/// Shared via `Arc` between the registry's tables and every
/// `ServiceReference`/`Registration` handle pointing at it — Rust's
/// `Arc` strong count *is* the reference-count half of spec ยง3's
/// "two independent counts"; `use_count` here realizes the other
/// (usage) half, tracking `get_service`/`unget_service` pairing
/// independent of how many handles exist.
pub(crate) struct RegistryEntryInner {
    pub id: ServiceId,
    pub name: String,
    pub producer: BundleId,
    pub attributes: RwLock<Properties>,
    pub service: ServiceImpl,
    pub unregistering: AtomicBool,
    pub use_count: AtomicI64,
}

impl RegistryEntryInner {
    pub fn kind(&self) -> ServiceKind {
        match self.service {
            ServiceImpl::Plain(_) => ServiceKind::Plain,
            ServiceImpl::Factory(_) => ServiceKind::Factory,
        }
    }

    pub fn ranking(&self) -> i64 {
        self.attributes
            .read()
            .get("service.ranking")
            .and_then(|v| v.as_long())
            .unwrap_or(0)
    }

    pub fn is_unregistering(&self) -> bool {
        self.unregistering.load(Ordering::Acquire)
    }

    pub fn mark_unregistering(&self) {
        self.unregistering.store(true, Ordering::Release);
    }

    pub fn use_count(&self) -> i64 {
        self.use_count.load(Ordering::Acquire)
    }
}
