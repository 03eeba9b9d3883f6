//! Consumer-facing and producer-facing handles onto a registry entry.

use std::sync::Arc;

use super::entry::RegistryEntryInner;
use crate::properties::Properties;
use crate::util::{BundleId, ServiceId};

/// A consumer-side handle naming a registered service.
///
/// Cloning a `ServiceReference` is the reference-count `acquire` of
/// spec ยง3 (backed by `Arc`'s strong count); dropping the last clone
/// is the matching `release`. The independent *usage* count (how many
/// `get_service` calls have not been matched by `unget_service`) lives
/// on the shared entry and is driven through
/// [`super::ServiceRegistry::get_service`]/`unget_service`, not through
/// `Clone`/`Drop` of this handle.
#[derive(Clone)]
pub struct ServiceReference {
    pub(crate) entry: Arc<RegistryEntryInner>,
}

impl ServiceReference {
    pub(crate) fn new(entry: Arc<RegistryEntryInner>) -> Self {
        Self { entry }
    }

    pub fn id(&self) -> ServiceId {
        self.entry.id
    }

    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn producer(&self) -> BundleId {
        self.entry.producer
    }

    pub fn ranking(&self) -> i64 {
        self.entry.ranking()
    }

    /// A snapshot copy of the entry's current attributes.
    pub fn properties(&self) -> Properties {
        self.entry.attributes.read().clone()
    }

    pub fn is_unregistering(&self) -> bool {
        self.entry.is_unregistering()
    }

    /// Current in-flight `get_service` usage count, for diagnostics.
    pub fn use_count(&self) -> i64 {
        self.entry.use_count()
    }
}

impl PartialEq for ServiceReference {
    fn eq(&self, other: &Self) -> bool {
        self.entry.id == other.entry.id
    }
}
impl Eq for ServiceReference {}

impl std::fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceReference")
            .field("id", &self.entry.id)
            .field("name", &self.entry.name)
            .finish()
    }
}

/// The producer-side handle returned by `register`/`register_factory`.
///
/// Unregistering through this handle (rather than letting it drop) is
/// the only way to remove the entry from the registry — `Registration`
/// intentionally does not unregister on `Drop`, since a bundle's set
/// of live registrations must remain inspectable (and explicitly
/// torn down in bundle-context teardown order) right up to the moment
/// the bundle itself stops.
#[derive(Clone)]
pub struct Registration {
    pub(crate) registry: super::ServiceRegistry,
    pub(crate) entry: Arc<RegistryEntryInner>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration").field("id", &self.entry.id).field("name", &self.entry.name).finish()
    }
}

impl Registration {
    pub fn id(&self) -> ServiceId {
        self.entry.id
    }

    pub fn name(&self) -> &str {
        &self.entry.name
    }

    /// Removes the service from the registry, firing `Unregistering`
    /// to matching listeners first so they can release references
    /// before the entry leaves the name-indexed table.
    pub fn unregister(&self) -> Result<(), super::RegistryError> {
        self.registry.unregister(self)
    }

    /// A reference to the entry this registration produced, as if a
    /// consumer bundle had looked it up — useful for the producer
    /// itself to exercise `get_service`/`unget_service`.
    pub fn reference(&self) -> ServiceReference {
        ServiceReference::new(self.entry.clone())
    }

    /// Replaces the registration's attributes, firing `Modified` (and
    /// a synthetic `ModifiedEndmatch` for listeners whose filter
    /// matched the old properties but not the new ones) to the
    /// registry's listeners.
    pub fn set_properties(&self, mut props: Properties) {
        props.set("service.id", self.entry.id.0);
        props.set("service.name", self.entry.name.clone());
        if !props.contains_key("service.ranking") {
            props.set("service.ranking", 0i64);
        }
        self.registry.modify(&self.entry, props);
    }
}

/// The kind of change a [`ServiceEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEventKind {
    Registered,
    Modified,
    /// Synthesised for a listener whose filter matched the entry's
    /// old properties but does not match the new ones.
    ModifiedEndmatch,
    Unregistering,
}

/// An event delivered to service listeners.
#[derive(Debug, Clone)]
pub struct ServiceEvent {
    pub kind: ServiceEventKind,
    pub reference: ServiceReference,
}
