//! The authoritative directory of registered services.
//!
//! Assigns monotonically increasing ids, indexes entries for
//! filter-based lookup, and notifies listeners synchronously on
//! register/modify/unregister. See spec ยง4.4.

mod entry;
mod error;
mod reference;

pub use entry::{Payload, ServiceFactory, ServiceKind};
pub use error::RegistryError;
pub use reference::{Registration, ServiceEvent, ServiceEventKind, ServiceReference};

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use entry::{RegistryEntryInner, ServiceImpl};

use crate::filter::Filter;
use crate::properties::Properties;
use crate::util::{BundleId, IdSequence, ServiceId};

/// Opaque handle returned by `add_service_listener`, used to remove it
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct ListenerEntry {
    id: ListenerId,
    #[allow(dead_code)] // inspected by bundle-context teardown in the bundle crate module
    owner: BundleId,
    filter: Option<Filter>,
    callback: Arc<dyn Fn(ServiceEvent) + Send + Sync>,
}

struct Inner {
    entries: DashMap<ServiceId, Arc<RegistryEntryInner>>,
    listeners: RwLock<Vec<ListenerEntry>>,
    service_ids: IdSequence,
    listener_ids: IdSequence,
}

/// The service registry. Cheaply `Clone`-able (all clones share the
/// same backing tables via `Arc`), matching the
/// `ActorRegistry`/`ActorSystem` sharing pattern used elsewhere in
/// this workspace.
#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<Inner>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                listeners: RwLock::new(Vec::new()),
                service_ids: IdSequence::default(),
                listener_ids: IdSequence::default(),
            }),
        }
    }

    fn base_properties(&self, id: ServiceId, name: &str, props: Option<Properties>) -> Properties {
        let mut props = props.unwrap_or_default();
        props.set("service.id", id.0);
        props.set("service.name", name.to_string());
        if !props.contains_key("service.ranking") {
            props.set("service.ranking", 0i64);
        }
        props
    }

    fn insert_entry(
        &self,
        bundle: BundleId,
        name: &str,
        service: ServiceImpl,
        props: Option<Properties>,
    ) -> Result<Registration, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::illegal_argument("service name must not be empty"));
        }
        let id = ServiceId(self.inner.service_ids.next());
        let props = self.base_properties(id, name, props);

        let entry = Arc::new(RegistryEntryInner {
            id,
            name: name.to_string(),
            producer: bundle,
            attributes: RwLock::new(props),
            service,
            unregistering: AtomicBool::new(false),
            use_count: AtomicI64::new(0),
        });
        self.inner.entries.insert(id, entry.clone());

        debug!(service.id = id.0, service.name = name, "service registered");
        self.notify(ServiceEventKind::Registered, &entry, None);

        Ok(Registration {
            registry: self.clone(),
            entry,
        })
    }

    /// Registers a plain service payload.
    pub fn register(
        &self,
        bundle: BundleId,
        name: &str,
        payload: Payload,
        props: Option<Properties>,
    ) -> Result<Registration, RegistryError> {
        self.insert_entry(bundle, name, ServiceImpl::Plain(payload), props)
    }

    /// Registers a service backed by a per-bundle factory.
    pub fn register_factory(
        &self,
        bundle: BundleId,
        name: &str,
        factory: Arc<dyn ServiceFactory>,
        props: Option<Properties>,
    ) -> Result<Registration, RegistryError> {
        self.insert_entry(bundle, name, ServiceImpl::Factory(factory), props)
    }

    /// Removes a service from the registry. Fires `Unregistering`
    /// before removal so listeners can release references while the
    /// entry is still addressable; the payload itself stays alive
    /// until the last `ServiceReference`/`Registration` handle drops.
    pub fn unregister(&self, registration: &Registration) -> Result<(), RegistryError> {
        let id = registration.entry.id;
        let entry = self
            .inner
            .entries
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(RegistryError::NotRegistered(id))?;

        if entry.is_unregistering() {
            return Err(RegistryError::AlreadyUnregistered(id));
        }
        entry.mark_unregistering();

        self.notify(ServiceEventKind::Unregistering, &entry, None);
        self.inner.entries.remove(&id);
        debug!(service.id = id.0, "service unregistered");
        Ok(())
    }

    /// Updates a registration's attributes, firing `Modified` (and a
    /// synthetic `ModifiedEndmatch` per listener whose filter matched
    /// the old properties but not the new ones).
    pub(crate) fn modify(&self, entry: &Arc<RegistryEntryInner>, new_props: Properties) {
        let old_props = entry.attributes.read().clone();
        *entry.attributes.write() = new_props;
        self.notify(ServiceEventKind::Modified, entry, Some(old_props));
    }

    fn notify(
        &self,
        kind: ServiceEventKind,
        entry: &Arc<RegistryEntryInner>,
        old_props: Option<Properties>,
    ) {
        // Snapshot under the read lock, then release it before invoking
        // any listener — never hold the registry lock across a user
        // callback.
        let snapshot: Vec<_> = {
            let listeners = self.inner.listeners.read();
            listeners
                .iter()
                .map(|l| (l.filter.clone(), l.callback.clone()))
                .collect()
        };

        let new_props = entry.attributes.read().clone();
        let reference = ServiceReference::new(entry.clone());

        for (filter, callback) in snapshot {
            let new_matches = filter.as_ref().map(|f| f.matches(&new_props)).unwrap_or(true);
            let old_matches = old_props
                .as_ref()
                .map(|p| filter.as_ref().map(|f| f.matches(p)).unwrap_or(true));

            let event = if new_matches {
                Some(ServiceEvent {
                    kind,
                    reference: reference.clone(),
                })
            } else if kind == ServiceEventKind::Modified && old_matches == Some(true) {
                Some(ServiceEvent {
                    kind: ServiceEventKind::ModifiedEndmatch,
                    reference: reference.clone(),
                })
            } else {
                None
            };

            if let Some(event) = event {
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| callback(event)));
                if result.is_err() {
                    warn!(service.id = entry.id.0, "service listener panicked; continuing");
                }
            }
        }
    }

    /// All matching, not-yet-unregistering entries as fresh
    /// `ServiceReference` handles.
    pub fn get_service_references(
        &self,
        name: Option<&str>,
        filter: Option<&Filter>,
    ) -> Vec<ServiceReference> {
        let mut refs: Vec<ServiceReference> = self
            .inner
            .entries
            .iter()
            .filter(|e| !e.value().is_unregistering())
            .filter(|e| name.map(|n| e.value().name == n).unwrap_or(true))
            .filter(|e| {
                filter
                    .map(|f| f.matches(&e.value().attributes.read()))
                    .unwrap_or(true)
            })
            .map(|e| ServiceReference::new(e.value().clone()))
            .collect();
        refs.sort_by(|a, b| a.id().0.cmp(&b.id().0));
        refs
    }

    /// Highest-ranked matching entry: greatest `service.ranking`, ties
    /// broken by lowest `service.id`.
    pub fn get_service_reference(
        &self,
        name: Option<&str>,
        filter: Option<&Filter>,
    ) -> Option<ServiceReference> {
        highest(self.get_service_references(name, filter).into_iter())
    }

    /// Looks up an entry by id regardless of name/filter, for
    /// diagnostics and bundle-context teardown (spec ยง5 supplement).
    pub fn get_service_reference_by_id(&self, id: ServiceId) -> Option<ServiceReference> {
        self.inner
            .entries
            .get(&id)
            .filter(|e| !e.value().is_unregistering())
            .map(|e| ServiceReference::new(e.value().clone()))
    }

    /// Increments the reference's usage count and returns the payload
    /// (or, for a factory entry, the per-bundle result of
    /// `ServiceFactory::get_service`). Returns `None` if the entry has
    /// already been unregistered, leaving the usage count unchanged.
    pub fn get_service(&self, bundle: BundleId, reference: &ServiceReference) -> Option<Payload> {
        if reference.entry.is_unregistering() {
            return None;
        }
        reference.entry.use_count.fetch_add(1, Ordering::AcqRel);
        let payload = match &reference.entry.service {
            ServiceImpl::Plain(p) => p.clone(),
            ServiceImpl::Factory(f) => f.get_service(bundle),
        };
        Some(payload)
    }

    /// Decrements the usage count; for a factory entry, invokes
    /// `ServiceFactory::unget_service` when the count reaches zero.
    pub fn unget_service(&self, bundle: BundleId, reference: &ServiceReference, service: &Payload) {
        let previous = reference.entry.use_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "unget_service without matching get_service");
        if previous - 1 == 0 {
            if let ServiceImpl::Factory(f) = &reference.entry.service {
                f.unget_service(bundle, service);
            }
        }
    }

    /// Registers a service listener. The filter restricts which
    /// register/modify/unregister events reach `callback`; `None`
    /// matches everything.
    pub fn add_service_listener(
        &self,
        owner: BundleId,
        filter: Option<Filter>,
        callback: Arc<dyn Fn(ServiceEvent) + Send + Sync>,
    ) -> ListenerId {
        let id = ListenerId(self.inner.listener_ids.next() as u64);
        self.inner.listeners.write().push(ListenerEntry {
            id,
            owner,
            filter,
            callback,
        });
        id
    }

    pub fn remove_service_listener(&self, id: ListenerId) {
        self.inner.listeners.write().retain(|l| l.id != id);
    }
}

/// Greatest ranking first, ties broken by lowest id (spec ยง4.4).
pub(crate) fn highest(refs: impl Iterator<Item = ServiceReference>) -> Option<ServiceReference> {
    refs.fold(None, |best, candidate| match best {
        None => Some(candidate),
        Some(current) => {
            if candidate.ranking() > current.ranking()
                || (candidate.ranking() == current.ranking() && candidate.id().0 < current.id().0)
            {
                Some(candidate)
            } else {
                Some(current)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn bundle(n: i64) -> BundleId {
        BundleId(n)
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let registry = ServiceRegistry::new();
        let r1 = registry.register(bundle(1), "svc", Arc::new(1u32), None).unwrap();
        let r2 = registry.register(bundle(1), "svc", Arc::new(2u32), None).unwrap();
        assert!(r2.id().0 > r1.id().0);
    }

    #[test]
    fn empty_name_is_illegal_argument() {
        let registry = ServiceRegistry::new();
        let err = registry.register(bundle(1), "", Arc::new(1u32), None).unwrap_err();
        assert!(matches!(err, RegistryError::IllegalArgument(_)));
    }

    #[test]
    fn base_attributes_are_always_present() {
        let registry = ServiceRegistry::new();
        let reg = registry.register(bundle(1), "X", Arc::new(1u32), None).unwrap();
        let props = reg.reference().properties();
        assert!(props.contains_key("service.id"));
        assert!(props.contains_key("service.name"));
        assert!(props.contains_key("service.ranking"));
    }

    #[test]
    fn name_lookup_via_canonical_filter() {
        let registry = ServiceRegistry::new();
        registry.register(bundle(1), "X", Arc::new(1u32), None).unwrap();
        registry.register(bundle(1), "Y", Arc::new(2u32), None).unwrap();

        let filter = Filter::parse("(service.name=X)").unwrap();
        let refs = registry.get_service_references(None, Some(&filter));
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name(), "X");
    }

    #[test]
    fn highest_ranking_tie_break_is_lowest_id() {
        let registry = ServiceRegistry::new();
        let mut props = Properties::new();
        props.set("service.ranking", 10i64);

        let r1 = registry
            .register(bundle(1), "X", Arc::new(1u32), Some(props.clone()))
            .unwrap();
        let r2 = registry
            .register(bundle(1), "X", Arc::new(2u32), Some(props))
            .unwrap();

        let highest = registry.get_service_reference(Some("X"), None).unwrap();
        assert_eq!(highest.id(), r1.id());
        assert_ne!(highest.id(), r2.id());
    }

    #[test]
    fn higher_ranking_wins_regardless_of_registration_order() {
        let registry = ServiceRegistry::new();
        let mut low = Properties::new();
        low.set("service.ranking", 5i64);
        let mut high = Properties::new();
        high.set("service.ranking", 10i64);

        registry.register(bundle(1), "X", Arc::new(1u32), Some(low)).unwrap();
        let r2 = registry.register(bundle(1), "X", Arc::new(2u32), Some(high)).unwrap();

        let highest = registry.get_service_reference(Some("X"), None).unwrap();
        assert_eq!(highest.id(), r2.id());
    }

    #[test]
    fn unregister_fires_unregistering_then_removes() {
        let registry = ServiceRegistry::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        registry.add_service_listener(
            bundle(1),
            None,
            Arc::new(move |e: ServiceEvent| events_clone.lock().unwrap().push(e.kind)),
        );

        let reg = registry.register(bundle(1), "X", Arc::new(1u32), None).unwrap();
        reg.unregister().unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![ServiceEventKind::Registered, ServiceEventKind::Unregistering]
        );
        assert!(registry.get_service_reference(Some("X"), None).is_none());
    }

    #[test]
    fn double_unregister_is_an_error() {
        let registry = ServiceRegistry::new();
        let reg = registry.register(bundle(1), "X", Arc::new(1u32), None).unwrap();
        reg.unregister().unwrap();
        assert!(matches!(reg.unregister(), Err(RegistryError::NotRegistered(_))));
    }

    #[test]
    fn get_service_increments_use_count_and_unget_decrements() {
        let registry = ServiceRegistry::new();
        let reg = registry.register(bundle(1), "X", Arc::new(7u32), None).unwrap();
        let reference = reg.reference();

        let payload = registry.get_service(bundle(2), &reference).unwrap();
        assert_eq!(reference.use_count(), 1);
        registry.unget_service(bundle(2), &reference, &payload);
        assert_eq!(reference.use_count(), 0);
    }

    #[test]
    fn get_service_on_unregistered_entry_returns_none_and_leaves_use_count() {
        let registry = ServiceRegistry::new();
        let reg = registry.register(bundle(1), "X", Arc::new(7u32), None).unwrap();
        let reference = reg.reference();
        reg.unregister().unwrap();

        assert!(registry.get_service(bundle(2), &reference).is_none());
        assert_eq!(reference.use_count(), 0);
    }

    struct CountingFactory {
        gets: AtomicUsize,
        ungets: AtomicUsize,
    }

    impl ServiceFactory for CountingFactory {
        fn get_service(&self, _requesting_bundle: BundleId) -> Payload {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Arc::new(42u32)
        }
        fn unget_service(&self, _requesting_bundle: BundleId, _service: &Payload) {
            self.ungets.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn factory_get_and_unget_called_per_use_count_cycle() {
        let registry = ServiceRegistry::new();
        let factory = Arc::new(CountingFactory {
            gets: AtomicUsize::new(0),
            ungets: AtomicUsize::new(0),
        });
        let reg = registry
            .register_factory(bundle(1), "X", factory.clone(), None)
            .unwrap();
        let reference = reg.reference();

        let payload = registry.get_service(bundle(2), &reference).unwrap();
        assert_eq!(factory.gets.load(Ordering::SeqCst), 1);
        assert_eq!(factory.ungets.load(Ordering::SeqCst), 0);

        registry.unget_service(bundle(2), &reference, &payload);
        assert_eq!(factory.ungets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn modify_fires_modified_and_endmatch() {
        let registry = ServiceRegistry::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        let filter = Filter::parse("(color=red)").unwrap();
        registry.add_service_listener(
            bundle(1),
            Some(filter),
            Arc::new(move |e: ServiceEvent| events_clone.lock().unwrap().push(e.kind)),
        );

        let mut props = Properties::new();
        props.set("color", "red");
        let reg = registry.register(bundle(1), "X", Arc::new(1u32), Some(props)).unwrap();

        let mut new_props = Properties::new();
        new_props.set("color", "blue");
        reg.set_properties(new_props);

        assert_eq!(*events.lock().unwrap(), vec![ServiceEventKind::ModifiedEndmatch]);
    }

    #[test]
    fn listener_panic_is_caught_and_logged() {
        let registry = ServiceRegistry::new();
        registry.add_service_listener(bundle(1), None, Arc::new(|_e: ServiceEvent| panic!("boom")));

        // Must not propagate the panic to the caller of register().
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registry.register(bundle(1), "X", Arc::new(1u32), None).unwrap()
        }));
        assert!(result.is_ok());
    }

    #[test]
    fn remove_service_listener_stops_notifications() {
        let registry = ServiceRegistry::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        let id = registry.add_service_listener(
            bundle(1),
            None,
            Arc::new(move |e: ServiceEvent| events_clone.lock().unwrap().push(e.kind)),
        );
        registry.remove_service_listener(id);

        registry.register(bundle(1), "X", Arc::new(1u32), None).unwrap();
        assert!(events.lock().unwrap().is_empty());
    }
}
