//! A bundle's private door onto the registry and the framework,
//! with automatic reverse-order teardown of everything it created.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::filter::Filter;
use crate::properties::{Properties, PropertyValue};
use crate::registry::{ListenerId, Payload, Registration, ServiceEvent, ServiceFactory, ServiceReference, ServiceRegistry};
use crate::tracker::{ServiceTracker, ServiceTrackerCustomizer};
use crate::util::BundleId;

use super::error::BundleError;
use super::lifecycle::BundleEventKind;

/// Operations a `BundleContext` routes to the owning framework
/// instance. Kept as a trait so `bundle::context` does not need a
/// direct dependency on `framework::core` (the framework, not the
/// context, owns the installed-bundle map).
pub trait FrameworkFacade: Send + Sync {
    fn add_bundle_listener(&self, owner: BundleId, callback: Arc<dyn Fn(BundleId, BundleEventKind) + Send + Sync>) -> u64;
    fn remove_bundle_listener(&self, id: u64);
    fn add_framework_listener(&self, owner: BundleId, callback: Arc<dyn Fn(String) + Send + Sync>) -> u64;
    fn remove_framework_listener(&self, id: u64);
    fn install_bundle(&self, location: &str) -> Result<BundleId, BundleError>;
    fn start_bundle(&self, id: BundleId) -> Result<(), BundleError>;
    fn stop_bundle(&self, id: BundleId) -> Result<(), BundleError>;
    /// Removes the bundle from the active set but retains its
    /// location mapping, so a later `install_bundle` of the same
    /// location reuses this bundle's id.
    fn unload_bundle(&self, id: BundleId) -> Result<(), BundleError>;
    /// Removes the bundle and forgets its location entirely, so a
    /// later `install_bundle` of the same location mints a new id.
    fn uninstall_bundle(&self, id: BundleId) -> Result<(), BundleError>;
    fn update_bundle(&self, id: BundleId) -> Result<(), BundleError>;
    fn get_property(&self, key: &str) -> Option<PropertyValue>;
}

enum Created {
    Registration(Registration),
    Tracker(ServiceTracker),
    ServiceListener(ListenerId),
    BundleListener(u64),
    FrameworkListener(u64),
}

/// Everything a running bundle does to the registry and the framework
/// flows through its context, and every side effect it created is
/// undone, in reverse order, when the context is destroyed.
pub struct BundleContext {
    owner: BundleId,
    registry: ServiceRegistry,
    framework: Arc<dyn FrameworkFacade>,
    created: Mutex<Vec<Created>>,
}

impl BundleContext {
    pub fn new(owner: BundleId, registry: ServiceRegistry, framework: Arc<dyn FrameworkFacade>) -> Self {
        Self {
            owner,
            registry,
            framework,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn owner(&self) -> BundleId {
        self.owner
    }

    pub fn register_service(
        &self,
        name: &str,
        payload: Payload,
        props: Option<Properties>,
    ) -> Result<Registration, crate::registry::RegistryError> {
        let reg = self.registry.register(self.owner, name, payload, props)?;
        self.created.lock().push(Created::Registration(reg.clone()));
        Ok(reg)
    }

    pub fn register_service_factory(
        &self,
        name: &str,
        factory: Arc<dyn ServiceFactory>,
        props: Option<Properties>,
    ) -> Result<Registration, crate::registry::RegistryError> {
        let reg = self.registry.register_factory(self.owner, name, factory, props)?;
        self.created.lock().push(Created::Registration(reg.clone()));
        Ok(reg)
    }

    pub fn get_service_references(&self, name: Option<&str>, filter: Option<&Filter>) -> Vec<ServiceReference> {
        self.registry.get_service_references(name, filter)
    }

    pub fn get_service_reference(&self, name: Option<&str>, filter: Option<&Filter>) -> Option<ServiceReference> {
        self.registry.get_service_reference(name, filter)
    }

    pub fn get_service(&self, reference: &ServiceReference) -> Option<Payload> {
        self.registry.get_service(self.owner, reference)
    }

    pub fn unget_service(&self, reference: &ServiceReference, service: &Payload) {
        self.registry.unget_service(self.owner, reference, service)
    }

    pub fn add_service_listener(
        &self,
        filter: Option<Filter>,
        callback: Arc<dyn Fn(ServiceEvent) + Send + Sync>,
    ) -> ListenerId {
        let id = self.registry.add_service_listener(self.owner, filter, callback);
        self.created.lock().push(Created::ServiceListener(id));
        id
    }

    pub fn add_bundle_listener(&self, callback: Arc<dyn Fn(BundleId, BundleEventKind) + Send + Sync>) -> u64 {
        let id = self.framework.add_bundle_listener(self.owner, callback);
        self.created.lock().push(Created::BundleListener(id));
        id
    }

    pub fn add_framework_listener(&self, callback: Arc<dyn Fn(String) + Send + Sync>) -> u64 {
        let id = self.framework.add_framework_listener(self.owner, callback);
        self.created.lock().push(Created::FrameworkListener(id));
        id
    }

    pub fn track_services(
        &self,
        name: Option<String>,
        filter: Option<Filter>,
        customizer: Arc<dyn ServiceTrackerCustomizer>,
    ) -> ServiceTracker {
        let tracker = ServiceTracker::new(self.registry.clone(), self.owner, name, filter, customizer);
        tracker.open();
        self.created.lock().push(Created::Tracker(tracker.clone()));
        tracker
    }

    pub fn install_bundle(&self, location: &str) -> Result<BundleId, BundleError> {
        self.framework.install_bundle(location)
    }

    pub fn start_bundle(&self, id: BundleId) -> Result<(), BundleError> {
        self.framework.start_bundle(id)
    }

    pub fn stop_bundle(&self, id: BundleId) -> Result<(), BundleError> {
        self.framework.stop_bundle(id)
    }

    pub fn unload_bundle(&self, id: BundleId) -> Result<(), BundleError> {
        self.framework.unload_bundle(id)
    }

    pub fn uninstall_bundle(&self, id: BundleId) -> Result<(), BundleError> {
        self.framework.uninstall_bundle(id)
    }

    pub fn update_bundle(&self, id: BundleId) -> Result<(), BundleError> {
        self.framework.update_bundle(id)
    }

    pub fn get_property(&self, key: &str) -> Option<PropertyValue> {
        self.framework.get_property(key)
    }

    /// Tears down every registration, tracker and listener this
    /// context created, in reverse creation order.
    pub fn destroy(&self) {
        let created: Vec<Created> = std::mem::take(&mut *self.created.lock());
        for item in created.into_iter().rev() {
            match item {
                Created::Registration(reg) => {
                    let _ = reg.unregister();
                }
                Created::Tracker(tracker) => tracker.close(),
                Created::ServiceListener(id) => self.registry.remove_service_listener(id),
                Created::BundleListener(id) => self.framework.remove_bundle_listener(id),
                Created::FrameworkListener(id) => self.framework.remove_framework_listener(id),
            }
        }
    }
}

impl Drop for BundleContext {
    fn drop(&mut self) {
        self.destroy();
    }
}
