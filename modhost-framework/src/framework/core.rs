//! The framework instance: installed-bundle map, registry, listener
//! bookkeeping and shutdown sequencing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::info;

use crate::bundle::{Bundle, BundleArchive, BundleError, BundleEventKind, BundleState, FrameworkFacade};
use crate::properties::PropertyValue;
use crate::registry::ServiceRegistry;
use crate::util::{BundleId, IdSequence};

use super::config::FrameworkConfig;
use super::dispatcher::EventDispatcher;
use super::errors::FrameworkError;
use super::lock::GlobalLock;

/// Builds a `BundleArchive` for a bundle location. Resolution and
/// manifest parsing are out of scope (spec ยง1); this is the seam an
/// embedder supplies to turn a location string into loadable state.
pub type ArchiveFactory = Box<dyn Fn(&str) -> Result<Arc<dyn BundleArchive>, BundleError> + Send + Sync>;

struct BundleListenerEntry {
    id: u64,
    callback: Arc<dyn Fn(BundleId, BundleEventKind) + Send + Sync>,
}

struct FrameworkListenerEntry {
    id: u64,
    callback: Arc<dyn Fn(String) + Send + Sync>,
}

pub struct Framework {
    bundles: DashMap<BundleId, Arc<Bundle>>,
    locations: DashMap<String, BundleId>,
    install_order: Mutex<Vec<BundleId>>,
    registry: ServiceRegistry,
    bundle_listeners: RwLock<Vec<BundleListenerEntry>>,
    framework_listeners: RwLock<Vec<FrameworkListenerEntry>>,
    listener_ids: IdSequence,
    bundle_ids: IdSequence,
    global_lock: GlobalLock,
    dispatcher: EventDispatcher,
    archive_factory: ArchiveFactory,
    config: FrameworkConfig,
    shutting_down: AtomicBool,
    stopped: Notify,
    /// Lets `&self` trait methods ([`FrameworkFacade`]) recover an
    /// `Arc<Framework>` to call the inherent methods that need one
    /// (installing/starting/updating a bundle hands that bundle an
    /// `Arc<dyn FrameworkFacade>` of its own, which in turn must be
    /// clonable from `self`).
    self_ref: RwLock<Weak<Framework>>,
}

impl Framework {
    /// Creates a framework instance. Must be called from within a
    /// `tokio` runtime (the event dispatcher spawns a task).
    pub fn new(config: FrameworkConfig, archive_factory: ArchiveFactory) -> Arc<Self> {
        let framework = Arc::new(Self {
            bundles: DashMap::new(),
            locations: DashMap::new(),
            install_order: Mutex::new(Vec::new()),
            registry: ServiceRegistry::new(),
            bundle_listeners: RwLock::new(Vec::new()),
            framework_listeners: RwLock::new(Vec::new()),
            listener_ids: IdSequence::default(),
            bundle_ids: IdSequence::starting_at(1),
            global_lock: GlobalLock::new(),
            dispatcher: EventDispatcher::spawn(),
            archive_factory,
            config,
            shutting_down: AtomicBool::new(false),
            stopped: Notify::new(),
            self_ref: RwLock::new(Weak::new()),
        });
        *framework.self_ref.write() = Arc::downgrade(&framework);
        framework
    }

    fn self_arc(&self) -> Arc<Framework> {
        self.self_ref
            .read()
            .upgrade()
            .expect("framework's own Arc dropped while framework is still in use")
    }

    pub fn registry(&self) -> ServiceRegistry {
        self.registry.clone()
    }

    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    pub fn bundle(&self, id: BundleId) -> Option<Arc<Bundle>> {
        self.bundles.get(&id).map(|b| b.value().clone())
    }

    /// All currently-installed bundles (spec ยง6 `list_bundles`).
    pub fn list_bundles(&self) -> Vec<Arc<Bundle>> {
        self.bundles.iter().map(|b| b.value().clone()).collect()
    }

    /// The id a location was assigned on install, if it is still known
    /// to the framework (spec ยง6 `get_bundle_id_by_location`). An
    /// `unload_bundle`'d location stays resolvable; an
    /// `uninstall_bundle`'d one does not.
    pub fn get_bundle_id_by_location(&self, location: &str) -> Option<BundleId> {
        self.locations.get(location).map(|id| *id.value())
    }

    /// The bundle's current state, or `None` if `id` is not installed
    /// (spec ยง6 `get_bundle_state`).
    pub fn get_bundle_state(&self, id: BundleId) -> Option<BundleState> {
        self.bundle(id).map(|b| b.state())
    }

    fn check_not_shutting_down(&self) -> Result<(), FrameworkError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(FrameworkError::FrameworkShutdown);
        }
        Ok(())
    }

    fn fire_bundle_changed(&self, bundle: BundleId, event: BundleEventKind) {
        let listeners: Vec<_> = self
            .bundle_listeners
            .read()
            .iter()
            .map(|l| l.callback.clone())
            .collect();
        self.dispatcher.dispatch(Box::new(move || {
            for callback in listeners {
                callback(bundle, event);
            }
        }));
    }

    fn fire_framework_event(&self, message: String) {
        let listeners: Vec<_> = self
            .framework_listeners
            .read()
            .iter()
            .map(|l| l.callback.clone())
            .collect();
        self.dispatcher.dispatch(Box::new(move || {
            for callback in listeners {
                callback(message.clone());
            }
        }));
    }

    /// Installs `location`, reusing the id of a prior `unload_bundle`
    /// of the same location if one is on record (spec ยง6); a location
    /// that was `uninstall_bundle`'d, or never installed, mints a
    /// fresh id.
    pub fn install_bundle(self: &Arc<Self>, location: &str) -> Result<BundleId, FrameworkError> {
        self.check_not_shutting_down()?;
        let _guard = self.global_lock.lock();

        if let Some(existing) = self.locations.get(location) {
            let existing = *existing.value();
            if self.bundles.contains_key(&existing) {
                return Ok(existing);
            }
            let archive = (self.archive_factory)(location)?;
            self.bundles.insert(existing, Arc::new(Bundle::new(existing, archive)));
            self.install_order.lock().push(existing);
            info!(bundle = existing.0, location, "bundle reinstalled, reusing id");
            self.fire_bundle_changed(existing, BundleEventKind::Installed);
            return Ok(existing);
        }

        let archive = (self.archive_factory)(location)?;
        let id = BundleId(self.bundle_ids.next());
        let bundle = Arc::new(Bundle::new(id, archive));

        self.bundles.insert(id, bundle);
        self.locations.insert(location.to_string(), id);
        self.install_order.lock().push(id);

        info!(bundle = id.0, location, "bundle installed");
        self.fire_bundle_changed(id, BundleEventKind::Installed);
        Ok(id)
    }

    pub fn start_bundle(self: &Arc<Self>, id: BundleId) -> Result<(), FrameworkError> {
        self.check_not_shutting_down()?;
        let _guard = self.global_lock.lock();
        let bundle = self.bundle(id).ok_or(FrameworkError::BundleNotFound(id))?;

        if bundle.state() == BundleState::Installed {
            bundle.resolve()?;
            self.fire_bundle_changed(id, BundleEventKind::Resolved);
        }
        let facade: Arc<dyn FrameworkFacade> = self.clone();
        self.fire_bundle_changed(id, BundleEventKind::Starting);
        bundle.start(self.registry.clone(), facade)?;
        self.fire_bundle_changed(id, BundleEventKind::Started);
        Ok(())
    }

    pub fn stop_bundle(&self, id: BundleId) -> Result<(), FrameworkError> {
        let _guard = self.global_lock.lock();
        let bundle = self.bundle(id).ok_or(FrameworkError::BundleNotFound(id))?;
        self.fire_bundle_changed(id, BundleEventKind::Stopping);
        bundle.stop()?;
        self.fire_bundle_changed(id, BundleEventKind::Stopped);
        Ok(())
    }

    /// Removes the bundle from the active set but keeps its location
    /// on record, so a later `install_bundle` of the same location
    /// reuses this id (spec ยง6; mirrors Celix's
    /// `celix_bundleContext_unloadBundle`).
    pub fn unload_bundle(self: &Arc<Self>, id: BundleId) -> Result<(), FrameworkError> {
        self.check_not_shutting_down()?;
        let _guard = self.global_lock.lock();
        let bundle = self.bundle(id).ok_or(FrameworkError::BundleNotFound(id))?;

        if bundle.state() == BundleState::Active {
            self.fire_bundle_changed(id, BundleEventKind::Stopping);
            bundle.stop()?;
            self.fire_bundle_changed(id, BundleEventKind::Stopped);
        }
        self.bundles.remove(&id);
        self.install_order.lock().retain(|b| *b != id);

        info!(bundle = id.0, "bundle unloaded");
        self.fire_bundle_changed(id, BundleEventKind::Uninstalled);
        Ok(())
    }

    /// Removes the bundle and forgets its location entirely, so a
    /// later `install_bundle` of the same location mints a brand new
    /// id (spec ยง6; mirrors Celix's
    /// `celix_bundleContext_uninstallBundle`).
    pub fn uninstall_bundle(self: &Arc<Self>, id: BundleId) -> Result<(), FrameworkError> {
        self.check_not_shutting_down()?;
        let _guard = self.global_lock.lock();
        let bundle = self.bundle(id).ok_or(FrameworkError::BundleNotFound(id))?;

        if bundle.state() == BundleState::Active {
            self.fire_bundle_changed(id, BundleEventKind::Stopping);
            bundle.stop()?;
            self.fire_bundle_changed(id, BundleEventKind::Stopped);
        }
        self.bundles.remove(&id);
        self.locations.retain(|_, v| *v != id);
        self.install_order.lock().retain(|b| *b != id);

        info!(bundle = id.0, "bundle uninstalled");
        self.fire_bundle_changed(id, BundleEventKind::Uninstalled);
        Ok(())
    }

    /// A simplified refresh: restarts an active bundle against its
    /// current archive revision. Dependency rewiring across bundles
    /// is out of scope (spec ยง1 excludes the resolver).
    pub fn update_bundle(self: &Arc<Self>, id: BundleId) -> Result<(), FrameworkError> {
        self.check_not_shutting_down()?;
        let _guard = self.global_lock.lock();
        let bundle = self.bundle(id).ok_or(FrameworkError::BundleNotFound(id))?;

        let was_active = bundle.state() == BundleState::Active;
        if was_active {
            self.fire_bundle_changed(id, BundleEventKind::Stopping);
            bundle.stop()?;
            self.fire_bundle_changed(id, BundleEventKind::Stopped);
        }
        self.fire_bundle_changed(id, BundleEventKind::Updated);
        if was_active {
            let facade: Arc<dyn FrameworkFacade> = self.clone();
            self.fire_bundle_changed(id, BundleEventKind::Starting);
            bundle.start(self.registry.clone(), facade)?;
            self.fire_bundle_changed(id, BundleEventKind::Started);
        }
        Ok(())
    }

    pub fn add_bundle_listener_raw(&self, callback: Arc<dyn Fn(BundleId, BundleEventKind) + Send + Sync>) -> u64 {
        let id = self.listener_ids.next() as u64;
        self.bundle_listeners.write().push(BundleListenerEntry { id, callback });
        id
    }

    pub fn add_framework_listener_raw(&self, callback: Arc<dyn Fn(String) + Send + Sync>) -> u64 {
        let id = self.listener_ids.next() as u64;
        self.framework_listeners
            .write()
            .push(FrameworkListenerEntry { id, callback });
        id
    }

    /// Stops every bundle except the framework itself in reverse
    /// installation order, drains the dispatcher, and wakes anyone
    /// blocked in `wait_for_stop`.
    pub async fn stop_framework(self: &Arc<Self>) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("framework shutting down");
        self.fire_framework_event("stopping".to_string());

        let order: Vec<BundleId> = self.install_order.lock().iter().rev().copied().collect();
        for id in order {
            if let Some(bundle) = self.bundle(id) {
                if bundle.state() == BundleState::Active {
                    self.fire_bundle_changed(id, BundleEventKind::Stopping);
                    match bundle.stop() {
                        Ok(()) => self.fire_bundle_changed(id, BundleEventKind::Stopped),
                        Err(err) => tracing::error!(bundle = id.0, error = %err, "failed to stop bundle during shutdown"),
                    }
                }
            }
        }

        self.dispatcher.drain().await;
        self.fire_framework_event("stopped".to_string());
        self.dispatcher.drain().await;
        self.stopped.notify_waiters();
    }

    /// Blocks until `stop_framework` has finished unwinding.
    pub async fn wait_for_stop(&self) {
        if self.shutting_down.load(Ordering::Acquire) {
            return;
        }
        self.stopped.notified().await;
    }
}

impl FrameworkFacade for Framework {
    fn add_bundle_listener(&self, _owner: BundleId, callback: Arc<dyn Fn(BundleId, BundleEventKind) + Send + Sync>) -> u64 {
        self.add_bundle_listener_raw(callback)
    }

    fn remove_bundle_listener(&self, id: u64) {
        self.bundle_listeners.write().retain(|l| l.id != id);
    }

    fn add_framework_listener(&self, _owner: BundleId, callback: Arc<dyn Fn(String) + Send + Sync>) -> u64 {
        self.add_framework_listener_raw(callback)
    }

    fn remove_framework_listener(&self, id: u64) {
        self.framework_listeners.write().retain(|l| l.id != id);
    }

    fn install_bundle(&self, location: &str) -> Result<BundleId, BundleError> {
        Framework::install_bundle(&self.self_arc(), location).map_err(framework_error_to_bundle_error)
    }

    fn start_bundle(&self, id: BundleId) -> Result<(), BundleError> {
        Framework::start_bundle(&self.self_arc(), id).map_err(framework_error_to_bundle_error)
    }

    fn stop_bundle(&self, id: BundleId) -> Result<(), BundleError> {
        Framework::stop_bundle(self, id).map_err(framework_error_to_bundle_error)
    }

    fn unload_bundle(&self, id: BundleId) -> Result<(), BundleError> {
        Framework::unload_bundle(&self.self_arc(), id).map_err(framework_error_to_bundle_error)
    }

    fn uninstall_bundle(&self, id: BundleId) -> Result<(), BundleError> {
        Framework::uninstall_bundle(&self.self_arc(), id).map_err(framework_error_to_bundle_error)
    }

    fn update_bundle(&self, id: BundleId) -> Result<(), BundleError> {
        Framework::update_bundle(&self.self_arc(), id).map_err(framework_error_to_bundle_error)
    }

    fn get_property(&self, key: &str) -> Option<PropertyValue> {
        self.config.properties.get(key).cloned()
    }
}

/// A context's `FrameworkFacade` seam speaks `BundleError`, while the
/// framework's own operations speak the broader `FrameworkError`;
/// this narrows the latter back down for that seam.
fn framework_error_to_bundle_error(err: FrameworkError) -> BundleError {
    match err {
        FrameworkError::Bundle(inner) => inner,
        FrameworkError::BundleNotFound(id) => BundleError::NotFound(id),
        other => BundleError::ActivatorFailed(BundleId(0), other.to_string()),
    }
}
