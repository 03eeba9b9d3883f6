//! Installed bundles: their lifecycle state, context, activator and
//! native library handles.

pub mod activator;
pub mod archive;
pub mod context;
pub mod error;
pub mod lifecycle;

pub use activator::BundleActivator;
pub use archive::{BundleArchive, LibraryHandle};
pub use context::{BundleContext, FrameworkFacade};
pub use error::BundleError;
pub use lifecycle::{BundleEventKind, BundleState, Lifecycle};

use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, error, info};

use crate::registry::ServiceRegistry;
use crate::util::BundleId;

/// A single installed bundle: its archive, current lifecycle state,
/// context (while running) and activator instance.
///
/// `lock` is the bundle's recursive lock (spec ยง4.6): state
/// transitions hold it, and re-entrant calls made from within an
/// activator callback (e.g. a bundle starting another bundle as part
/// of its own `start`) do not deadlock against it.
pub struct Bundle {
    id: BundleId,
    archive: Arc<dyn BundleArchive>,
    lifecycle: Mutex<Lifecycle>,
    activator: Mutex<Option<Box<dyn BundleActivator>>>,
    context: Mutex<Option<Arc<BundleContext>>>,
    loaded_libraries: Mutex<Vec<Arc<dyn LibraryHandle>>>,
    lock: ReentrantMutex<()>,
}

impl Bundle {
    pub fn new(id: BundleId, archive: Arc<dyn BundleArchive>) -> Self {
        Self {
            id,
            archive,
            lifecycle: Mutex::new(Lifecycle::new()),
            activator: Mutex::new(None),
            context: Mutex::new(None),
            loaded_libraries: Mutex::new(Vec::new()),
            lock: ReentrantMutex::new(()),
        }
    }

    pub fn id(&self) -> BundleId {
        self.id
    }

    pub fn location(&self) -> &str {
        self.archive.location()
    }

    pub fn state(&self) -> BundleState {
        self.lifecycle.lock().state()
    }

    pub fn set_activator(&self, activator: Box<dyn BundleActivator>) {
        *self.activator.lock() = Some(activator);
    }

    /// Moves INSTALLED -> RESOLVED (the resolver itself is out of
    /// scope; this records that the move is permitted).
    pub fn resolve(&self) -> Result<(), BundleError> {
        let _guard = self.lock.lock();
        let mut lifecycle = self.lifecycle.lock();
        lifecycle
            .transition_to(BundleState::Resolved)
            .map_err(|(from, _to)| BundleError::IllegalState(self.id, from))
    }

    /// Loads native libraries, constructs a context, and runs the
    /// activator's `create` then `start`. Moves RESOLVED -> STARTING
    /// -> ACTIVE.
    pub fn start(&self, registry: ServiceRegistry, framework: Arc<dyn FrameworkFacade>) -> Result<(), BundleError> {
        let _guard = self.lock.lock();
        {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle
                .transition_to(BundleState::Starting)
                .map_err(|(from, _to)| BundleError::IllegalState(self.id, from))?;
        }
        info!(bundle = self.id.0, "bundle starting");

        *self.loaded_libraries.lock() = self.archive.libraries();

        let ctx = Arc::new(BundleContext::new(self.id, registry, framework));
        *self.context.lock() = Some(ctx.clone());

        let result = (|| -> Result<(), BundleError> {
            let mut activator = self.activator.lock();
            let activator = activator
                .as_mut()
                .ok_or_else(|| BundleError::ActivatorFailed(self.id, "no activator set".into()))?;
            activator.create(&ctx)?;
            activator.start(&ctx)?;
            Ok(())
        })();

        if let Err(err) = result {
            error!(bundle = self.id.0, error = %err, "activator failed to start");
            *self.context.lock() = None;
            self.lifecycle.lock().transition_to(BundleState::Resolved).ok();
            return Err(err);
        }

        self.lifecycle
            .lock()
            .transition_to(BundleState::Active)
            .map_err(|(from, _to)| BundleError::IllegalState(self.id, from))?;
        info!(bundle = self.id.0, "bundle active");
        Ok(())
    }

    /// Runs the activator's `stop` then `destroy`, destroys the
    /// context (tearing down every registration/tracker/listener it
    /// created, in reverse order), and unloads unloadable libraries in
    /// reverse registration order. Moves ACTIVE -> STOPPING ->
    /// RESOLVED.
    pub fn stop(&self) -> Result<(), BundleError> {
        let _guard = self.lock.lock();
        {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle
                .transition_to(BundleState::Stopping)
                .map_err(|(from, _to)| BundleError::IllegalState(self.id, from))?;
        }
        debug!(bundle = self.id.0, "bundle stopping");

        if let Some(ctx) = self.context.lock().clone() {
            let mut activator = self.activator.lock();
            if let Some(activator) = activator.as_mut() {
                if let Err(err) = activator.stop(&ctx) {
                    error!(bundle = self.id.0, error = %err, "activator stop failed, continuing teardown");
                }
                if let Err(err) = activator.destroy(&ctx) {
                    error!(bundle = self.id.0, error = %err, "activator destroy failed, continuing teardown");
                }
            }
            ctx.destroy();
        }
        *self.context.lock() = None;

        for library in self.loaded_libraries.lock().drain(..).rev().collect::<Vec<_>>() {
            if library.unloadable() {
                library.unload();
            }
        }

        self.lifecycle
            .lock()
            .transition_to(BundleState::Resolved)
            .map_err(|(from, _to)| BundleError::IllegalState(self.id, from))?;
        info!(bundle = self.id.0, "bundle stopped");
        Ok(())
    }
}
