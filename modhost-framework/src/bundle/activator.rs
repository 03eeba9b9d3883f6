//! The contract a bundle's native entry points implement.

use super::context::BundleContext;
use super::error::BundleError;

/// Mirrors the `activator_create`/`activator_start`/`activator_stop`/
/// `activator_destroy` lookup in spec ยง4.6. `start` is the only
/// required method; a bundle with nothing to do on create/stop/destroy
/// can rely on the defaults.
pub trait BundleActivator: Send + Sync {
    fn create(&mut self, _ctx: &BundleContext) -> Result<(), BundleError> {
        Ok(())
    }

    fn start(&mut self, ctx: &BundleContext) -> Result<(), BundleError>;

    fn stop(&mut self, _ctx: &BundleContext) -> Result<(), BundleError> {
        Ok(())
    }

    fn destroy(&mut self, _ctx: &BundleContext) -> Result<(), BundleError> {
        Ok(())
    }
}
