//! Hook trait for reacting to a tracker's membership changes.

use crate::registry::{Payload, ServiceReference};

/// Callbacks fired as a [`super::ServiceTracker`]'s tracked set
/// changes. Every method has a no-op default so implementors only
/// override what they need.
pub trait ServiceTrackerCustomizer: Send + Sync {
    /// A new reference started matching the tracker's filter. Returns
    /// the payload to associate with it (typically the result of
    /// `get_service`); returning `None` excludes the reference from
    /// the tracked set.
    fn adding_service(&self, reference: &ServiceReference) -> Option<Payload>;

    /// The reference's properties changed and it still matches.
    fn modified_service(&self, _reference: &ServiceReference, _service: &Payload) {}

    /// The reference stopped matching, or was unregistered. Called
    /// after the entry has been removed from the tracked set.
    fn removed_service(&self, _reference: &ServiceReference, _service: &Payload) {}

    /// The tracked set's highest-ranked reference changed.
    fn set_highest(&self, _reference: Option<&ServiceReference>) {}
}
