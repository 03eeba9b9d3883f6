//! Commonly used types, re-exported for a single `use modhost_framework::prelude::*;`.

pub use crate::bundle::{
    Bundle, BundleActivator, BundleArchive, BundleContext, BundleError, BundleState, FrameworkFacade, LibraryHandle,
};
pub use crate::filter::{Filter, FilterError};
pub use crate::framework::{Framework, FrameworkConfig, FrameworkConfigBuilder, FrameworkError};
pub use crate::properties::{Properties, PropertyValue, Version};
pub use crate::registry::{
    Payload, Registration, RegistryError, ServiceEvent, ServiceEventKind, ServiceFactory, ServiceKind,
    ServiceReference, ServiceRegistry,
};
pub use crate::tracker::{ServiceTracker, ServiceTrackerCustomizer};
pub use crate::util::{BundleId, IdSequence, ServiceId, TrackerId};
