//! Small shared primitives used across the framework crate.

mod ids;
mod refcount;

pub use ids::{BundleId, IdSequence, ServiceId, TrackerId};
pub use refcount::RefCounted;
