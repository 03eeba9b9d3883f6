//! Service registry, tracker and bundle lifecycle core of the modhost
//! module services framework.
//!
//! This crate has no network or I/O surface of its own — it is the
//! local, in-process half of the framework. The MQTT-backed remote
//! event bridge lives in `modhost-earpm` and depends on this crate
//! only for [`properties::Properties`] and its listener traits.

pub mod bundle;
pub mod filter;
pub mod framework;
pub mod properties;
pub mod registry;
pub mod tracker;
pub mod util;

pub mod prelude;
