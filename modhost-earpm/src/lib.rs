//! MQTT-backed remote event-admin provider for the modhost module
//! services framework.
//!
//! Bridges OSGi-style events (`modhost_framework::properties::Properties`
//! payloads posted through a framework's `EventAdmin`) across an MQTT
//! v5 broker so multiple framework instances can exchange events over
//! the network. The local, in-process registry/tracker/bundle core
//! lives in `modhost-framework`; this crate adds no service-registry
//! semantics of its own, only the wire bridge.

pub mod client;
pub mod config;
pub mod deliverer;
pub mod errors;
pub mod remote;
pub mod service;

pub mod prelude;
