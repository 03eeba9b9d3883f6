//! Remote event-admin provider: wire protocol, peer-framework
//! bookkeeping, topic matching, and the service-facing provider core.

pub mod handler;
pub mod protocol;
pub mod provider;
mod topic_match;

pub use handler::{RemoteFrameworkState, RemoteFrameworkTable};
pub use protocol::{
    Envelope, HandlerEntry, HandlerInfoAdd, HandlerInfoRemove, HandlerInfoUpdate, UserEventBody, PROTOCOL_VERSION,
};
pub use provider::RemoteProvider;
