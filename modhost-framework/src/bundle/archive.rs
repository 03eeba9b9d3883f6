//! External collaborator seams: archive storage and native library
//! loading are supplied by the embedder, not implemented here.
//!
//! Manifest parsing and dependency resolution are out of scope; a
//! bundle only needs an opaque handle it can query for its current
//! revision's libraries and release on stop.

/// One native library recorded against a bundle's current revision.
///
/// `unloadable` mirrors a manifest flag: libraries not marked
/// unloadable are kept loaded across a stop (useful when debugging
/// with tools that can't survive a `dlclose`).
pub trait LibraryHandle: Send + Sync {
    fn name(&self) -> &str;
    fn unloadable(&self) -> bool;
    /// Releases the underlying library. Called at most once, in
    /// reverse registration order, during `stop`.
    fn unload(&self);
}

/// An installed bundle's backing storage: where it came from and
/// what native libraries its current revision carries.
pub trait BundleArchive: Send + Sync {
    fn location(&self) -> &str;
    fn libraries(&self) -> Vec<std::sync::Arc<dyn LibraryHandle>>;
}
