//! A filter-scoped, live view onto the service registry.
//!
//! Opening a tracker subscribes to the registry's listener stream and
//! backfills with whatever already matches; closing it tears down the
//! subscription and releases every tracked reference. See spec ยง4.5.

mod customizer;

pub use customizer::ServiceTrackerCustomizer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::warn;

use crate::filter::Filter;
use crate::registry::{self, ListenerId, Payload, ServiceEvent, ServiceEventKind, ServiceReference};
use crate::util::{BundleId, IdSequence, RefCounted, ServiceId, TrackerId};

static TRACKER_IDS: IdSequence = IdSequence::starting_at(1);

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// A tracked entry plus the usage-count gate spec ยง4.3's `RefCounted`
/// primitive describes: `untrack` releases the tracker's own hold, but
/// `removed_service` only fires once every `use_highest_ranking_service`/
/// `use_services` call in flight against this entry has released its
/// own hold too — so a consumer mid-`f` never has the payload torn
/// down underneath it, without the registry dispatch path blocking to
/// wait.
struct Tracked {
    reference: ServiceReference,
    service: Payload,
    usage: RefCounted<ReleaseFn>,
}

struct Inner {
    id: TrackerId,
    registry: registry::ServiceRegistry,
    owner: BundleId,
    name: Option<String>,
    filter: Option<Filter>,
    customizer: Arc<dyn ServiceTrackerCustomizer>,
    tracked: DashMap<ServiceId, Arc<Tracked>>,
    highest: RwLock<Option<ServiceId>>,
    listener_id: RwLock<Option<ListenerId>>,
    open: AtomicBool,
}

/// Tracks every registered service matching a name and/or filter,
/// keeping a live set of `(reference, service)` pairs and re-electing
/// a "highest ranked" reference as membership changes.
#[derive(Clone)]
pub struct ServiceTracker {
    inner: Arc<Inner>,
}

impl ServiceTracker {
    pub fn new(
        registry: registry::ServiceRegistry,
        owner: BundleId,
        name: Option<String>,
        filter: Option<Filter>,
        customizer: Arc<dyn ServiceTrackerCustomizer>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: TrackerId(TRACKER_IDS.next()),
                registry,
                owner,
                name,
                filter,
                customizer,
                tracked: DashMap::new(),
                highest: RwLock::new(None),
                listener_id: RwLock::new(None),
                open: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> TrackerId {
        self.inner.id
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Subscribes to the registry and backfills with every currently
    /// matching reference. Calling `open` on an already-open tracker
    /// is a no-op.
    pub fn open(&self) {
        if self.inner.open.swap(true, Ordering::AcqRel) {
            return;
        }

        let tracker = self.clone();
        let listener_filter = self.inner.filter.clone();
        let listener_id = self.inner.registry.add_service_listener(
            self.inner.owner,
            listener_filter,
            Arc::new(move |event: ServiceEvent| tracker.handle_event(event)),
        );
        *self.inner.listener_id.write() = Some(listener_id);

        let existing = self
            .inner
            .registry
            .get_service_references(self.inner.name.as_deref(), self.inner.filter.as_ref());
        for reference in existing {
            self.track(reference);
        }
        self.reelect_highest();
    }

    /// Unsubscribes from the registry and releases every tracked
    /// reference, in no particular order (unlike bundle context
    /// teardown, tracked references carry no inter-dependency).
    pub fn close(&self) {
        if !self.inner.open.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(id) = self.inner.listener_id.write().take() {
            self.inner.registry.remove_service_listener(id);
        }
        let ids: Vec<ServiceId> = self.inner.tracked.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.untrack(id);
        }
        *self.inner.highest.write() = None;
        self.inner.customizer.set_highest(None);
    }

    fn matches_scope(&self, reference: &ServiceReference) -> bool {
        self.inner
            .name
            .as_deref()
            .map(|n| reference.name() == n)
            .unwrap_or(true)
    }

    fn track(&self, reference: ServiceReference) {
        if self.inner.tracked.contains_key(&reference.id()) || !self.matches_scope(&reference) {
            return;
        }
        if let Some(service) = self.inner.customizer.adding_service(&reference) {
            let customizer = self.inner.customizer.clone();
            let release_reference = reference.clone();
            let release_service = service.clone();
            let usage = RefCounted::new(Box::new(move || {
                customizer.removed_service(&release_reference, &release_service);
            }) as ReleaseFn);

            self.inner.tracked.insert(
                reference.id(),
                Arc::new(Tracked {
                    reference,
                    service,
                    usage,
                }),
            );
        }
    }

    /// Removes the entry from the tracked set immediately and releases
    /// the tracker's own hold on its usage counter. `removed_service`
    /// fires now only if nothing else is mid-use of the entry.
    fn untrack(&self, id: ServiceId) {
        if let Some((_, tracked)) = self.inner.tracked.remove(&id) {
            tracked.usage.release();
        }
    }

    fn reelect_highest(&self) {
        let candidate = registry::highest(self.inner.tracked.iter().map(|e| e.reference.clone()));
        let candidate_id = candidate.as_ref().map(|r| r.id());
        let mut current = self.inner.highest.write();
        if *current != candidate_id {
            *current = candidate_id;
            self.inner.customizer.set_highest(candidate.as_ref());
        }
    }

    fn handle_event(&self, event: ServiceEvent) {
        if !self.is_open() {
            return;
        }
        match event.kind {
            ServiceEventKind::Registered => {
                self.track(event.reference);
                self.reelect_highest();
            }
            ServiceEventKind::Modified => {
                // The tracked entry's `ServiceReference` shares the
                // registry's own entry, so it already reflects the new
                // properties — nothing to update but the notification.
                if let Some(entry) = self.inner.tracked.get(&event.reference.id()) {
                    let tracked = entry.value().clone();
                    drop(entry);
                    self.inner.customizer.modified_service(&tracked.reference, &tracked.service);
                } else if self.matches_scope(&event.reference) {
                    self.track(event.reference);
                }
                self.reelect_highest();
            }
            ServiceEventKind::ModifiedEndmatch | ServiceEventKind::Unregistering => {
                self.untrack(event.reference.id());
                self.reelect_highest();
            }
        }
    }

    /// Number of currently tracked references.
    pub fn size(&self) -> usize {
        self.inner.tracked.len()
    }

    /// Every currently tracked reference, in no guaranteed order.
    pub fn service_references(&self) -> Vec<ServiceReference> {
        self.inner.tracked.iter().map(|e| e.reference.clone()).collect()
    }

    /// The highest-ranked tracked reference, if any.
    pub fn highest_reference(&self) -> Option<ServiceReference> {
        let id = (*self.inner.highest.read())?;
        self.inner.tracked.get(&id).map(|e| e.reference.clone())
    }

    /// Runs `f` with the highest-ranked tracked service, or does
    /// nothing if the tracker currently has no matches. Holds an extra
    /// usage count on the entry for the duration of `f`, so a
    /// concurrent unregister cannot finish tearing it down until `f`
    /// returns.
    pub fn use_highest_ranking_service<R>(&self, f: impl FnOnce(&ServiceReference, &Payload) -> R) -> Option<R> {
        let id = (*self.inner.highest.read())?;
        let tracked = self.inner.tracked.get(&id)?.value().clone();
        if !tracked.usage.try_acquire() {
            // Lost the race against a concurrent untrack; nothing to run.
            return None;
        }
        let result = f(&tracked.reference, &tracked.service);
        tracked.usage.release();
        Some(result)
    }

    /// Runs `f` once per currently tracked service, each under the
    /// same usage-count guard as `use_highest_ranking_service`. Panics
    /// inside `f` are not caught here; callers that need isolation
    /// should catch per-invocation themselves, matching the registry's
    /// listener dispatch which does isolate.
    pub fn use_services(&self, mut f: impl FnMut(&ServiceReference, &Payload)) {
        let snapshot: Vec<Arc<Tracked>> = self.inner.tracked.iter().map(|e| e.value().clone()).collect();
        for tracked in snapshot {
            if tracked.usage.try_acquire() {
                f(&tracked.reference, &tracked.service);
                tracked.usage.release();
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.open.load(Ordering::Acquire) {
            warn!(bundle = self.owner.0, "service tracker dropped without close()");
        }
    }
}
