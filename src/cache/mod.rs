//! Remote data cache: keyed server collections with optimistic layers.
//!
//! DESIGN
//! ======
//! Each `RouteKey` maps to an entry holding the last server read (the
//! base) and an ordered stack of optimistic layers. Readers always see the
//! layers folded over the base, so dropping a layer restores exactly the
//! list that existed without it.
//!
//! Layers are either pending (their request is in flight) or settled.
//! A revalidation replaces the base and folds away every layer that settled
//! before the read was issued; pending layers stay on top until their
//! mutation resolves.
//!
//! ORDERING
//! ========
//! Patches to one key apply in call order. Every revalidation gets a
//! per-key sequence number when it is issued; a response whose sequence is
//! not newer than the last applied one is discarded, so a slow stale read
//! can never overwrite a newer one.
//!
//! The state mutex is held only for synchronous sections, never across an
//! `.await`.


pub mod entry;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use entry::{CollectionState, LayerId, PatchFn};
use entry::Entry;

use crate::net::request::now_ms;
use crate::net::types::{ApiError, Resource, decode_collection};
use crate::net::{RouteKey, Transport};

const EVENT_CAPACITY: usize = 256;

// =============================================================================
// TYPES
// =============================================================================

/// Options for a plain optimistic patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchOptions {
    /// Schedule a refetch right after patching.
    pub revalidate: bool,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self { revalidate: true }
    }
}

impl PatchOptions {
    /// Keep the optimistic state until the next revalidation from elsewhere.
    pub const TERMINAL: Self = Self { revalidate: false };
}

/// Result of a revalidation that reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevalidateOutcome {
    /// The response replaced the base.
    Applied,
    /// A newer response had already been applied.
    Discarded,
}

/// What changed an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventCause {
    Patched,
    RolledBack,
    Revalidated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub key: RouteKey,
    pub cause: CacheEventCause,
}

pub type RevalidateHandle = JoinHandle<Result<RevalidateOutcome, ApiError>>;

/// Returned by `patch`: the layer it pushed and the scheduled refetch, if any.
pub struct PatchHandle {
    pub layer: LayerId,
    pub revalidation: Option<RevalidateHandle>,
}

// =============================================================================
// CACHE
// =============================================================================

/// Shared cache for one resource type. Cheap to clone.
pub struct RemoteCache<T: Resource> {
    inner: Arc<Mutex<CacheInner<T>>>,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<CacheEvent>,
}

struct CacheInner<T> {
    entries: HashMap<RouteKey, Entry<T>>,
    next_layer: u64,
}

impl<T: Resource> Clone for RemoteCache<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner), transport: Arc::clone(&self.transport), events: self.events.clone() }
    }
}

impl<T: Resource> RemoteCache<T> {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(CacheInner { entries: HashMap::new(), next_layer: 0 })),
            transport,
            events,
        }
    }

    #[must_use]
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, key: &RouteKey, cause: CacheEventCause) {
        // No receivers is fine.
        let _ = self.events.send(CacheEvent { key: key.clone(), cause });
    }

    /// Receive an event for every change to any key.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Current state of `key`. Unknown keys read as empty and never fetched.
    #[must_use]
    pub fn get(&self, key: &RouteKey) -> CollectionState<T> {
        let inner = self.lock();
        match inner.entries.get(key) {
            Some(entry) => entry.snapshot(),
            None => CollectionState { items: Vec::new(), last_fetched_at: None, is_validating: false, is_optimistic: false },
        }
    }

    #[must_use]
    pub fn items(&self, key: &RouteKey) -> Vec<T> {
        self.get(key).items
    }

    // =========================================================================
    // PATCHES
    // =========================================================================

    /// Apply `update` to the visible items now and, unless disabled,
    /// schedule a refetch. Must be called inside a tokio runtime when
    /// `options.revalidate` is set.
    pub fn patch(
        &self,
        key: &RouteKey,
        update: impl Fn(&[T]) -> Vec<T> + Send + Sync + 'static,
        options: PatchOptions,
    ) -> PatchHandle {
        let layer = self.insert_layer(key, Arc::new(update), true);
        let revalidation = options.revalidate.then(|| self.spawn_revalidate(key.clone()));
        PatchHandle { layer, revalidation }
    }

    /// Push a pending layer for an in-flight mutation.
    pub fn push_layer(&self, key: &RouteKey, patch: PatchFn<T>) -> LayerId {
        self.insert_layer(key, patch, false)
    }

    fn insert_layer(&self, key: &RouteKey, patch: PatchFn<T>, settled: bool) -> LayerId {
        let mut inner = self.lock();
        inner.next_layer += 1;
        let id = LayerId(inner.next_layer);
        inner.entries.entry(key.clone()).or_default().push(id, patch, settled);
        drop(inner);
        self.emit(key, CacheEventCause::Patched);
        id
    }

    /// The layer's request succeeded; the next revalidation may fold it away.
    pub fn settle_layer(&self, key: &RouteKey, layer: LayerId) {
        let settled = self
            .lock()
            .entries
            .get_mut(key)
            .is_some_and(|entry| entry.settle(layer));
        if !settled {
            debug!(%key, %layer, "settle for unknown layer");
        }
    }

    /// Discard a layer, restoring the list as it would be without it.
    pub fn drop_layer(&self, key: &RouteKey, layer: LayerId) {
        let removed = self
            .lock()
            .entries
            .get_mut(key)
            .is_some_and(|entry| entry.remove(layer));
        if removed {
            self.emit(key, CacheEventCause::RolledBack);
        }
    }

    // =========================================================================
    // REVALIDATION
    // =========================================================================

    fn issue(&self, key: &RouteKey) -> u64 {
        self.lock().entries.entry(key.clone()).or_default().issue()
    }

    /// Refetch `key` and replace its base with the server's collection.
    ///
    /// # Errors
    ///
    /// Returns the transport or decode error; the entry is left unchanged.
    pub async fn revalidate(&self, key: &RouteKey) -> Result<RevalidateOutcome, ApiError> {
        let seq = self.issue(key);
        self.fetch(key, seq).await
    }

    /// Issue a revalidation now and finish it in the background.
    ///
    /// The sequence number is taken before returning, so anything settled
    /// after this call is not folded away by this read.
    pub fn spawn_revalidate(&self, key: RouteKey) -> RevalidateHandle {
        let seq = self.issue(&key);
        let cache = self.clone();
        tokio::spawn(async move { cache.fetch(&key, seq).await })
    }

    async fn fetch(&self, key: &RouteKey, seq: u64) -> Result<RevalidateOutcome, ApiError> {
        let request = key.fetch_request();
        let result = self
            .transport
            .send(&request)
            .await
            .and_then(|body| decode_collection::<T>(&body));

        let items = match result {
            Ok(items) => items,
            Err(e) => {
                if let Some(entry) = self.lock().entries.get_mut(key) {
                    entry.fail();
                }
                warn!(%key, seq, error = %e, "revalidation failed");
                return Err(e);
            }
        };

        let applied = self
            .lock()
            .entries
            .entry(key.clone())
            .or_default()
            .apply(seq, items, now_ms());

        if applied {
            self.emit(key, CacheEventCause::Revalidated);
            Ok(RevalidateOutcome::Applied)
        } else {
            debug!(%key, seq, "discarded stale revalidation");
            Ok(RevalidateOutcome::Discarded)
        }
    }
}
