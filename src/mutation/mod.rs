//! Optimistic mutation executor.
//!
//! ARCHITECTURE
//! ============
//! A `Mutation` names the collection it predicts into, the request that
//! makes the change real, and a predicted patch. `Executor::begin` applies
//! the prediction as a pending cache layer and returns an `InFlight`;
//! `InFlight::run` sends the request and resolves the mutation:
//!
//! ```text
//! begin ──► layer pushed (Pending) ──► send ──┬─ ok ──► settle layer, on_success, revalidate (Confirmed)
//!                                             └─ err ─► drop layer, warn unless silent (RolledBack)
//! ```
//!
//! LANES
//! =====
//! Mutations sharing a lane send their requests strictly in `begin` order.
//! Each `begin` takes the previous tail's completion receiver and installs
//! its own; `run` waits on the former and fires the latter when resolved.
//! Predictions never wait. A request may be deferred until its turn so it
//! can use ids the previous mutation learned from the server.
//!
//! ERROR HANDLING
//! ==============
//! Failures never retry. The layer is dropped, which restores the exact
//! pre-mutation list, and the error comes back as `MutationError`.


pub mod notify;
pub mod state;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use notify::{Notifier, TracingNotifier};
pub use state::{MutationEvent, MutationState};

use crate::cache::{LayerId, PatchFn, RemoteCache};
use crate::net::{ApiError, ErrorCode, FieldErrors, Request, Resource, RouteKey};

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MutationError {
    #[error("failed to {descriptor}: {source}")]
    Rejected { descriptor: String, source: ApiError },
}

impl MutationError {
    /// Field-level messages when the server rejected the write as invalid.
    #[must_use]
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Rejected { source: ApiError::Validation(fields), .. } => Some(fields),
            Self::Rejected { .. } => None,
        }
    }
}

impl ErrorCode for MutationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Rejected { source, .. } => source.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Rejected { source, .. } => source.retryable(),
        }
    }
}

// =============================================================================
// MUTATION
// =============================================================================

/// What happens when the request fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Roll back and warn the user.
    #[default]
    Notify,
    /// Roll back and log at debug.
    Silent,
}

type DeferredRequest = Box<dyn FnOnce() -> Option<Request> + Send>;
type SuccessHook = Box<dyn FnOnce(&serde_json::Value) + Send>;

enum RequestSource {
    Ready(Request),
    /// Built when the mutation's lane turn comes. `None` means there is
    /// nothing left to send.
    Deferred { descriptor: String, build: DeferredRequest },
}

/// One optimistic write against one cached collection.
pub struct Mutation<T: Resource> {
    key: RouteKey,
    source: RequestSource,
    predicted: Option<PatchFn<T>>,
    failure: FailureMode,
    revalidate_on_success: bool,
    lane: Option<String>,
    on_success: Option<SuccessHook>,
}

impl<T: Resource> Mutation<T> {
    #[must_use]
    pub fn new(key: RouteKey, request: Request) -> Self {
        Self::with_source(key, RequestSource::Ready(request))
    }

    /// A mutation whose request is built when its turn comes.
    #[must_use]
    pub fn deferred(
        key: RouteKey,
        descriptor: impl Into<String>,
        build: impl FnOnce() -> Option<Request> + Send + 'static,
    ) -> Self {
        Self::with_source(key, RequestSource::Deferred { descriptor: descriptor.into(), build: Box::new(build) })
    }

    fn with_source(key: RouteKey, source: RequestSource) -> Self {
        Self {
            key,
            source,
            predicted: None,
            failure: FailureMode::Notify,
            revalidate_on_success: true,
            lane: None,
            on_success: None,
        }
    }

    #[must_use]
    pub fn predict(mut self, patch: impl Fn(&[T]) -> Vec<T> + Send + Sync + 'static) -> Self {
        self.predicted = Some(Arc::new(patch));
        self
    }

    #[must_use]
    pub fn silent(mut self) -> Self {
        self.failure = FailureMode::Silent;
        self
    }

    #[must_use]
    pub fn without_revalidation(mut self) -> Self {
        self.revalidate_on_success = false;
        self
    }

    #[must_use]
    pub fn in_lane(mut self, lane: impl Into<String>) -> Self {
        self.lane = Some(lane.into());
        self
    }

    #[must_use]
    pub fn on_success(mut self, hook: impl FnOnce(&serde_json::Value) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn descriptor(&self) -> &str {
        match &self.source {
            RequestSource::Ready(request) => &request.descriptor,
            RequestSource::Deferred { descriptor, .. } => descriptor,
        }
    }
}

// =============================================================================
// EXECUTOR
// =============================================================================

/// Ledger entry for a mutation that has not resolved yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub id: Uuid,
    pub key: RouteKey,
    pub descriptor: String,
    pub layer: Option<LayerId>,
    pub state: MutationState,
    /// Position in `begin` order across the executor.
    pub seq: u64,
}

struct LaneTail {
    ticket: u64,
    done: oneshot::Receiver<()>,
}

struct ExecutorInner {
    pending: HashMap<Uuid, PendingMutation>,
    lanes: HashMap<String, LaneTail>,
    next_ticket: u64,
}

/// Runs mutations against one cache. Cheap to clone.
pub struct Executor<T: Resource> {
    cache: RemoteCache<T>,
    notifier: Arc<dyn Notifier>,
    inner: Arc<Mutex<ExecutorInner>>,
}

impl<T: Resource> Clone for Executor<T> {
    fn clone(&self) -> Self {
        Self { cache: self.cache.clone(), notifier: Arc::clone(&self.notifier), inner: Arc::clone(&self.inner) }
    }
}

impl<T: Resource> fmt::Debug for Executor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("pending", &self.lock().pending.len())
            .finish_non_exhaustive()
    }
}

impl<T: Resource> Executor<T> {
    #[must_use]
    pub fn new(cache: RemoteCache<T>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            cache,
            notifier,
            inner: Arc::new(Mutex::new(ExecutorInner {
                pending: HashMap::new(),
                lanes: HashMap::new(),
                next_ticket: 0,
            })),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &RemoteCache<T> {
        &self.cache
    }

    fn lock(&self) -> MutexGuard<'_, ExecutorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unresolved mutations, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingMutation> {
        let mut pending: Vec<_> = self.lock().pending.values().cloned().collect();
        pending.sort_by_key(|p| p.seq);
        pending
    }

    /// Whether any unresolved mutation targets `key`.
    #[must_use]
    pub fn is_mutating(&self, key: &RouteKey) -> bool {
        self.lock().pending.values().any(|p| &p.key == key)
    }

    /// Apply the prediction now and queue the request behind its lane.
    pub fn begin(&self, mutation: Mutation<T>) -> InFlight<T> {
        let Mutation { key, source, predicted, failure, revalidate_on_success, lane, on_success } = mutation;
        let layer = predicted.map(|patch| self.cache.push_layer(&key, patch));
        let descriptor = match &source {
            RequestSource::Ready(request) => request.descriptor.clone(),
            RequestSource::Deferred { descriptor, .. } => descriptor.clone(),
        };
        let id = Uuid::new_v4();

        let mut inner = self.lock();
        inner.next_ticket += 1;
        let seq = inner.next_ticket;
        let lane = lane.map(|name| {
            let ticket = seq;
            let (tx, rx) = oneshot::channel();
            let previous = inner.lanes.insert(name.clone(), LaneTail { ticket, done: rx });
            LaneSlot { name, ticket, wait: previous.map(|tail| tail.done), done: tx }
        });
        inner.pending.insert(
            id,
            PendingMutation {
                id,
                key: key.clone(),
                descriptor: descriptor.clone(),
                layer,
                state: MutationState::Pending,
                seq,
            },
        );
        drop(inner);

        debug!(%id, %key, descriptor = %descriptor, "mutation applied");

        InFlight {
            ledger: Ledger {
                executor: self.clone(),
                id,
                lane: lane.as_ref().map(|slot| (slot.name.clone(), slot.ticket)),
                resolved: false,
            },
            key,
            descriptor,
            source,
            layer,
            failure,
            revalidate_on_success,
            lane,
            on_success,
        }
    }

    /// `begin` then `run`.
    ///
    /// # Errors
    ///
    /// See [`InFlight::run`].
    pub async fn execute(&self, mutation: Mutation<T>) -> Result<Option<serde_json::Value>, MutationError> {
        self.begin(mutation).run().await
    }

    /// Resolve the ledger entry and release the lane.
    fn resolve(&self, id: Uuid, event: MutationEvent, lane: Option<LaneSlot>) -> MutationState {
        let mut inner = self.lock();
        let state = inner
            .pending
            .remove(&id)
            .map_or(MutationState::Pending, |p| p.state)
            .apply(event);
        if let Some(slot) = lane {
            if inner.lanes.get(&slot.name).is_some_and(|tail| tail.ticket == slot.ticket) {
                inner.lanes.remove(&slot.name);
            }
            let _ = slot.done.send(());
        }
        state
    }
}

struct LaneSlot {
    name: String,
    ticket: u64,
    wait: Option<oneshot::Receiver<()>>,
    done: oneshot::Sender<()>,
}

// =============================================================================
// IN FLIGHT
// =============================================================================

/// A mutation whose prediction is applied and whose request has not resolved.
///
/// Dropping it without calling `run` releases its lane, clears its ledger
/// entry, and settles the prediction so the next revalidation replaces it.
pub struct InFlight<T: Resource> {
    ledger: Ledger<T>,
    key: RouteKey,
    descriptor: String,
    source: RequestSource,
    layer: Option<LayerId>,
    failure: FailureMode,
    revalidate_on_success: bool,
    lane: Option<LaneSlot>,
    on_success: Option<SuccessHook>,
}

/// The executor-side record of one `InFlight`.
struct Ledger<T: Resource> {
    executor: Executor<T>,
    id: Uuid,
    lane: Option<(String, u64)>,
    resolved: bool,
}

impl<T: Resource> Ledger<T> {
    fn resolve(&mut self, event: MutationEvent, lane: Option<LaneSlot>) -> MutationState {
        self.resolved = true;
        self.executor.resolve(self.id, event, lane)
    }
}

impl<T: Resource> Drop for Ledger<T> {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        let entry = {
            let mut inner = self.executor.lock();
            if let Some((name, ticket)) = &self.lane {
                if inner.lanes.get(name).is_some_and(|tail| tail.ticket == *ticket) {
                    inner.lanes.remove(name);
                }
            }
            inner.pending.remove(&self.id)
        };
        if let Some(entry) = entry {
            if let Some(layer) = entry.layer {
                self.executor.cache.settle_layer(&entry.key, layer);
            }
            debug!(id = %self.id, descriptor = %entry.descriptor, "mutation abandoned");
        }
    }
}

impl<T: Resource> InFlight<T> {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.ledger.id
    }

    #[must_use]
    pub fn layer(&self) -> Option<LayerId> {
        self.layer
    }

    /// Send the request and resolve the mutation.
    ///
    /// Returns the response body, or `None` when a deferred request had
    /// nothing to send.
    ///
    /// # Errors
    ///
    /// Returns `MutationError::Rejected` when the request fails; the
    /// prediction has already been rolled back.
    pub async fn run(mut self) -> Result<Option<serde_json::Value>, MutationError> {
        if let Some(wait) = self.lane.as_mut().and_then(|slot| slot.wait.take()) {
            // A dropped predecessor also releases us.
            let _ = wait.await;
        }

        let id = self.ledger.id;
        let request = match self.source {
            RequestSource::Ready(request) => Some(request),
            RequestSource::Deferred { build, .. } => build(),
        };
        let cache = self.ledger.executor.cache.clone();

        let Some(request) = request else {
            debug!(%id, descriptor = %self.descriptor, "nothing to send");
            if let Some(layer) = self.layer {
                cache.settle_layer(&self.key, layer);
            }
            self.ledger.resolve(MutationEvent::Succeeded, self.lane);
            return Ok(None);
        };

        match cache.transport().send(&request).await {
            Ok(body) => {
                if let Some(layer) = self.layer {
                    cache.settle_layer(&self.key, layer);
                }
                if let Some(hook) = self.on_success {
                    hook(&body);
                }
                let state = self.ledger.resolve(MutationEvent::Succeeded, self.lane);
                info!(%id, descriptor = %self.descriptor, ?state, "mutation confirmed");
                if self.revalidate_on_success {
                    if let Err(e) = cache.revalidate(&self.key).await {
                        debug!(key = %self.key, error = %e, "post-mutation revalidation failed");
                    }
                }
                Ok(Some(body))
            }
            Err(e) => {
                if let Some(layer) = self.layer {
                    cache.drop_layer(&self.key, layer);
                }
                let state = self.ledger.resolve(MutationEvent::Failed, self.lane);
                match self.failure {
                    FailureMode::Notify => {
                        warn!(%id, descriptor = %self.descriptor, ?state, error = %e, code = e.error_code(), "mutation rolled back");
                        self.ledger
                            .executor
                            .notifier
                            .warn(&format!("failed to {}", self.descriptor), &e.to_string());
                    }
                    FailureMode::Silent => {
                        debug!(%id, descriptor = %self.descriptor, error = %e, "silent mutation failed");
                    }
                }
                Err(MutationError::Rejected { descriptor: self.descriptor, source: e })
            }
        }
    }

    /// Run on the tokio runtime without waiting.
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<Option<serde_json::Value>, MutationError>> {
        tokio::spawn(self.run())
    }
}
