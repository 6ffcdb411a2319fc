//! One cached collection: server base, optimistic layers, and revalidation
//! bookkeeping. Pure data; `RemoteCache` owns locking and I/O.

#[cfg(test)]
#[path = "entry_test.rs"]
mod entry_test;

use std::fmt;
use std::sync::Arc;

/// Maps the current visible items to the next visible items.
pub type PatchFn<T> = Arc<dyn Fn(&[T]) -> Vec<T> + Send + Sync>;

/// Handle to one optimistic layer, unique per cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub(crate) u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer-{}", self.0)
    }
}

pub(crate) struct Layer<T> {
    pub id: LayerId,
    pub patch: PatchFn<T>,
    /// Newest revalidation sequence issued when the layer settled.
    /// `None` while its request is still in flight.
    pub settled_at: Option<u64>,
}

/// Read-only snapshot of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionState<T> {
    pub items: Vec<T>,
    /// Milliseconds since Unix epoch of the last applied server read.
    pub last_fetched_at: Option<i64>,
    pub is_validating: bool,
    /// Visible items include at least one optimistic layer.
    pub is_optimistic: bool,
}

pub(crate) struct Entry<T> {
    pub base: Vec<T>,
    pub layers: Vec<Layer<T>>,
    pub last_fetched_at: Option<i64>,
    /// Last revalidation sequence handed out.
    pub issued_seq: u64,
    /// Sequence of the newest response applied to `base`.
    pub applied_seq: u64,
    pub in_flight: usize,
}

impl<T> Default for Entry<T> {
    fn default() -> Self {
        Self {
            base: Vec::new(),
            layers: Vec::new(),
            last_fetched_at: None,
            issued_seq: 0,
            applied_seq: 0,
            in_flight: 0,
        }
    }
}

impl<T: Clone> Entry<T> {
    /// Base with every layer applied in order.
    pub fn visible(&self) -> Vec<T> {
        self.layers
            .iter()
            .fold(self.base.clone(), |items, layer| (layer.patch)(&items))
    }

    pub fn snapshot(&self) -> CollectionState<T> {
        CollectionState {
            items: self.visible(),
            last_fetched_at: self.last_fetched_at,
            is_validating: self.in_flight > 0,
            is_optimistic: !self.layers.is_empty(),
        }
    }

    pub fn push(&mut self, id: LayerId, patch: PatchFn<T>, settled: bool) {
        let settled_at = settled.then_some(self.issued_seq);
        self.layers.push(Layer { id, patch, settled_at });
    }

    /// Mark a pending layer settled. Returns false if the layer is gone.
    pub fn settle(&mut self, id: LayerId) -> bool {
        let issued = self.issued_seq;
        match self.layers.iter_mut().find(|l| l.id == id) {
            Some(layer) => {
                layer.settled_at.get_or_insert(issued);
                true
            }
            None => false,
        }
    }

    /// Remove a layer. Returns false if it was already gone.
    pub fn remove(&mut self, id: LayerId) -> bool {
        let before = self.layers.len();
        self.layers.retain(|l| l.id != id);
        self.layers.len() != before
    }

    /// Hand out the next revalidation sequence.
    pub fn issue(&mut self) -> u64 {
        self.issued_seq += 1;
        self.in_flight += 1;
        self.issued_seq
    }

    /// Apply a server read issued as `seq`. Returns false if a newer read
    /// already landed. Settled layers older than `seq` are folded away.
    pub fn apply(&mut self, seq: u64, items: Vec<T>, fetched_at: i64) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        if seq <= self.applied_seq {
            return false;
        }
        self.base = items;
        self.applied_seq = seq;
        self.last_fetched_at = Some(fetched_at);
        self.layers
            .retain(|l| l.settled_at.is_none_or(|settled| settled >= seq));
        true
    }

    /// A read issued as some sequence failed.
    pub fn fail(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}
