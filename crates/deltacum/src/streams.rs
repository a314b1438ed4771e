//! Stream maps and batch aggregation over them.
//!
//! The accumulator keeps one "last cumulative" point per stream. The map is
//! layered: a plain [`MemoryMap`] base, a [`SyncMap`] wrapper serializing
//! access behind a read/write lock, and (in `expiry`) a wrapper evicting
//! idle streams.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::data::Point;
use crate::delta::{AggregateError, Aggregator};
use crate::identity::StreamId;

/// A mapping from stream identity to that stream's last cumulative point.
///
/// `load` returns a clone so implementations are free to keep values behind
/// locks. `items` walks all entries until the callback returns `false`;
/// the traversal result reports whether it ran to completion. Callbacks
/// must not mutate the map; synchronized implementations hold their read
/// lock for the whole traversal.
pub trait Map<T> {
    fn load(&self, id: &StreamId) -> Option<T>;

    fn store(&mut self, id: StreamId, value: T);

    /// Removes the entry. Returns `true` if it existed.
    fn delete(&mut self, id: &StreamId) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn items(&self, visit: &mut dyn FnMut(&StreamId, &T) -> bool) -> bool;
}

/// Plain in-memory base map.
#[derive(Debug, Default)]
pub struct MemoryMap<T> {
    entries: HashMap<StreamId, T>,
}

impl<T> MemoryMap<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: Clone> Map<T> for MemoryMap<T> {
    fn load(&self, id: &StreamId) -> Option<T> {
        self.entries.get(id).cloned()
    }

    fn store(&mut self, id: StreamId, value: T) {
        self.entries.insert(id, value);
    }

    fn delete(&mut self, id: &StreamId) -> bool {
        self.entries.remove(id).is_some()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn items(&self, visit: &mut dyn FnMut(&StreamId, &T) -> bool) -> bool {
        for (id, value) in &self.entries {
            if !visit(id, value) {
                return false;
            }
        }
        true
    }
}

/// Serializes all access to an inner map with a read/write lock.
///
/// `load`, `len` and `items` take the shared lock (held across the whole
/// traversal for `items`); `store` and `delete` take the exclusive lock.
/// Clones share the same underlying map.
#[derive(Debug)]
pub struct SyncMap<M> {
    inner: Arc<RwLock<M>>,
}

impl<M> Clone for SyncMap<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> SyncMap<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }
}

impl<T, M: Map<T>> Map<T> for SyncMap<M> {
    fn load(&self, id: &StreamId) -> Option<T> {
        self.inner.read().unwrap().load(id)
    }

    fn store(&mut self, id: StreamId, value: T) {
        self.inner.write().unwrap().store(id, value);
    }

    fn delete(&mut self, id: &StreamId) -> bool {
        self.inner.write().unwrap().delete(id)
    }

    fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    fn items(&self, visit: &mut dyn FnMut(&StreamId, &T) -> bool) -> bool {
        self.inner.read().unwrap().items(visit)
    }
}

/// Per-stream failures collected over one batch.
///
/// Each failure is paired with the stream it came from, so a single bad
/// stream never aborts the batch.
#[derive(Debug, Default, PartialEq)]
pub struct UpdateErrors(Vec<(StreamId, AggregateError)>);

impl UpdateErrors {
    pub(crate) fn push(&mut self, id: StreamId, err: AggregateError) {
        self.0.push((id, err));
    }

    pub(crate) fn into_result(self) -> Result<(), UpdateErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(StreamId, AggregateError)> {
        self.0.iter()
    }
}

impl fmt::Display for UpdateErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (id, err)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "stream {id}: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for UpdateErrors {}

/// Aggregates a batch of samples, rewriting each delta into its cumulative
/// in place via [`Point::copy_to`]. Failed samples are dropped and reported
/// together.
pub fn update<D, A>(aggr: &mut A, samples: &mut [(StreamId, D)]) -> Result<(), UpdateErrors>
where
    D: Point,
    A: Aggregator<D>,
{
    let mut errs = UpdateErrors::default();
    for (id, dp) in samples.iter_mut() {
        match aggr.aggregate(*id, dp) {
            Ok(next) => next.copy_to(dp),
            Err(err) => errs.push(*id, err),
        }
    }
    errs.into_result()
}
