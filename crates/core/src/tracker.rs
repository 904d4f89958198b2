//! Per-resource record of in-flight mutating commands.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use crate::model::ResourceId;

/// Set of ids with an outstanding mutating command. Clones share the set.
///
/// The set is local intent, not remote state: entries leave only through
/// [`OperationTracker::end`] (or a dropped [`OperationGuard`]), never because a
/// poll reported something.
#[derive(Debug)]
pub struct OperationTracker<K = ResourceId> {
    active: Arc<Mutex<HashSet<K>>>,
}

impl<K> Clone for OperationTracker<K> {
    fn clone(&self) -> Self {
        Self {
            active: Arc::clone(&self.active),
        }
    }
}

impl<K> Default for OperationTracker<K> {
    fn default() -> Self {
        Self {
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> OperationTracker<K> {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` as in flight. Returns `false`, changing nothing, if it
    /// already was; callers must then skip issuing the command.
    pub fn try_begin(&self, id: K) -> bool {
        self.lock().insert(id)
    }

    /// Removes `id` unconditionally.
    pub fn end(&self, id: &K) {
        self.lock().remove(id);
    }

    /// Whether `id` is in flight. Never blocks on I/O.
    pub fn is_active(&self, id: &K) -> bool {
        self.lock().contains(id)
    }

    /// Ids currently in flight.
    pub fn active(&self) -> Vec<K> {
        self.lock().iter().cloned().collect()
    }

    /// [`try_begin`](Self::try_begin) returning a guard that calls `end` when
    /// dropped, so every exit path (including cancellation) releases the id.
    pub fn begin_scoped(&self, id: K) -> Option<OperationGuard<K>> {
        if !self.try_begin(id.clone()) {
            return None;
        }
        Some(OperationGuard {
            tracker: self.clone(),
            id,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<K>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases its id on drop.
#[derive(Debug)]
pub struct OperationGuard<K: Eq + Hash + Clone = ResourceId> {
    tracker: OperationTracker<K>,
    id: K,
}

impl<K: Eq + Hash + Clone> OperationGuard<K> {
    /// Id this guard holds.
    pub fn id(&self) -> &K {
        &self.id
    }
}

impl<K: Eq + Hash + Clone> Drop for OperationGuard<K> {
    fn drop(&mut self) {
        self.tracker.end(&self.id);
    }
}
