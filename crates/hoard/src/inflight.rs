// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The in-flight registry: one pending result per key, plus call statistics.
//!
//! The registry lock is the single synchronization point of the cache. Looking up
//! a key and registering a new pending result happen under it, together with the
//! stats update for the caller's role, so two callers can never both become the
//! leader for the same key.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{CacheKey, CacheStats};

/// Single-assignment result shared by a leader with its followers.
pub(crate) type Outcome<A, E> = Option<Result<A, E>>;
type Slot<A, E> = watch::Sender<Outcome<A, E>>;

/// Callers asking for the same key but different result types never share a result.
type EntryId = (CacheKey, TypeId);

struct PendingEntry {
    generation: u64,
    slot: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct State {
    pending: HashMap<EntryId, PendingEntry>,
    next_generation: u64,
    stats: CacheStats,
}

#[derive(Default)]
pub(crate) struct Registry {
    state: Mutex<State>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Registry")
            .field("in_flight", &state.pending.len())
            .field("stats", &state.stats)
            .finish()
    }
}

/// What a caller has to do for a key.
pub(crate) enum Role<'a, A, E> {
    /// Nobody was computing the key: look it up, compute it and settle the result.
    Leader(LeaderGuard<'a, A, E>),
    /// Someone else is: wait for their result.
    Follower(watch::Receiver<Outcome<A, E>>),
}

impl Registry {
    /// Joins the computation of `key`, becoming its leader if there is none.
    ///
    /// A follower is counted as deferred right away; leaders are counted once
    /// they know whether they hit or missed.
    pub(crate) fn join<A, E>(&self, key: &CacheKey) -> Role<'_, A, E>
    where
        A: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        let id = (key.clone(), TypeId::of::<Outcome<A, E>>());
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(slot) = state.pending.get(&id).and_then(|entry| entry.slot.downcast_ref::<Slot<A, E>>()) {
            let receiver = slot.subscribe();
            state.stats.deferred += 1;
            return Role::Follower(receiver);
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        let (sender, _) = watch::channel(None);
        let sender = Arc::new(sender);
        state.pending.insert(
            id.clone(),
            PendingEntry {
                generation,
                slot: Arc::clone(&sender) as Arc<dyn Any + Send + Sync>,
            },
        );

        Role::Leader(LeaderGuard {
            registry: self,
            id,
            generation,
            sender,
        })
    }

    pub(crate) fn record_hit(&self) {
        self.state.lock().stats.hits += 1;
    }

    pub(crate) fn record_miss(&self) {
        self.state.lock().stats.misses += 1;
    }

    /// Takes back a deferred count from a follower whose leader went away.
    pub(crate) fn withdraw_deferred(&self) {
        let mut state = self.state.lock();
        state.stats.deferred = state.stats.deferred.saturating_sub(1);
    }

    pub(crate) fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.state.lock().pending.len()
    }
}

/// Held by the leader of a key.
///
/// Dropping the guard removes the registry entry, whether or not a result was
/// settled. Followers of a leader that went away without settling observe a
/// closed channel and retry.
pub(crate) struct LeaderGuard<'a, A, E> {
    registry: &'a Registry,
    id: EntryId,
    generation: u64,
    sender: Arc<Slot<A, E>>,
}

impl<A, E> LeaderGuard<'_, A, E> {
    /// Publishes the outcome to every follower and leaves the registry.
    pub(crate) fn settle(self, outcome: Result<A, E>) {
        self.sender.send_replace(Some(outcome));
    }
}

impl<A, E> Drop for LeaderGuard<'_, A, E> {
    fn drop(&mut self) {
        let mut state = self.registry.state.lock();
        if state.pending.get(&self.id).is_some_and(|entry| entry.generation == self.generation) {
            state.pending.remove(&self.id);
        }
    }
}
