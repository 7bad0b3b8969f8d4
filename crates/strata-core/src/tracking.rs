// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tracked-unit membership set.
//!
//! The gate in front of all store work: checkpoints for units that were never
//! opted in cost one sharded read-locked probe and nothing else. Membership
//! is partitioned across [`NUM_SHARDS`] shards by [`shard_of`] so unrelated
//! units never contend on a common lock.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rustc_hash::FxHashSet;

use crate::ident::{shard_of, UnitId, NUM_SHARDS};

/// Concurrent set of unit ids currently under observation.
///
/// All operations are idempotent and total. Start/stop for the *same* id from
/// concurrent callers is a caller-side protocol error (last writer wins, per
/// shard-lock ordering); the set only guarantees memory safety there, not
/// arbitration.
///
/// Embedders normally mutate membership through
/// [`HashStore`](crate::HashStore), whose stop path also discards the unit's
/// recorded state — calling [`remove`](TrackingSet::remove) directly skips
/// that discard.
#[derive(Debug)]
pub struct TrackingSet {
    shards: Vec<RwLock<FxHashSet<UnitId>>>,
}

impl TrackingSet {
    /// Creates an empty tracking set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| RwLock::new(FxHashSet::default())).collect(),
        }
    }

    fn read_shard(&self, id: UnitId) -> RwLockReadGuard<'_, FxHashSet<UnitId>> {
        self.shards[shard_of(id)]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_shard(&self, id: UnitId) -> RwLockWriteGuard<'_, FxHashSet<UnitId>> {
        self.shards[shard_of(id)]
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts tracking `id`. Idempotent; tracking an already-tracked id is a
    /// no-op.
    pub fn start(&self, id: UnitId) {
        self.write_shard(id).insert(id);
    }

    /// Starts tracking every id in `ids` (e.g. a whole observation radius at
    /// once).
    pub fn start_all(&self, ids: impl IntoIterator<Item = UnitId>) {
        for id in ids {
            self.start(id);
        }
    }

    /// Stops tracking `id`. Idempotent; removing an untracked id is a no-op.
    pub fn remove(&self, id: UnitId) {
        self.write_shard(id).remove(&id);
    }

    /// Returns `true` if `id` is currently tracked. Pure query, no side
    /// effects.
    #[must_use]
    pub fn is_tracking(&self, id: UnitId) -> bool {
        self.read_shard(id).contains(&id)
    }

    /// Number of currently tracked ids.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Forgets all membership.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.write().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }
}

impl Default for TrackingSet {
    fn default() -> Self {
        Self::new()
    }
}
