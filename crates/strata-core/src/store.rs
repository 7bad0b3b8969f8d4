// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The stage-hash ledger and its checkpoint entry point.
//!
//! Concurrency contract
//! - Membership and ledger state are partitioned across [`NUM_SHARDS`] shards
//!   keyed by [`shard_of`]; checkpoints for unrelated units contend only at
//!   shard granularity.
//! - Digesting (the one expensive step, linear in payload bytes) runs with no
//!   lock held. Locks bracket only map probes and mutations.
//! - Stop-tracking racing an in-flight checkpoint for the same unit resolves
//!   to "no trace": [`HashStore::stop_tracking`] removes membership *before*
//!   discarding the ledger, and [`HashStore::checkpoint`] re-verifies
//!   membership under the ledger-shard write lock before inserting. If the
//!   checkpoint re-verifies first, its insert happens before the discard and
//!   is wiped by it; if the removal lands first, the re-verify fails and the
//!   checkpoint inserts nothing. Either way the stopped unit ends with no
//!   recorded state.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rustc_hash::FxHashMap;

use crate::config::StoreConfig;
use crate::digest::{digest_sections, Digest, DigestError, SectionPayload};
use crate::ident::{shard_of, StageId, UnitId, NUM_SHARDS};
use crate::tracking::TrackingSet;

/// Per-unit recorded state: stage digests plus the readiness flag.
#[derive(Debug, Default)]
struct UnitLedger {
    stages: FxHashMap<StageId, Digest>,
    ready: bool,
}

/// What a [`HashStore::checkpoint`] call did.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CheckpointOutcome {
    /// The unit is not under observation; nothing was touched. The dominant
    /// path during normal generation.
    Untracked,
    /// The stage is neither observed nor terminal; nothing was touched.
    /// Unconfigured stages are a deliberate no-op, not an error.
    Ignored,
    /// The checkpoint took effect.
    Recorded {
        /// Digest stored for an observed stage; `None` when only readiness
        /// applied (terminal stage outside the observed set).
        digest: Option<Digest>,
        /// Readiness of the unit after this checkpoint.
        ready: bool,
    },
}

/// Recorded hashes for one unit, as exported by [`HashStore::snapshot`].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UnitStageHashes {
    /// The unit these records belong to.
    pub unit: UnitId,
    /// `(stage, digest)` pairs in ascending stage order.
    pub stages: Vec<(StageId, Digest)>,
    /// Whether the unit had passed its terminal checkpoint at snapshot time.
    pub ready: bool,
}

/// The stage-hash tracking store.
///
/// An explicitly constructed, injectable object — create one per pipeline (or
/// per test) and hand references to every checkpoint call site; there is no
/// ambient global instance. The store owns its [`TrackingSet`] so that
/// stopping a unit's tracking always discards its recorded state too.
///
/// All methods take `&self`; the store is `Sync` and meant to be shared
/// across the pipeline's worker threads.
#[derive(Debug)]
pub struct HashStore {
    config: StoreConfig,
    tracking: TrackingSet,
    ledgers: Vec<RwLock<FxHashMap<UnitId, UnitLedger>>>,
}

impl HashStore {
    /// Creates an empty store with the given checkpoint configuration.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            tracking: TrackingSet::new(),
            ledgers: (0..NUM_SHARDS)
                .map(|_| RwLock::new(FxHashMap::default()))
                .collect(),
        }
    }

    /// The store's checkpoint configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn read_ledger(&self, id: UnitId) -> RwLockReadGuard<'_, FxHashMap<UnitId, UnitLedger>> {
        self.ledgers[shard_of(id)]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_ledger(&self, id: UnitId) -> RwLockWriteGuard<'_, FxHashMap<UnitId, UnitLedger>> {
        self.ledgers[shard_of(id)]
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the completion of `stage` for unit `id` with the unit's
    /// current payload.
    ///
    /// Called by the pipeline, synchronously, once per `(unit, stage)` under
    /// normal generation, after the stage's work has fully completed. The
    /// payload must be a complete point-in-time snapshot (no torn reads).
    ///
    /// For a tracked unit, an observed stage stores the payload digest
    /// (overwriting any earlier digest for the same stage) and the terminal
    /// stage marks the unit ready; the two effects are independent and a
    /// single call may apply both, either, or neither.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError`] if the payload cannot be digested. The failed
    /// checkpoint stores nothing; digests recorded for other stages of the
    /// same unit are untouched.
    pub fn checkpoint(
        &self,
        id: UnitId,
        stage: StageId,
        sections: &[SectionPayload],
    ) -> Result<CheckpointOutcome, DigestError> {
        if !self.tracking.is_tracking(id) {
            return Ok(CheckpointOutcome::Untracked);
        }
        let observed = self.config.is_observed(stage);
        let terminal = self.config.is_terminal(stage);
        if !observed && !terminal {
            return Ok(CheckpointOutcome::Ignored);
        }

        // Digest before taking any lock: payload size is unbounded and must
        // not block unrelated units sharing this shard.
        let digest = if observed {
            Some(digest_sections(sections)?)
        } else {
            None
        };

        let mut shard = self.write_ledger(id);
        // Re-verify under the write lock: a checkpoint that lost the race
        // against stop_tracking leaves no trace (see module docs).
        if !self.tracking.is_tracking(id) {
            return Ok(CheckpointOutcome::Untracked);
        }
        let ledger = shard.entry(id).or_default();
        if let Some(digest) = digest {
            ledger.stages.insert(stage, digest);
        }
        if terminal {
            ledger.ready = true;
        }
        Ok(CheckpointOutcome::Recorded {
            digest,
            ready: ledger.ready,
        })
    }

    /// Returns the digest recorded for `(id, stage)`, or `None` if not
    /// recorded — absence is not an error.
    #[must_use]
    pub fn get_hash(&self, id: UnitId, stage: StageId) -> Option<Digest> {
        self.read_ledger(id)
            .get(&id)
            .and_then(|ledger| ledger.stages.get(&stage))
            .copied()
    }

    /// Returns `true` if `id` has passed its terminal checkpoint. `false`
    /// for never-seen or untracked units.
    #[must_use]
    pub fn is_ready(&self, id: UnitId) -> bool {
        self.read_ledger(id).get(&id).is_some_and(|ledger| ledger.ready)
    }

    /// Opts `id` in for observation. Idempotent.
    pub fn start_tracking(&self, id: UnitId) {
        self.tracking.start(id);
    }

    /// Opts every id in `ids` in for observation.
    pub fn start_tracking_all(&self, ids: impl IntoIterator<Item = UnitId>) {
        self.tracking.start_all(ids);
    }

    /// Stops observing `id` and forgets its recorded hashes and readiness.
    /// Idempotent.
    ///
    /// Membership is removed before the ledger is discarded; this ordering is
    /// load-bearing for the stop-vs-checkpoint race (module docs).
    pub fn stop_tracking(&self, id: UnitId) {
        self.tracking.remove(id);
        self.discard(id);
    }

    /// Returns `true` if `id` is currently under observation.
    #[must_use]
    pub fn is_tracking(&self, id: UnitId) -> bool {
        self.tracking.is_tracking(id)
    }

    /// Number of units currently under observation.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracking.tracked_count()
    }

    /// Number of units that have passed their terminal checkpoint.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.ledgers
            .iter()
            .map(|shard| {
                shard
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .values()
                    .filter(|ledger| ledger.ready)
                    .count()
            })
            .sum()
    }

    /// Returns `true` once every tracked unit is ready.
    ///
    /// The harness's completion condition: poll this while the pipeline
    /// drains. Vacuously `true` when nothing is tracked.
    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.ready_count() >= self.tracked_count()
    }

    fn discard(&self, id: UnitId) {
        self.write_ledger(id).remove(&id);
    }

    /// Exports all recorded state, sorted by unit id and then stage id.
    ///
    /// The ledger's internal iteration order is never exposed; exports are
    /// always sorted so that two stores holding equal records serialize
    /// identically. Each shard is read-locked in turn, so the snapshot is
    /// per-shard consistent; take it after the pipeline has quiesced (e.g.
    /// [`all_ready`](HashStore::all_ready)) for a globally consistent view.
    #[must_use]
    pub fn snapshot(&self) -> Vec<UnitStageHashes> {
        let mut units: Vec<UnitStageHashes> = self
            .ledgers
            .iter()
            .flat_map(|shard| {
                let shard = shard.read().unwrap_or_else(PoisonError::into_inner);
                shard
                    .iter()
                    .map(|(unit, ledger)| {
                        let mut stages: Vec<(StageId, Digest)> =
                            ledger.stages.iter().map(|(s, d)| (*s, *d)).collect();
                        stages.sort_unstable_by_key(|(stage, _)| *stage);
                        UnitStageHashes {
                            unit: *unit,
                            stages,
                            ready: ledger.ready,
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        units.sort_unstable_by_key(|entry| entry.unit);
        units
    }

    /// Forgets all tracking membership and recorded state. The configuration
    /// is construction-time and survives.
    pub fn clear(&self) {
        self.tracking.clear();
        for shard in &self.ledgers {
            shard.write().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::digest::empty_payload_digest;

    const NOISE: StageId = StageId::new("noise");
    const SURFACE: StageId = StageId::new("surface");
    const FEATURES: StageId = StageId::new("features");
    const LIGHT: StageId = StageId::new("light");

    fn store() -> HashStore {
        HashStore::new(StoreConfig::new([NOISE, SURFACE, FEATURES], FEATURES))
    }

    fn payload(fill: u32) -> Vec<SectionPayload> {
        vec![SectionPayload::from_state_ids(&[fill; 64]), SectionPayload::Empty]
    }

    // ── 1. untracked checkpoint is a pure no-op ─────────────────────────

    #[test]
    fn untracked_checkpoint_leaves_no_trace() {
        let store = store();
        let id = UnitId::new(5, 5);
        let outcome = store.checkpoint(id, SURFACE, &payload(1)).unwrap();
        assert_eq!(outcome, CheckpointOutcome::Untracked);
        assert_eq!(store.get_hash(id, SURFACE), None);
        assert!(!store.is_ready(id));
        assert!(store.snapshot().is_empty());
    }

    // ── 2. observed stage records the payload digest ────────────────────

    #[test]
    fn observed_stage_records_digest() {
        let store = store();
        let id = UnitId::new(0, 0);
        store.start_tracking(id);
        let sections = payload(7);
        let expected = digest_sections(&sections).unwrap();
        let outcome = store.checkpoint(id, SURFACE, &sections).unwrap();
        assert_eq!(
            outcome,
            CheckpointOutcome::Recorded {
                digest: Some(expected),
                ready: false,
            }
        );
        assert_eq!(store.get_hash(id, SURFACE), Some(expected));
        assert!(!store.is_ready(id));
    }

    // ── 3. terminal checkpoint marks ready and records ──────────────────

    #[test]
    fn terminal_checkpoint_marks_ready() {
        let store = store();
        let id = UnitId::new(0, 0);
        store.start_tracking(id);
        store.checkpoint(id, SURFACE, &payload(1)).unwrap();
        let outcome = store.checkpoint(id, FEATURES, &payload(2)).unwrap();
        match outcome {
            CheckpointOutcome::Recorded { digest, ready } => {
                assert!(digest.is_some());
                assert!(ready);
            }
            other => unreachable!("expected Recorded, got {other:?}"),
        }
        assert!(store.is_ready(id));
        assert_eq!(store.ready_count(), 1);
    }

    // ── 4. terminal outside the observed set: readiness without hashing ─

    #[test]
    fn unobserved_terminal_signals_readiness_only() {
        let store = HashStore::new(StoreConfig::new([NOISE, SURFACE], LIGHT));
        let id = UnitId::new(2, -3);
        store.start_tracking(id);
        let outcome = store.checkpoint(id, LIGHT, &payload(1)).unwrap();
        assert_eq!(
            outcome,
            CheckpointOutcome::Recorded {
                digest: None,
                ready: true,
            }
        );
        assert!(store.is_ready(id));
        assert_eq!(store.get_hash(id, LIGHT), None);
    }

    // ── 5. unconfigured stage is ignored ────────────────────────────────

    #[test]
    fn unknown_stage_is_ignored() {
        let store = store();
        let id = UnitId::new(0, 0);
        store.start_tracking(id);
        let outcome = store.checkpoint(id, LIGHT, &payload(1)).unwrap();
        assert_eq!(outcome, CheckpointOutcome::Ignored);
        assert_eq!(store.get_hash(id, LIGHT), None);
        assert!(store.snapshot().is_empty());
    }

    // ── 6. duplicate checkpoint overwrites (last-write-wins) ────────────

    #[test]
    fn duplicate_checkpoint_overwrites() {
        let store = store();
        let id = UnitId::new(1, 1);
        store.start_tracking(id);
        store.checkpoint(id, SURFACE, &payload(1)).unwrap();
        let second = payload(2);
        store.checkpoint(id, SURFACE, &second).unwrap();
        assert_eq!(
            store.get_hash(id, SURFACE),
            Some(digest_sections(&second).unwrap())
        );
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].stages.len(), 1);
    }

    // ── 7. digest failure aborts only that checkpoint ───────────────────

    #[test]
    fn digest_failure_preserves_prior_records() {
        let store = store();
        let id = UnitId::new(0, 4);
        store.start_tracking(id);
        let good = payload(3);
        store.checkpoint(id, NOISE, &good).unwrap();
        let torn = vec![SectionPayload::Blocks(bytes::Bytes::from_static(&[1, 2, 3]))];
        let err = store.checkpoint(id, SURFACE, &torn).unwrap_err();
        assert!(matches!(err, DigestError::MalformedSection { index: 0, len: 3 }));
        // The failed stage recorded nothing; the earlier stage is intact.
        assert_eq!(store.get_hash(id, SURFACE), None);
        assert_eq!(store.get_hash(id, NOISE), Some(digest_sections(&good).unwrap()));
        assert!(!store.is_ready(id));
    }

    // ── 8. stop_tracking discards records and readiness ─────────────────

    #[test]
    fn stop_tracking_discards_state() {
        let store = store();
        let id = UnitId::new(-1, 8);
        store.start_tracking(id);
        store.checkpoint(id, SURFACE, &payload(1)).unwrap();
        store.checkpoint(id, FEATURES, &payload(2)).unwrap();
        assert!(store.is_ready(id));
        store.stop_tracking(id);
        assert!(!store.is_tracking(id));
        assert_eq!(store.get_hash(id, SURFACE), None);
        assert_eq!(store.get_hash(id, FEATURES), None);
        assert!(!store.is_ready(id));
        // Idempotent.
        store.stop_tracking(id);
        assert_eq!(store.ready_count(), 0);
    }

    // ── 9. readiness is monotone until discard ──────────────────────────

    #[test]
    fn readiness_is_monotone() {
        let store = store();
        let id = UnitId::new(0, 0);
        store.start_tracking(id);
        store.checkpoint(id, FEATURES, &payload(1)).unwrap();
        assert!(store.is_ready(id));
        // Later non-terminal checkpoints must not clear readiness.
        store.checkpoint(id, SURFACE, &payload(2)).unwrap();
        assert!(store.is_ready(id));
    }

    // ── 10. empty payload records the sentinel digest ───────────────────

    #[test]
    fn empty_payload_records_sentinel() {
        let store = store();
        let id = UnitId::new(0, 0);
        store.start_tracking(id);
        store.checkpoint(id, NOISE, &[]).unwrap();
        assert_eq!(store.get_hash(id, NOISE), Some(empty_payload_digest()));
    }

    // ── 11. snapshot is sorted by unit, then stage ──────────────────────

    #[test]
    fn snapshot_is_sorted() {
        let store = store();
        let ids = [UnitId::new(1, 0), UnitId::new(-2, 3), UnitId::new(0, 0)];
        store.start_tracking_all(ids);
        for id in ids {
            store.checkpoint(id, SURFACE, &payload(1)).unwrap();
            store.checkpoint(id, NOISE, &payload(2)).unwrap();
        }
        let snapshot = store.snapshot();
        let units: Vec<UnitId> = snapshot.iter().map(|entry| entry.unit).collect();
        assert_eq!(
            units,
            vec![UnitId::new(-2, 3), UnitId::new(0, 0), UnitId::new(1, 0)]
        );
        for entry in &snapshot {
            assert_eq!(entry.stages[0].0, NOISE);
            assert_eq!(entry.stages[1].0, SURFACE);
        }
    }

    // ── 12. all_ready tracks the completion condition ───────────────────

    #[test]
    fn all_ready_completion_condition() {
        let store = store();
        let a = UnitId::new(0, 0);
        let b = UnitId::new(1, 0);
        store.start_tracking_all([a, b]);
        assert!(!store.all_ready());
        store.checkpoint(a, FEATURES, &payload(1)).unwrap();
        assert!(!store.all_ready());
        store.checkpoint(b, FEATURES, &payload(1)).unwrap();
        assert!(store.all_ready());
    }

    // ── 13. clear forgets everything, config survives ───────────────────

    #[test]
    fn clear_resets_state_not_config() {
        let store = store();
        let id = UnitId::new(0, 0);
        store.start_tracking(id);
        store.checkpoint(id, FEATURES, &payload(1)).unwrap();
        store.clear();
        assert_eq!(store.tracked_count(), 0);
        assert_eq!(store.ready_count(), 0);
        assert!(store.snapshot().is_empty());
        assert!(store.config().is_terminal(FEATURES));
    }
}
