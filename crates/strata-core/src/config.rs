// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Store configuration: which stages are digested, which stage is terminal.

use rustc_hash::FxHashSet;

use crate::ident::StageId;

/// Checkpoint configuration for a [`HashStore`](crate::HashStore).
///
/// The store does not decide which stages are interesting; the embedding
/// pipeline supplies the payload-affecting stages (`observed`) and the stage
/// whose completion marks a unit ready (`terminal`) at construction time.
/// The terminal stage may or may not also be observed — readiness and
/// digesting are independent effects of a checkpoint.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    observed: FxHashSet<StageId>,
    terminal: StageId,
}

impl StoreConfig {
    /// Builds a configuration from the observed stage set and the terminal
    /// stage.
    pub fn new(observed: impl IntoIterator<Item = StageId>, terminal: StageId) -> Self {
        Self {
            observed: observed.into_iter().collect(),
            terminal,
        }
    }

    /// Returns `true` if completing `stage` triggers a payload digest.
    #[must_use]
    pub fn is_observed(&self, stage: StageId) -> bool {
        self.observed.contains(&stage)
    }

    /// Returns `true` if completing `stage` marks a unit ready.
    #[must_use]
    pub fn is_terminal(&self, stage: StageId) -> bool {
        stage == self.terminal
    }

    /// The configured terminal stage.
    #[must_use]
    pub fn terminal(&self) -> StageId {
        self.terminal
    }

    /// Observed stages in deterministic (sorted) order.
    #[must_use]
    pub fn observed_stages(&self) -> Vec<StageId> {
        let mut stages: Vec<StageId> = self.observed.iter().copied().collect();
        stages.sort_unstable();
        stages
    }
}
