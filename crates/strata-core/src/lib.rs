// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! strata-core: stage-hash tracking store for procedural generation
//! determinism checks.
//!
//! A staged generation pipeline calls [`HashStore::checkpoint`] each time a
//! unit completes a stage, passing the unit's current payload. For units that
//! were opted in via tracking, the store records a BLAKE3 digest of the
//! payload per observed stage and flags the unit ready once the configured
//! terminal stage completes. Two runs that disagree on any recorded digest
//! are not reproducing the same world.
//!
//! # Determinism Invariant
//!
//! Digests are content-level: equal payload snapshots produce equal digests
//! on every platform (canonical little-endian encoding, see
//! [`digest_sections`]). No public API exposes internal map iteration order;
//! [`HashStore::snapshot`] returns records sorted by unit id and stage id.
//!
//! # Concurrency
//!
//! The store is synchronous and `Sync`: membership and ledger state are
//! sharded by unit id, digesting runs outside all locks, and a checkpoint
//! that loses the race against `stop_tracking` leaves no trace. See the
//! contract notes in [`store`]'s module docs.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod config;
mod digest;
mod ident;
mod store;
mod tracking;

/// Checkpoint configuration: observed stage set plus terminal stage.
pub use config::StoreConfig;
/// Payload digesting: canonical encoding, digest newtype, failure type.
pub use digest::{
    digest_sections, empty_payload_digest, Digest, DigestError, SectionPayload, STATE_ID_BYTES,
};
/// Identity types and shard routing.
pub use ident::{shard_of, StageId, UnitId, NUM_SHARDS};
/// The stage-hash ledger and checkpoint entry point.
pub use store::{CheckpointOutcome, HashStore, UnitStageHashes};
/// Tracked-unit membership set.
pub use tracking::TrackingSet;
