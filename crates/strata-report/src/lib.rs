// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! strata-report: harness-facing JSON reports over a `strata-core` hash
//! store.
//!
//! The core records digests in memory; this crate is the surface a test
//! harness reads them through. A [`ReportBuilder`] turns a quiesced store
//! into a [`StageHashReport`] — seed metadata plus every unit's stage→hash
//! map, sorted so equal ledgers serialize byte-for-byte equal — and
//! [`write_report`]/[`read_report`] move reports to and from disk for
//! baseline diffing.
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
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod report;
mod writer;

pub use report::{ReportBuilder, StageHashReport, UnitReport};
pub use writer::{read_report, write_report};
